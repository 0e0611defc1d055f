use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use clash_reporter::api::{build_router, ApiConfig, AppState};
use clash_reporter::config::{Settings, SourceMode};
use clash_reporter::error::QueryError;
use clash_reporter::export::{export_csv, export_json, ClashExport};
use clash_reporter::logging;
use clash_reporter::model::ClashQuery;
use clash_reporter::report::{
    generate_report, ReportLayout, ReportRequest, DEFAULT_AUTHOR, DEFAULT_TITLE,
};
use clash_reporter::service::{calculate_kpis, filter_and_sort};
use clash_reporter::problems;
use clash_reporter::source::{self, ClashStore};
use clash_reporter::storage::FileStore;

#[derive(Parser, Debug)]
#[command(name = "clash-reporter")]
#[command(about = "Clash Reporter - query BIM coordination clashes, export CSV and PDF reports")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,

    /// Export filtered clashes to a file
    Export {
        /// Output file
        #[arg(long, short, value_name = "FILE")]
        output: PathBuf,

        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Generate a PDF report in the exports directory
    Report {
        #[arg(long, default_value = DEFAULT_TITLE)]
        title: String,

        #[arg(long, default_value = DEFAULT_AUTHOR)]
        prepared_by: String,

        /// Leave viewer captures out of the report
        #[arg(long)]
        no_screenshots: bool,

        /// PNG or JPEG drawn on the cover
        #[arg(long, value_name = "FILE")]
        logo: Option<PathBuf>,

        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExportFormat {
    Csv,
    Json,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Severities to keep, comma separated (high, medium, low)
    #[arg(long)]
    severity: Option<String>,

    /// Statuses to keep, comma separated (open, resolved, suppressed)
    #[arg(long)]
    status: Option<String>,

    /// Substring matched against disciplines, case-insensitive
    #[arg(long)]
    discipline: Option<String>,

    /// Exact level name
    #[arg(long)]
    level: Option<String>,

    /// severity, status, created_at or updated_at
    #[arg(long)]
    sort_by: Option<String>,

    /// asc or desc
    #[arg(long)]
    sort_order: Option<String>,
}

impl FilterArgs {
    /// Runs the flags through the same parser as the HTTP query string.
    fn to_query(&self, max_page_size: usize) -> Result<ClashQuery, QueryError> {
        let pairs: Vec<(String, String)> = [
            ("severity", &self.severity),
            ("status", &self.status),
            ("discipline", &self.discipline),
            ("level", &self.level),
            ("sort_by", &self.sort_by),
            ("sort_order", &self.sort_order),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_string(), v.clone())))
        .collect();
        ClashQuery::from_pairs(&pairs, max_page_size)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    logging::init(&cli.settings.log_level, cli.settings.log_json);

    let settings = cli.settings;
    let mode = settings.effective_mode();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings, mode).await,
        Command::Export {
            output,
            format,
            filter,
        } => export(&settings, mode, &output, format, &filter).await,
        Command::Report {
            title,
            prepared_by,
            no_screenshots,
            logo,
            filter,
        } => {
            let query = filter.to_query(settings.max_page_size)?;
            let request = ReportRequest {
                filters: query.filter,
                title,
                prepared_by,
                include_screenshots: !no_screenshots,
                logo_path: logo,
            };
            report(&settings, mode, &request).await
        }
    }
}

async fn serve(settings: Settings, mode: SourceMode) -> Result<()> {
    let files = FileStore::new(&settings.exports_dir, &settings.captures_dir)?;
    let store = ClashStore::new(source::from_settings(&settings, mode));

    // A failed first load is retried lazily by the first request.
    if let Err(e) = store.refresh().await {
        warn!(error = %e, "initial clash load failed");
    }

    let tracker = problems::from_settings(&settings, mode);
    let state = AppState::new(
        store,
        tracker,
        files,
        ApiConfig::from_settings(&settings, mode),
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.bind).await?;
    info!(addr = %settings.bind, mode = mode.as_str(), "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn export(
    settings: &Settings,
    mode: SourceMode,
    output: &Path,
    format: ExportFormat,
    filter: &FilterArgs,
) -> Result<()> {
    let query = filter.to_query(settings.max_page_size)?;
    let store = ClashStore::new(source::from_settings(settings, mode));
    let snapshot = store.refresh().await?;
    let selected = filter_and_sort(snapshot.records(), &query.filter, query.sort);

    match format {
        ExportFormat::Csv => export_csv(&selected, output)?,
        ExportFormat::Json => {
            let kpis = calculate_kpis(selected.iter().copied());
            export_json(
                &ClashExport {
                    generated_at: chrono::Utc::now(),
                    filter: &query.filter,
                    kpis: &kpis,
                    clashes: &selected,
                },
                output,
            )?;
        }
    }

    println!("Exported {} clashes to {}", selected.len(), output.display());
    Ok(())
}

async fn report(settings: &Settings, mode: SourceMode, request: &ReportRequest) -> Result<()> {
    let files = FileStore::new(&settings.exports_dir, &settings.captures_dir)?;
    let store = ClashStore::new(source::from_settings(settings, mode));
    let snapshot = store.refresh().await?;

    let layout = ReportLayout {
        rows_per_severity: settings.rows_per_severity,
        ..ReportLayout::default()
    };
    let report = generate_report(
        snapshot.records(),
        request,
        &layout,
        &files,
        chrono::Utc::now(),
    )?;

    println!(
        "Report {} written to {} ({} clashes, {} bytes)",
        report.report_id,
        report.path.display(),
        report.clash_count,
        report.size_bytes
    );
    Ok(())
}
