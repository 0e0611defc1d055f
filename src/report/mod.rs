//! Report generation: filter the snapshot, aggregate, compose, store.

pub mod chart;
pub mod pdf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::ReportError;
use crate::model::{ClashFilter, ClashRecord, SortSpec};
use crate::service::{calculate_kpis, filter_and_sort};
use crate::storage::{CaptureLookup, FileStore};

pub use chart::{render_chart, ChartDatum, ChartKind, RasterImage, Rgb};
pub use pdf::{compose, ReportContent};

pub const DEFAULT_TITLE: &str = "Clash Report";
pub const DEFAULT_AUTHOR: &str = "Clash Reporter";
pub const DEFAULT_DISCLAIMER: &str =
    "Generated from model coordination data. Verify critical clashes in the federated model before acting.";

/// Body of `POST /report/pdf`; every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportRequest {
    pub filters: ClashFilter,
    pub title: String,
    pub prepared_by: String,
    pub include_screenshots: bool,
    /// PNG or JPEG on the server's disk, drawn on the cover.
    pub logo_path: Option<PathBuf>,
}

impl Default for ReportRequest {
    fn default() -> Self {
        Self {
            filters: ClashFilter::default(),
            title: DEFAULT_TITLE.to_string(),
            prepared_by: DEFAULT_AUTHOR.to_string(),
            include_screenshots: true,
            logo_path: None,
        }
    }
}

/// Fixed presentation settings of a report.
#[derive(Debug, Clone)]
pub struct ReportLayout {
    /// Rows listed per severity before the truncation note.
    pub rows_per_severity: usize,
    pub disclaimer: String,
    pub chart_width: u32,
    pub chart_height: u32,
    /// Discipline pairs shown in the horizontal bar chart.
    pub max_chart_series: usize,
}

impl Default for ReportLayout {
    fn default() -> Self {
        Self {
            rows_per_severity: 20,
            disclaimer: DEFAULT_DISCLAIMER.to_string(),
            chart_width: chart::DEFAULT_WIDTH,
            chart_height: chart::DEFAULT_HEIGHT,
            max_chart_series: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedReport {
    pub report_id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub clash_count: usize,
}

/// Builds a report from `records` and writes it to the exports directory.
///
/// Blocking: call from `spawn_blocking` inside async code.
pub fn generate_report(
    records: &[ClashRecord],
    request: &ReportRequest,
    layout: &ReportLayout,
    files: &FileStore,
    generated_at: DateTime<Utc>,
) -> Result<GeneratedReport, ReportError> {
    let selected = filter_and_sort(records, &request.filters, SortSpec::default());
    let kpis = calculate_kpis(selected.iter().copied());
    let filter_description = request.filters.describe();
    let logo = request.logo_path.as_deref().and_then(read_logo);

    let content = ReportContent {
        title: non_empty_or(&request.title, DEFAULT_TITLE),
        prepared_by: non_empty_or(&request.prepared_by, DEFAULT_AUTHOR),
        generated_at,
        filter_description: &filter_description,
        records: &selected,
        kpis: &kpis,
        include_screenshots: request.include_screenshots,
        logo: logo.as_deref(),
    };
    let bytes = compose(&content, layout, Some(files as &dyn CaptureLookup))?;
    let stored = files.save_report(&bytes, generated_at)?;

    info!(
        report = %stored.report_id,
        clashes = selected.len(),
        bytes = stored.size_bytes,
        "report generated"
    );
    Ok(GeneratedReport {
        report_id: stored.report_id,
        path: stored.path,
        size_bytes: stored.size_bytes,
        clash_count: selected.len(),
    })
}

/// A logo that cannot be read leaves the cover without one.
fn read_logo(path: &Path) -> Option<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "logo not readable, skipping");
            None
        }
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}
