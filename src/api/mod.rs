//! HTTP API.

mod error;
mod handlers;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::{PublicConfig, Settings, SourceMode};
use crate::problems::ProblemTracker;
use crate::report::ReportLayout;
use crate::source::ClashStore;
use crate::storage::FileStore;

pub use error::ApiError;

/// Settings the handlers need, fixed at startup.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub mode: SourceMode,
    pub max_page_size: usize,
    /// Body limit of `POST /capture` and `POST /report/pdf`.
    pub max_body_bytes: usize,
    pub layout: ReportLayout,
    pub public: PublicConfig,
    pub cors_origins: Vec<String>,
}

impl ApiConfig {
    #[must_use]
    pub fn from_settings(settings: &Settings, mode: SourceMode) -> Self {
        Self {
            mode,
            max_page_size: settings.max_page_size,
            max_body_bytes: settings.max_capture_bytes,
            layout: ReportLayout {
                rows_per_severity: settings.rows_per_severity,
                ..ReportLayout::default()
            },
            public: PublicConfig::new(settings, mode),
            cors_origins: settings.cors_origins.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ClashStore>,
    pub problems: Arc<dyn ProblemTracker>,
    pub files: Arc<FileStore>,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(
        store: ClashStore,
        problems: Arc<dyn ProblemTracker>,
        files: FileStore,
        config: ApiConfig,
    ) -> Self {
        Self {
            store: Arc::new(store),
            problems,
            files: Arc::new(files),
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    let body_limit = state.config.max_body_bytes;

    Router::new()
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::config))
        .route("/clashes", get(handlers::list_clashes))
        .route("/clashes/refresh", post(handlers::refresh_clashes))
        .route("/clashes/:id", get(handlers::get_clash))
        .route("/kpis", get(handlers::kpis))
        .route("/export/clashes.csv", get(handlers::export_clashes_csv))
        .route(
            "/report/pdf",
            post(handlers::create_report).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/report/latest", get(handlers::latest_report))
        .route("/report/:id", get(handlers::get_report))
        .route(
            "/capture",
            post(handlers::save_capture).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/problems",
            get(handlers::list_problems).post(handlers::create_problem),
        )
        .route(
            "/problems/:id/link",
            post(handlers::link_problem).delete(handlers::unlink_problem),
        )
        .route("/viewer/model-urns", get(handlers::model_urns))
        .route("/viewer/clash/:id", get(handlers::viewer_clash))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    if origins.iter().any(|o| o.trim() == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}
