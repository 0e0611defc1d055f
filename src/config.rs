//! Runtime settings.
//!
//! Every option can be given as a flag or through its environment variable.

use clap::{Args, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::warn;

use crate::model::DEFAULT_MAX_PAGE_SIZE;
use crate::source::aps::{ApsSettings, DEFAULT_BASE_URL};

/// Base64 viewer screenshots run to several megabytes.
pub const DEFAULT_MAX_CAPTURE_BYTES: usize = 20 * 1024 * 1024;

/// Where clash records come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    #[default]
    Mock,
    Aps,
}

impl SourceMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Aps => "aps",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Address the HTTP server listens on
    #[arg(long, env = "CLASH_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// Clash record source
    #[arg(long, env = "CLASH_SOURCE", value_enum, default_value_t = SourceMode::Mock)]
    pub source: SourceMode,

    /// Number of generated records in mock mode
    #[arg(long, env = "CLASH_MOCK_COUNT", default_value_t = 100)]
    pub mock_count: usize,

    /// Seed of the mock generator
    #[arg(long, env = "CLASH_MOCK_SEED", default_value_t = 42)]
    pub mock_seed: u64,

    /// Directory where PDF reports are written
    #[arg(long, env = "CLASH_EXPORTS_DIR", default_value = "exports")]
    pub exports_dir: PathBuf,

    /// Directory where viewer captures are stored
    #[arg(long, env = "CLASH_CAPTURES_DIR", default_value = "captures")]
    pub captures_dir: PathBuf,

    /// Largest accepted page size
    #[arg(long, env = "CLASH_MAX_PAGE_SIZE", default_value_t = DEFAULT_MAX_PAGE_SIZE)]
    pub max_page_size: usize,

    /// Rows listed per severity section in PDF reports
    #[arg(long, env = "CLASH_ROWS_PER_SEVERITY", default_value_t = 20)]
    pub rows_per_severity: usize,

    /// Largest accepted body for capture uploads and report requests, in bytes
    #[arg(long, env = "CLASH_MAX_CAPTURE_BYTES", default_value_t = DEFAULT_MAX_CAPTURE_BYTES)]
    pub max_capture_bytes: usize,

    /// Allowed CORS origins, comma separated ("*" allows any)
    #[arg(long, env = "CLASH_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, env = "CLASH_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "CLASH_LOG_JSON")]
    pub log_json: bool,

    #[arg(long, env = "APS_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub aps_base_url: String,

    #[arg(long, env = "APS_PROJECT_ID")]
    pub aps_project_id: Option<String>,

    #[arg(long, env = "APS_MODELSET_ID")]
    pub aps_modelset_id: Option<String>,

    /// Pre-issued bearer token for the APS API
    #[arg(long, env = "APS_ACCESS_TOKEN", hide_env_values = true)]
    pub aps_access_token: Option<String>,

    /// Coordination space holding problems (defaults to the project)
    #[arg(long, env = "APS_COORDINATION_SPACE_ID")]
    pub aps_coordination_space_id: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            source: SourceMode::Mock,
            mock_count: 100,
            mock_seed: 42,
            exports_dir: PathBuf::from("exports"),
            captures_dir: PathBuf::from("captures"),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            rows_per_severity: 20,
            max_capture_bytes: DEFAULT_MAX_CAPTURE_BYTES,
            cors_origins: Vec::new(),
            log_level: "info".to_string(),
            log_json: false,
            aps_base_url: DEFAULT_BASE_URL.to_string(),
            aps_project_id: None,
            aps_modelset_id: None,
            aps_access_token: None,
            aps_coordination_space_id: None,
        }
    }
}

impl Settings {
    /// APS settings when all three identifiers are present and non-empty.
    #[must_use]
    pub fn aps(&self) -> Option<ApsSettings> {
        Some(ApsSettings {
            base_url: self.aps_base_url.trim_end_matches('/').to_string(),
            project_id: non_blank(self.aps_project_id.as_deref())?,
            modelset_id: non_blank(self.aps_modelset_id.as_deref())?,
            access_token: non_blank(self.aps_access_token.as_deref())?,
            coordination_space_id: non_blank(self.aps_coordination_space_id.as_deref()),
        })
    }

    /// Requested mode, downgraded to mock when APS settings are incomplete.
    #[must_use]
    pub fn effective_mode(&self) -> SourceMode {
        if self.source == SourceMode::Aps && self.aps().is_none() {
            warn!("APS mode requested but project, model set or token is missing; using mock data");
            return SourceMode::Mock;
        }
        self.source
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Settings exposed by `GET /config`.
#[derive(Debug, Clone, Serialize)]
pub struct PublicConfig {
    pub mode: SourceMode,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub rows_per_severity: usize,
}

impl PublicConfig {
    #[must_use]
    pub fn new(settings: &Settings, mode: SourceMode) -> Self {
        Self {
            mode,
            default_page_size: crate::model::DEFAULT_PAGE_SIZE.min(settings.max_page_size),
            max_page_size: settings.max_page_size,
            rows_per_severity: settings.rows_per_severity,
        }
    }
}
