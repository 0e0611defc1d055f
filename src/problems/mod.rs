//! Coordination problems (issues) raised against clashes.
//!
//! Like clash records, problems come either from Model Coordination or from
//! an in-memory demo store; the choice follows the configured source mode.

pub mod aps;
pub mod mock;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Settings, SourceMode};
use crate::error::SourceError;
use crate::model::{NewProblem, Problem};

pub use aps::ApsProblems;
pub use mock::MockProblems;

#[async_trait]
pub trait ProblemTracker: Send + Sync {
    fn name(&self) -> &'static str;

    /// All problems, or only those linked to `clash_id`.
    async fn list(&self, clash_id: Option<&str>) -> Result<Vec<Problem>, SourceError>;

    async fn create(&self, problem: NewProblem) -> Result<Problem, SourceError>;

    /// Links `clash_id` to the problem. `Ok(None)` when the problem does not exist.
    async fn link(&self, problem_id: &str, clash_id: &str) -> Result<Option<Problem>, SourceError>;

    /// Removes the clash link. `Ok(None)` when the problem does not exist.
    async fn unlink(&self, problem_id: &str, clash_id: &str)
        -> Result<Option<Problem>, SourceError>;
}

/// Builds the tracker for `mode`, mirroring [`crate::source::from_settings`].
pub fn from_settings(settings: &Settings, mode: SourceMode) -> Arc<dyn ProblemTracker> {
    match (mode, settings.aps()) {
        (SourceMode::Aps, Some(aps)) => Arc::new(ApsProblems::new(aps)),
        _ => Arc::new(MockProblems::seeded(chrono::Utc::now())),
    }
}

/// Keeps the problems linked to `clash_id`, or all of them.
pub(crate) fn linked_to(problems: Vec<Problem>, clash_id: Option<&str>) -> Vec<Problem> {
    match clash_id {
        Some(id) => problems.into_iter().filter(|p| p.is_linked_to(id)).collect(),
        None => problems,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_aps_settings_use_the_demo_tracker() {
        let settings = Settings {
            source: SourceMode::Aps,
            ..Settings::default()
        };
        assert_eq!(from_settings(&settings, SourceMode::Aps).name(), "mock");

        let settings = Settings {
            aps_project_id: Some("p".to_string()),
            aps_modelset_id: Some("m".to_string()),
            aps_access_token: Some("t".to_string()),
            ..settings
        };
        assert_eq!(from_settings(&settings, SourceMode::Aps).name(), "aps");
        assert_eq!(from_settings(&settings, SourceMode::Mock).name(), "mock");
    }
}
