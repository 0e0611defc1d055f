//! Clash record sources.
//!
//! A source produces the full clash collection on demand. The variant is
//! chosen once from configuration; the rest of the crate only sees
//! [`ClashSource`].

pub mod aps;
pub mod mock;
pub mod store;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Settings, SourceMode};
use crate::error::SourceError;
use crate::model::ClashRecord;

pub use aps::{ApsSettings, ApsSource};
pub use mock::MockSource;
pub use store::{ClashSnapshot, ClashStore};

#[async_trait]
pub trait ClashSource: Send + Sync {
    /// Short name used in logs and the health endpoint.
    fn name(&self) -> &'static str;

    async fn fetch(&self) -> Result<Vec<ClashRecord>, SourceError>;
}

/// Builds the source for `mode`, normally [`Settings::effective_mode`].
pub fn from_settings(settings: &Settings, mode: SourceMode) -> Arc<dyn ClashSource> {
    match mode {
        SourceMode::Mock => Arc::new(MockSource::new(settings.mock_count, settings.mock_seed)),
        SourceMode::Aps => match settings.aps() {
            Some(aps) => Arc::new(ApsSource::new(aps)),
            None => Arc::new(MockSource::new(settings.mock_count, settings.mock_seed)),
        },
    }
}
