use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use super::ClashSource;
use crate::error::SourceError;
use crate::model::ClashRecord;

/// Immutable clash collection as returned by one fetch.
#[derive(Debug)]
pub struct ClashSnapshot {
    records: Vec<ClashRecord>,
    index: HashMap<String, usize>,
    fetched_at: DateTime<Utc>,
}

impl ClashSnapshot {
    /// Builds a snapshot, dropping records whose id was already seen.
    #[must_use]
    pub fn new(records: Vec<ClashRecord>, fetched_at: DateTime<Utc>) -> Self {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(records.len());
        for record in records {
            if seen.insert(record.id.clone()) {
                unique.push(record);
            } else {
                warn!(clash = %record.id, "duplicate clash id dropped");
            }
        }

        let index = unique
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();

        Self {
            records: unique,
            index,
            fetched_at,
        }
    }

    #[must_use]
    pub fn records(&self) -> &[ClashRecord] {
        &self.records
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ClashRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// Process-wide holder of the current snapshot.
///
/// Readers clone the `Arc` and keep a consistent view for the whole request;
/// a refresh builds a new snapshot and swaps the pointer. Refreshes are
/// serialized so concurrent callers do not hit the source twice in parallel.
pub struct ClashStore {
    source: Arc<dyn ClashSource>,
    current: RwLock<Option<Arc<ClashSnapshot>>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl ClashStore {
    #[must_use]
    pub fn new(source: Arc<dyn ClashSource>) -> Self {
        Self {
            source,
            current: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Current snapshot, loading it on first use.
    pub async fn snapshot(&self) -> Result<Arc<ClashSnapshot>, SourceError> {
        if let Some(snapshot) = self.loaded() {
            return Ok(snapshot);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have loaded it while we waited
        if let Some(snapshot) = self.loaded() {
            return Ok(snapshot);
        }
        self.load().await
    }

    /// Snapshot if one was loaded, without touching the source.
    #[must_use]
    pub fn loaded(&self) -> Option<Arc<ClashSnapshot>> {
        self.current.read().clone()
    }

    /// Fetches a new collection and replaces the current snapshot.
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<Arc<ClashSnapshot>, SourceError> {
        let _guard = self.refresh_lock.lock().await;
        self.load().await
    }

    async fn load(&self) -> Result<Arc<ClashSnapshot>, SourceError> {
        let records = self.source.fetch().await.inspect_err(|e| {
            warn!(source = self.source.name(), error = %e, "clash fetch failed");
        })?;

        let snapshot = Arc::new(ClashSnapshot::new(records, Utc::now()));
        *self.current.write() = Some(Arc::clone(&snapshot));
        info!(
            source = self.source.name(),
            count = snapshot.len(),
            "clash snapshot replaced"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::clash::fixtures::record;
    use crate::model::{Severity, Status};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns `generation` records per fetch and fails once `fail_after` fetches happened.
    struct CountingSource {
        calls: AtomicUsize,
        fail_after: usize,
    }

    #[async_trait]
    impl ClashSource for CountingSource {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn fetch(&self) -> Result<Vec<ClashRecord>, SourceError> {
            let generation = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if generation > self.fail_after {
                return Err(SourceError::NotReady {
                    message: "offline".to_string(),
                });
            }
            Ok((0..generation)
                .map(|i| record(&format!("c{i}"), Severity::Low, Status::Open))
                .collect())
        }
    }

    fn store(fail_after: usize) -> ClashStore {
        ClashStore::new(Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail_after,
        }))
    }

    #[test]
    fn snapshot_drops_duplicate_ids() {
        let records = vec![
            record("a", Severity::High, Status::Open),
            record("b", Severity::Low, Status::Open),
            record("a", Severity::Low, Status::Resolved),
        ];
        let snapshot = ClashSnapshot::new(records, Utc::now());
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("a").unwrap().severity, Severity::High);
        assert!(snapshot.get("zzz").is_none());
    }

    #[tokio::test]
    async fn loads_lazily_and_reuses_snapshot() {
        let store = store(usize::MAX);
        let first = store.snapshot().await.unwrap();
        let second = store.snapshot().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 1);
    }

    #[tokio::test]
    async fn refresh_swaps_without_touching_held_snapshots() {
        let store = store(usize::MAX);
        let held = store.snapshot().await.unwrap();
        let refreshed = store.refresh().await.unwrap();

        assert_eq!(held.len(), 1);
        assert_eq!(refreshed.len(), 2);
        assert_eq!(store.snapshot().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let store = store(1);
        store.snapshot().await.unwrap();
        assert!(store.refresh().await.is_err());
        assert_eq!(store.snapshot().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unavailable_source_surfaces_error() {
        let store = store(0);
        assert!(matches!(
            store.snapshot().await,
            Err(SourceError::NotReady { .. })
        ));
    }
}
