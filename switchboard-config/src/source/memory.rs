//! In-memory source whose snapshot is replaced programmatically.

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{outcome_since, ConfigSource, FetchOutcome};
use switchboard_core::{ConfigError, ConfigSnapshot, SnapshotVersion, SwitchboardResult};

const SOURCE_NAME: &str = "memory";

#[derive(Debug, Default)]
pub struct InMemoryConfigSource {
    snapshot: ArcSwapOption<ConfigSnapshot>,
    fetches: AtomicUsize,
}

impl InMemoryConfigSource {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            snapshot: ArcSwapOption::from_pointee(snapshot),
            fetches: AtomicUsize::new(0),
        }
    }

    /// A source that fails every fetch until a snapshot is set.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set(&self, snapshot: ConfigSnapshot) {
        self.snapshot.store(Some(Arc::new(snapshot)));
    }

    pub fn clear(&self) {
        self.snapshot.store(None);
    }

    /// Number of fetches served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigSource for InMemoryConfigSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(&self, since: Option<SnapshotVersion>) -> SwitchboardResult<FetchOutcome> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let current = self.snapshot.load_full().ok_or_else(|| ConfigError::FetchFailed {
            source_name: SOURCE_NAME.to_string(),
            reason: "no snapshot has been set".to_string(),
        })?;
        Ok(outcome_since(ConfigSnapshot::clone(&current), since))
    }
}
