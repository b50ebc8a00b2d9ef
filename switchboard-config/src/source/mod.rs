//! Remote configuration sources.

use async_trait::async_trait;
use switchboard_core::{ConfigSnapshot, SnapshotVersion, SwitchboardResult};

mod file;
mod http;
mod memory;

pub use file::FileConfigSource;
pub use http::HttpConfigSource;
pub use memory::InMemoryConfigSource;

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// A newer snapshot is available.
    Updated(ConfigSnapshot),
    /// Nothing newer than `since`.
    Unchanged,
}

/// Where configuration snapshots come from.
///
/// Implementations do not need their own timeout; the store wraps every
/// fetch in one.
#[async_trait]
pub trait ConfigSource: Send + Sync + 'static {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Fetch a snapshot newer than `since`, or the current one if `since` is `None`.
    async fn fetch(&self, since: Option<SnapshotVersion>) -> SwitchboardResult<FetchOutcome>;
}

/// Treat snapshots that do not advance past `since` as unchanged.
pub(crate) fn outcome_since(
    snapshot: ConfigSnapshot,
    since: Option<SnapshotVersion>,
) -> FetchOutcome {
    match since {
        Some(since) if snapshot.version() <= since => FetchOutcome::Unchanged,
        _ => FetchOutcome::Updated(snapshot),
    }
}
