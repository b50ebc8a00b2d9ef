//! Process-wide configuration store.
//!
//! Readers call [`ConfigStore::current`], which is a lock-free load of the
//! published `Arc<ConfigSnapshot>`. Refreshes are single-flight: at most one
//! fetch is in flight, and callers that queue behind it return its outcome
//! instead of fetching again. The fetch-and-publish step runs on its own
//! task, so a cancelled caller never cancels shared work.

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::source::{ConfigSource, FetchOutcome};
use switchboard_core::{ConfigError, ConfigSnapshot, SnapshotVersion, SwitchboardResult};

/// Refresh timing for a [`ConfigStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Minimum time between successful fetches.
    pub refresh_interval: Duration,
    /// Upper bound on a single fetch.
    pub fetch_timeout: Duration,
    /// Wait after a failed fetch before trying again.
    pub retry_backoff: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(5),
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

/// What a refresh attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A strictly newer snapshot was published.
    Updated { version: SnapshotVersion },
    /// The source had nothing newer.
    Unchanged,
    /// The fetch failed or timed out; the previous snapshot is kept.
    Failed,
    /// Not due yet (interval or backoff still running).
    Skipped,
}

impl RefreshOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Updated { .. } => "updated",
            Self::Unchanged => "unchanged",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone)]
struct RefreshState {
    last_success: Instant,
    last_failure: Option<Instant>,
    consecutive_failures: u32,
    last_error: Option<String>,
    last_outcome: RefreshOutcome,
}

impl RefreshState {
    fn new(now: Instant) -> Self {
        Self {
            last_success: now,
            last_failure: None,
            consecutive_failures: 0,
            last_error: None,
            last_outcome: RefreshOutcome::Unchanged,
        }
    }

    fn is_due(&self, now: Instant, options: &StoreOptions) -> bool {
        now.saturating_duration_since(self.last_success) >= options.refresh_interval
            && self.backoff_elapsed(now, options)
    }

    fn backoff_elapsed(&self, now: Instant, options: &StoreOptions) -> bool {
        self.last_failure
            .map_or(true, |failed| now.saturating_duration_since(failed) >= options.retry_backoff)
    }

    /// Whether an attempt at `now` is allowed for `trigger`.
    fn admits(&self, trigger: Trigger, now: Instant, options: &StoreOptions) -> bool {
        match trigger {
            Trigger::Due => self.is_due(now, options),
            Trigger::Forced => self.backoff_elapsed(now, options),
        }
    }
}

/// What asked for a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// Honour both the refresh interval and the failure backoff.
    Due,
    /// Ignore the interval; the failure backoff still applies.
    Forced,
}

/// Period of the background loop; `tokio::time::interval` panics on zero.
fn loop_period(options: &StoreOptions) -> Duration {
    options.refresh_interval.max(MIN_LOOP_PERIOD)
}

const MIN_LOOP_PERIOD: Duration = Duration::from_millis(1);

/// Point-in-time health of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    pub version: SnapshotVersion,
    pub last_success_age: Duration,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub refresh_interval: Duration,
}

struct StoreInner {
    source: Arc<dyn ConfigSource>,
    options: StoreOptions,
    current: ArcSwap<ConfigSnapshot>,
    /// Held for the whole fetch-and-publish step.
    state: Arc<Mutex<RefreshState>>,
    /// Copy of `state` published after each attempt, for lock-free reads.
    record: ArcSwap<RefreshState>,
    /// Completed attempts.
    attempts: AtomicU64,
}

/// Owns the published [`ConfigSnapshot`]. Cheap to clone.
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<StoreInner>,
}

impl ConfigStore {
    /// Fetch the initial snapshot.
    ///
    /// Fails with [`ConfigError::Unavailable`] when the source cannot
    /// produce one; there is nothing to fall back to yet.
    pub async fn load(
        source: Arc<dyn ConfigSource>,
        options: StoreOptions,
    ) -> SwitchboardResult<Self> {
        let name = source.name().to_string();
        let snapshot = match fetch_with_timeout(source.as_ref(), None, options.fetch_timeout).await
        {
            Ok(FetchOutcome::Updated(snapshot)) => snapshot,
            Ok(FetchOutcome::Unchanged) => {
                return Err(ConfigError::Unavailable {
                    reason: format!("{} source returned no snapshot", name),
                }
                .into())
            }
            Err(e) => {
                error!(source = %name, error = %e, "Initial configuration load failed");
                return Err(ConfigError::Unavailable {
                    reason: e.to_string(),
                }
                .into());
            }
        };

        info!(
            source = %name,
            version = snapshot.version(),
            flags = snapshot.flags().len(),
            "Loaded initial configuration snapshot"
        );
        Ok(Self::with_snapshot(source, snapshot, options))
    }

    /// Build a store around an already-loaded snapshot.
    pub fn with_snapshot(
        source: Arc<dyn ConfigSource>,
        snapshot: ConfigSnapshot,
        options: StoreOptions,
    ) -> Self {
        let state = RefreshState::new(Instant::now());
        Self {
            inner: Arc::new(StoreInner {
                source,
                options,
                current: ArcSwap::from_pointee(snapshot),
                record: ArcSwap::from_pointee(state.clone()),
                state: Arc::new(Mutex::new(state)),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    /// The latest published snapshot. Never blocks.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.inner.current.load_full()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    pub fn source_name(&self) -> &str {
        self.inner.source.name()
    }

    /// Refresh when the interval (and any failure backoff) has elapsed.
    ///
    /// Returns `true` only when a newer snapshot was published.
    pub async fn refresh_if_due(&self, now: Instant) -> bool {
        self.refresh_if_due_with_outcome(now).await.is_updated()
    }

    pub async fn refresh_if_due_with_outcome(&self, now: Instant) -> RefreshOutcome {
        self.refresh(now, Trigger::Due).await
    }

    /// Refresh regardless of the interval. Still single-flight, and still
    /// `Skipped` while a failure backoff is running.
    pub async fn force_refresh(&self) -> RefreshOutcome {
        self.refresh(Instant::now(), Trigger::Forced).await
    }

    async fn refresh(&self, now: Instant, trigger: Trigger) -> RefreshOutcome {
        let options = &self.inner.options;
        if !self.inner.record.load().admits(trigger, now, options) {
            return RefreshOutcome::Skipped;
        }

        let observed = self.inner.attempts.load(Ordering::Acquire);
        let guard = Arc::clone(&self.inner.state).lock_owned().await;
        if self.inner.attempts.load(Ordering::Acquire) != observed {
            // An attempt finished while we waited; report its result.
            return guard.last_outcome;
        }
        if !guard.admits(trigger, now, options) {
            return RefreshOutcome::Skipped;
        }

        let inner = Arc::clone(&self.inner);
        match tokio::spawn(inner.attempt(guard, now)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Configuration refresh task aborted");
                RefreshOutcome::Failed
            }
        }
    }

    /// Snapshot health for readiness checks.
    pub fn status(&self) -> StoreStatus {
        let record = self.inner.record.load();
        StoreStatus {
            version: self.inner.current.load().version(),
            last_success_age: Instant::now().saturating_duration_since(record.last_success),
            consecutive_failures: record.consecutive_failures,
            last_error: record.last_error.clone(),
            refresh_interval: self.inner.options.refresh_interval,
        }
    }

    /// Snapshot setting.
    pub fn setting(&self, key: &str) -> Option<String> {
        self.current().setting(key).map(str::to_string)
    }

    /// Snapshot setting, then environment (`a:b` reads `A_B`), then `default`.
    pub fn setting_or_env(&self, key: &str, default: &str) -> String {
        self.setting(key)
            .or_else(|| std::env::var(env_key(key)).ok())
            .unwrap_or_else(|| default.to_string())
    }

    pub fn is_feature_enabled(&self, name: &str) -> bool {
        self.current().is_enabled(name)
    }

    /// Refresh on a fixed interval until `shutdown` flips to `true`.
    ///
    /// Each tick is a forced refresh, so only the failure backoff can skip
    /// one. Ticks share the single-flight path with on-demand refreshes.
    pub fn spawn_refresh_loop<F>(
        &self,
        mut shutdown: watch::Receiver<bool>,
        on_outcome: F,
    ) -> JoinHandle<()>
    where
        F: Fn(RefreshOutcome) + Send + 'static,
    {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(loop_period(&store.inner.options));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let outcome = store.force_refresh().await;
                        on_outcome(outcome);
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Configuration refresh loop stopped");
        })
    }
}

impl StoreInner {
    async fn attempt(
        self: Arc<Self>,
        mut state: OwnedMutexGuard<RefreshState>,
        now: Instant,
    ) -> RefreshOutcome {
        let since = self.current.load().version();
        let result =
            fetch_with_timeout(self.source.as_ref(), Some(since), self.options.fetch_timeout).await;

        let outcome = match result {
            Ok(FetchOutcome::Updated(snapshot)) => self.publish(snapshot),
            Ok(FetchOutcome::Unchanged) => {
                debug!(version = since, "Configuration unchanged");
                RefreshOutcome::Unchanged
            }
            Err(e) => {
                state.consecutive_failures += 1;
                state.last_failure = Some(now);
                state.last_error = Some(e.to_string());
                warn!(
                    source = %self.source.name(),
                    error = %e,
                    consecutive_failures = state.consecutive_failures,
                    version = since,
                    "Configuration refresh failed, keeping previous snapshot"
                );
                RefreshOutcome::Failed
            }
        };

        if outcome != RefreshOutcome::Failed {
            state.last_success = now;
            state.last_failure = None;
            state.consecutive_failures = 0;
            state.last_error = None;
        }
        state.last_outcome = outcome;
        self.record.store(Arc::new(state.clone()));
        self.attempts.fetch_add(1, Ordering::Release);
        outcome
    }

    /// Only the holder of the refresh lock calls this.
    fn publish(&self, snapshot: ConfigSnapshot) -> RefreshOutcome {
        let previous = self.current.load().version();
        let version = snapshot.version();
        if version <= previous {
            debug!(
                previous,
                fetched = version,
                "Ignoring snapshot that does not advance the version"
            );
            return RefreshOutcome::Unchanged;
        }

        self.current.store(Arc::new(snapshot));
        info!(previous, version, "Published configuration snapshot");
        RefreshOutcome::Updated { version }
    }
}

async fn fetch_with_timeout(
    source: &dyn ConfigSource,
    since: Option<SnapshotVersion>,
    timeout: Duration,
) -> SwitchboardResult<FetchOutcome> {
    match tokio::time::timeout(timeout, source.fetch(since)).await {
        Ok(result) => result,
        Err(_) => Err(ConfigError::FetchTimeout {
            source_name: source.name().to_string(),
            after_ms: timeout.as_millis() as u64,
        }
        .into()),
    }
}

fn env_key(key: &str) -> String {
    key.replace([':', '.', '-'], "_").to_uppercase()
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("source", &self.inner.source.name())
            .field("version", &self.inner.current.load().version())
            .field("options", &self.inner.options)
            .finish()
    }
}
