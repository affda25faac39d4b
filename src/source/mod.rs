//! Pollable configuration sources.
//!
//! A [`ConfigurationSource`] knows how to produce the current key/value
//! pairs of one backing origin (a file or URL, or a SQL query). A
//! [`PollingConfiguration`] wraps a source with its [`PollingPolicy`],
//! keeps the last materialized snapshot for lock-free reads and drives the
//! periodic refresh once started.

pub mod database;
pub mod location;
pub mod properties;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::policy::PollingPolicy;
use crate::schedule::{PollFuture, PollHandle, PollJob, Scheduler};

pub use database::{DatabaseConnector, DatabaseSource, QueryExecutor, SqlxConnector};
pub use location::{ContentFetcher, DefaultFetcher, DefaultResolver, LocationResolver, LocationSource};
pub use properties::Format;

/// Key/value pairs in the order the origin produced them.
pub type Snapshot = IndexMap<String, String>;

/// Errors raised while building or polling a source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("configuration source `{origin}` is unavailable: {reason}")]
    Unavailable { origin: String, reason: String },

    #[error("configuration source `{origin}` could not be parsed: {reason}")]
    Format { origin: String, reason: String },
}

impl SourceError {
    pub fn unavailable(origin: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unavailable {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    pub fn format(origin: impl Into<String>, reason: impl ToString) -> Self {
        Self::Format {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    /// Identity of the location or connection that failed.
    pub fn origin(&self) -> &str {
        match self {
            Self::Unavailable { origin, .. } | Self::Format { origin, .. } => origin,
        }
    }
}

/// A backing origin that can be asked for its current contents.
#[async_trait]
pub trait ConfigurationSource: Send + Sync {
    /// Human-readable identity for logs and errors. Never contains secrets.
    fn describe(&self) -> String;

    /// Produce the full current key/value set.
    async fn poll(&self) -> Result<Snapshot, SourceError>;
}

/// A source plus its refresh policy and last observed values.
pub struct PollingConfiguration {
    source: Arc<dyn ConfigurationSource>,
    policy: PollingPolicy,
    values: ArcSwap<Snapshot>,
    refresh_lock: tokio::sync::Mutex<()>,
    refreshes: AtomicU64,
    started: AtomicBool,
    poller: OnceLock<PollHandle>,
}

impl PollingConfiguration {
    /// Wrap a source. The result is empty and not polling until [`start`](Self::start).
    pub fn new(source: Arc<dyn ConfigurationSource>, policy: PollingPolicy) -> Self {
        Self {
            source,
            policy,
            values: ArcSwap::from_pointee(Snapshot::new()),
            refresh_lock: tokio::sync::Mutex::new(()),
            refreshes: AtomicU64::new(0),
            started: AtomicBool::new(false),
            poller: OnceLock::new(),
        }
    }

    pub fn name(&self) -> String {
        self.source.describe()
    }

    pub fn policy(&self) -> &PollingPolicy {
        &self.policy
    }

    /// Latest value for `key`, if the last successful poll had one.
    pub fn get(&self, key: &str) -> Option<String> {
        self.values.load().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.load().contains_key(key)
    }

    /// The whole last materialized snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.values.load_full()
    }

    /// Number of successful refreshes applied so far.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Poll the source once and apply the result.
    ///
    /// Refreshes of the same source are serialized. On failure the previous
    /// snapshot stays in place.
    pub async fn refresh(&self) -> Result<(), SourceError> {
        let _guard = self.refresh_lock.lock().await;
        let polled = self.source.poll().await?;

        let next = if self.policy.ignore_deletes {
            let mut merged = Snapshot::clone(&self.values.load());
            merged.extend(polled);
            merged
        } else {
            polled
        };

        let key_count = next.len();
        self.values.store(Arc::new(next));
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        debug!(source = %self.source.describe(), keys = key_count, "configuration refreshed");
        Ok(())
    }

    /// Load once, then hand the periodic refresh to `scheduler`.
    ///
    /// A failed initial load is returned and nothing is scheduled; the
    /// configuration can be started again later. Calling `start` on a
    /// started configuration is a no-op.
    pub async fn start(self: &Arc<Self>, scheduler: &dyn Scheduler) -> Result<(), SourceError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.refresh().await {
            self.started.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let job: PollJob = Arc::new(move || -> PollFuture {
            let weak = weak.clone();
            Box::pin(async move {
                let Some(this) = weak.upgrade() else {
                    return;
                };
                if let Err(e) = this.refresh().await {
                    warn!(
                        source = %this.source.describe(),
                        error = %e,
                        "refresh failed; keeping previous values"
                    );
                }
            })
        });

        let handle = scheduler.schedule(&self.policy, job);
        let _ = self.poller.set(handle);
        Ok(())
    }

    /// Cancel the periodic refresh. The last snapshot remains readable.
    pub fn stop(&self) {
        if let Some(handle) = self.poller.get() {
            handle.cancel();
        }
    }
}

impl std::fmt::Debug for PollingConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingConfiguration")
            .field("source", &self.source.describe())
            .field("policy", &self.policy)
            .field("keys", &self.values.load().len())
            .field("started", &self.is_started())
            .finish()
    }
}
