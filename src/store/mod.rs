//! Composite stores and the installed configuration view.
//!
//! A [`CompositeStore`] is an ordered list of polling sources. Lookups scan
//! the list from the front and return the first source that has the key,
//! so earlier members override later ones. Each member refreshes on its
//! own; reads may observe a newer snapshot from one member and an older
//! one from another.

pub mod installer;

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use crate::schedule::Scheduler;
use crate::source::{PollingConfiguration, Snapshot, SourceError};

pub use installer::{AlreadyConfigured, StoreCell};

/// Ordered sources; the first added wins on key conflicts.
#[derive(Debug, Default)]
pub struct CompositeStore {
    sources: Vec<Arc<PollingConfiguration>>,
}

impl CompositeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source with lower precedence than every source already added.
    pub fn add_source(&mut self, source: Arc<PollingConfiguration>) {
        self.sources.push(source);
    }

    pub fn sources(&self) -> &[Arc<PollingConfiguration>] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// First value found scanning sources in addition order.
    pub fn get(&self, key: &str) -> Option<String> {
        self.sources.iter().find_map(|source| source.get(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.sources.iter().any(|source| source.contains_key(key))
    }

    /// Merged view with precedence applied.
    pub fn snapshot(&self) -> Snapshot {
        let mut merged = Snapshot::new();
        for source in &self.sources {
            for (key, value) in source.snapshot().iter() {
                if !merged.contains_key(key) {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        merged
    }

    /// Start every member, in addition order. If one fails its initial
    /// load, the members started so far are stopped again.
    pub async fn start(&self, scheduler: &dyn Scheduler) -> Result<(), SourceError> {
        for source in &self.sources {
            if let Err(e) = source.start(scheduler).await {
                self.stop();
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn stop(&self) {
        for source in &self.sources {
            source.stop();
        }
    }
}

/// What an aggregation installs: a lone source or a composite.
#[derive(Debug, Clone)]
pub enum ActiveConfiguration {
    Single(Arc<PollingConfiguration>),
    Composite(Arc<CompositeStore>),
}

impl ActiveConfiguration {
    pub fn get(&self, key: &str) -> Option<String> {
        match self {
            Self::Single(source) => source.get(key),
            Self::Composite(store) => store.get(key),
        }
    }

    /// Value of `key`, or `default` when absent.
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Value of `key` parsed as `T`. `None` when absent or unparsable.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key)?.trim().parse().ok()
    }

    /// Boolean value of `key`; accepts `true`/`false` in any case.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)?.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        match self {
            Self::Single(source) => source.contains_key(key),
            Self::Composite(store) => store.contains_key(key),
        }
    }

    /// Merged key/value view.
    pub fn snapshot(&self) -> Snapshot {
        match self {
            Self::Single(source) => Snapshot::clone(&source.snapshot()),
            Self::Composite(store) => store.snapshot(),
        }
    }

    /// All known keys, sorted.
    pub fn keys(&self) -> BTreeSet<String> {
        self.snapshot().into_keys().collect()
    }

    /// Member sources in precedence order.
    pub fn sources(&self) -> Vec<Arc<PollingConfiguration>> {
        match self {
            Self::Single(source) => vec![Arc::clone(source)],
            Self::Composite(store) => store.sources().to_vec(),
        }
    }

    pub async fn start(&self, scheduler: &dyn Scheduler) -> Result<(), SourceError> {
        match self {
            Self::Single(source) => source.start(scheduler).await,
            Self::Composite(store) => store.start(scheduler).await,
        }
    }

    /// Stop all polling.
    pub fn stop(&self) {
        match self {
            Self::Single(source) => source.stop(),
            Self::Composite(store) => store.stop(),
        }
    }
}
