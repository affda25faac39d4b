//! Aggregation entry points.
//!
//! Each entry point builds the sources it needs, composes them, starts
//! their polling and installs the result into a [`StoreCell`]. All of them
//! are terminal: a cell accepts exactly one installation, and nothing is
//! installed when a required source fails to build or to load initially.
//! Sources already started by an aborted build are stopped again.
//!
//! Precedence:
//! - several locations: the first listed location wins. The list is walked
//!   in reverse while building, so with several unresolvable locations the
//!   last one listed is the one reported.
//! - database plus locations: the database source is always added first,
//!   so **database values override file and URL values**.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, warn};

use crate::descriptor::{self, ConnectionDescriptor, DescriptorError};
use crate::policy::{AggregationParameters, ParameterError, PollingPolicy};
use crate::schedule::Scheduler;
use crate::source::{
    ContentFetcher, DatabaseConnector, DatabaseSource, DefaultFetcher, DefaultResolver,
    LocationResolver, LocationSource, PollingConfiguration, SourceError, SqlxConnector,
};
use crate::store::{ActiveConfiguration, AlreadyConfigured, CompositeStore, StoreCell};

/// Everything that can stop an aggregation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    #[error(transparent)]
    MalformedDescriptor(#[from] DescriptorError),

    #[error("invalid aggregation parameter: {0}")]
    InvalidParameter(#[from] ParameterError),

    #[error(transparent)]
    SourceUnavailable(#[from] SourceError),

    #[error(transparent)]
    AlreadyConfigured(#[from] AlreadyConfigured),
}

/// A database descriptor in any of the forms callers have at hand.
#[derive(Debug, Clone)]
pub enum DescriptorInput {
    /// The `key#value||...` string.
    Raw(String),
    /// An already split name-to-value mapping.
    Map(HashMap<String, String>),
    Parsed(ConnectionDescriptor),
}

impl DescriptorInput {
    pub fn into_descriptor(self) -> Result<ConnectionDescriptor, DescriptorError> {
        match self {
            Self::Raw(raw) => descriptor::parse(&raw),
            Self::Map(map) => ConnectionDescriptor::from_map(map),
            Self::Parsed(parsed) => Ok(parsed),
        }
    }
}

impl From<&str> for DescriptorInput {
    fn from(raw: &str) -> Self {
        Self::Raw(raw.to_string())
    }
}

impl From<String> for DescriptorInput {
    fn from(raw: String) -> Self {
        Self::Raw(raw)
    }
}

impl From<HashMap<String, String>> for DescriptorInput {
    fn from(map: HashMap<String, String>) -> Self {
        Self::Map(map)
    }
}

impl From<ConnectionDescriptor> for DescriptorInput {
    fn from(parsed: ConnectionDescriptor) -> Self {
        Self::Parsed(parsed)
    }
}

/// Builds sources and installs them into a cell.
pub struct Aggregator<'a> {
    cell: &'a StoreCell,
    scheduler: Arc<dyn Scheduler>,
    resolver: Arc<dyn LocationResolver>,
    fetcher: Arc<dyn ContentFetcher>,
    connector: Arc<dyn DatabaseConnector>,
}

impl<'a> Aggregator<'a> {
    /// An aggregator with the default resolver, fetcher and sqlx connector.
    pub fn new(cell: &'a StoreCell, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            cell,
            scheduler,
            resolver: Arc::new(DefaultResolver::default()),
            fetcher: Arc::new(DefaultFetcher::default()),
            connector: Arc::new(SqlxConnector),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn LocationResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn DatabaseConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// The cell this aggregator installs into.
    pub fn cell(&self) -> &'a StoreCell {
        self.cell
    }

    /// Build a location-backed source. Fails when the location cannot be
    /// resolved. The source is not started.
    pub fn build_location_source(
        &self,
        location: &str,
        policy: PollingPolicy,
    ) -> Result<Arc<PollingConfiguration>, SourceError> {
        let url = self.resolver.resolve(location)?;
        let source = LocationSource::new(url, Arc::clone(&self.fetcher));
        Ok(Arc::new(PollingConfiguration::new(Arc::new(source), policy)))
    }

    /// Build a query-backed source. Fails when the connection parameters are
    /// rejected. The source is not started.
    pub fn build_database_source(
        &self,
        descriptor: &ConnectionDescriptor,
        policy: PollingPolicy,
    ) -> Result<Arc<PollingConfiguration>, SourceError> {
        let executor = self.connector.connect(descriptor)?;
        let source = DatabaseSource::new(executor, descriptor);
        Ok(Arc::new(PollingConfiguration::new(Arc::new(source), policy)))
    }

    /// Install a single location as the active configuration.
    pub async fn install_location(
        &self,
        location: &str,
        policy: PollingPolicy,
    ) -> Result<&'a ActiveConfiguration, AggregationError> {
        self.cell.ensure_vacant()?;
        let source = self.load_location(location, policy).await.map_err(|e| {
            error!(location, error = %e, "failed to add configuration location");
            e
        })?;
        self.install(ActiveConfiguration::Single(source))
    }

    /// Install several locations; the first listed wins on conflicts.
    ///
    /// With `ignore_missing`, locations that cannot be resolved or loaded are
    /// skipped. Otherwise the first failure aborts and nothing is installed.
    pub async fn install_locations<S: AsRef<str>>(
        &self,
        locations: &[S],
        ignore_missing: bool,
        policy: PollingPolicy,
    ) -> Result<&'a ActiveConfiguration, AggregationError> {
        self.cell.ensure_vacant()?;
        let mut store = CompositeStore::new();
        self.add_locations(&mut store, locations, ignore_missing, policy)
            .await?;
        self.install(ActiveConfiguration::Composite(Arc::new(store)))
    }

    /// Install a single database source.
    pub async fn install_database(
        &self,
        descriptor: impl Into<DescriptorInput>,
        policy: PollingPolicy,
    ) -> Result<&'a ActiveConfiguration, AggregationError> {
        self.cell.ensure_vacant()?;
        let descriptor = descriptor.into().into_descriptor()?;
        let source = self.load_database(&descriptor, policy).await?;
        self.install(ActiveConfiguration::Single(source))
    }

    /// Install a database source followed by one or more locations.
    ///
    /// `parameters` is the string bundle with `initialDelayMillis`,
    /// `delayMillis`, `ignoreDeletesFromSource` and `ignoreResourceNotFound`.
    /// The database source takes precedence over every location.
    pub async fn install_mixed<S: AsRef<str>>(
        &self,
        descriptor: impl Into<DescriptorInput>,
        locations: &[S],
        parameters: &HashMap<String, String>,
    ) -> Result<&'a ActiveConfiguration, AggregationError> {
        self.cell.ensure_vacant()?;
        let params = AggregationParameters::from_map(parameters)?;
        let descriptor = descriptor.into().into_descriptor()?;

        let mut store = CompositeStore::new();
        store.add_source(self.load_database(&descriptor, params.policy).await?);
        if let Err(e) = self
            .add_locations(&mut store, locations, params.ignore_missing, params.policy)
            .await
        {
            store.stop();
            return Err(e.into());
        }

        self.install(ActiveConfiguration::Composite(Arc::new(store)))
    }

    /// [`install_mixed`](Self::install_mixed) with a single location.
    pub async fn install_mixed_location(
        &self,
        descriptor: impl Into<DescriptorInput>,
        location: &str,
        parameters: &HashMap<String, String>,
    ) -> Result<&'a ActiveConfiguration, AggregationError> {
        self.install_mixed(descriptor, &[location], parameters)
            .await
    }

    /// Build a location source and perform its initial load.
    async fn load_location(
        &self,
        location: &str,
        policy: PollingPolicy,
    ) -> Result<Arc<PollingConfiguration>, SourceError> {
        let source = self.build_location_source(location, policy)?;
        source.start(self.scheduler.as_ref()).await?;
        Ok(source)
    }

    /// Build the database source and perform its initial load.
    async fn load_database(
        &self,
        descriptor: &ConnectionDescriptor,
        policy: PollingPolicy,
    ) -> Result<Arc<PollingConfiguration>, SourceError> {
        let loaded = match self.build_database_source(descriptor, policy) {
            Ok(source) => source
                .start(self.scheduler.as_ref())
                .await
                .map(|()| source),
            Err(e) => Err(e),
        };
        loaded.map_err(|e| {
            error!(error = %e, "failed to build database configuration source");
            e
        })
    }

    /// Load locations last-to-first, then append them in list order so the
    /// first listed is scanned first among the locations. On abort, the
    /// locations loaded so far are stopped.
    async fn add_locations<S: AsRef<str>>(
        &self,
        store: &mut CompositeStore,
        locations: &[S],
        ignore_missing: bool,
        policy: PollingPolicy,
    ) -> Result<(), SourceError> {
        let mut loaded: Vec<Arc<PollingConfiguration>> = Vec::with_capacity(locations.len());
        for location in locations.iter().rev() {
            let location = location.as_ref();
            match self.load_location(location, policy).await {
                Ok(source) => loaded.push(source),
                Err(e) if ignore_missing => {
                    warn!(location, error = %e, "skipping missing configuration location");
                }
                Err(e) => {
                    error!(location, error = %e, "failed to add configuration location");
                    for source in &loaded {
                        source.stop();
                    }
                    return Err(e);
                }
            }
        }
        for source in loaded.into_iter().rev() {
            store.add_source(source);
        }
        Ok(())
    }

    /// Publish an already started configuration. One that loses the
    /// installation race is stopped again.
    fn install(
        &self,
        config: ActiveConfiguration,
    ) -> Result<&'a ActiveConfiguration, AggregationError> {
        self.cell.install(config.clone()).map_err(|e| {
            config.stop();
            e.into()
        })
    }
}

/// The configuration installed in the process-wide cell, if any.
pub fn active() -> Option<&'static ActiveConfiguration> {
    StoreCell::global().get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::parameter_map;
    use crate::source::testing::{ManualScheduler, TaskScheduler};
    use crate::source::QueryExecutor;
    use async_trait::async_trait;
    use reqwest::Url;
    use std::sync::Mutex;

    const DESCRIPTOR: &str = "dbURL#sqlite:cfg.db||username#u||password#p||sqlQuery#select k, v from t||keyColumnName#k||valueColumnName#v";

    /// Resolves `mem:<name>` specs that were registered with contents.
    /// Names registered as unreadable resolve but fail every fetch.
    #[derive(Default)]
    struct MemoryLocations {
        files: Mutex<HashMap<String, String>>,
        unreadable: Mutex<Vec<String>>,
    }

    impl MemoryLocations {
        fn with(files: &[(&str, &str)]) -> Arc<Self> {
            Self::with_unreadable(files, &[])
        }

        fn with_unreadable(files: &[(&str, &str)], unreadable: &[&str]) -> Arc<Self> {
            let this = Self::default();
            {
                let mut map = this.files.lock().unwrap();
                for (name, content) in files {
                    map.insert(format!("mem://host/{name}"), content.to_string());
                }
                let mut broken = this.unreadable.lock().unwrap();
                for name in unreadable {
                    broken.push(format!("mem://host/{name}"));
                }
            }
            Arc::new(this)
        }
    }

    impl LocationResolver for MemoryLocations {
        fn resolve(&self, spec: &str) -> Result<Url, SourceError> {
            let url = format!("mem://host/{spec}");
            if self.files.lock().unwrap().contains_key(&url)
                || self.unreadable.lock().unwrap().contains(&url)
            {
                Url::parse(&url).map_err(|e| SourceError::unavailable(spec, e))
            } else {
                Err(SourceError::unavailable(spec, "not found"))
            }
        }
    }

    #[async_trait]
    impl ContentFetcher for MemoryLocations {
        async fn fetch(&self, url: &Url) -> Result<String, SourceError> {
            self.files
                .lock()
                .unwrap()
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| SourceError::unavailable(url.as_str(), "gone"))
        }
    }

    struct CannedConnector(Vec<(&'static str, &'static str)>);

    struct CannedRows(Vec<(String, String)>);

    #[async_trait]
    impl QueryExecutor for CannedRows {
        async fn fetch_pairs(
            &self,
            _sql: &str,
            _key_column: &str,
            _value_column: &str,
        ) -> Result<Vec<(String, String)>, SourceError> {
            Ok(self.0.clone())
        }
    }

    impl DatabaseConnector for CannedConnector {
        fn connect(
            &self,
            _descriptor: &ConnectionDescriptor,
        ) -> Result<Arc<dyn QueryExecutor>, SourceError> {
            Ok(Arc::new(CannedRows(
                self.0
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )))
        }
    }

    /// Connects, but every query fails as if the server were down.
    struct DownConnector;

    struct DownRows;

    #[async_trait]
    impl QueryExecutor for DownRows {
        async fn fetch_pairs(
            &self,
            _sql: &str,
            _key_column: &str,
            _value_column: &str,
        ) -> Result<Vec<(String, String)>, SourceError> {
            Err(SourceError::unavailable("sqlite:cfg.db", "connection refused"))
        }
    }

    impl DatabaseConnector for DownConnector {
        fn connect(
            &self,
            _descriptor: &ConnectionDescriptor,
        ) -> Result<Arc<dyn QueryExecutor>, SourceError> {
            Ok(Arc::new(DownRows))
        }
    }

    /// Holds every fetch until `gate` has been reached by all parties.
    struct GatedFetcher {
        inner: Arc<MemoryLocations>,
        gate: tokio::sync::Barrier,
    }

    #[async_trait]
    impl ContentFetcher for GatedFetcher {
        async fn fetch(&self, url: &Url) -> Result<String, SourceError> {
            self.gate.wait().await;
            self.inner.fetch(url).await
        }
    }

    fn aggregator<'a>(cell: &'a StoreCell, files: &[(&str, &str)]) -> Aggregator<'a> {
        let memory = MemoryLocations::with(files);
        Aggregator::new(cell, Arc::new(ManualScheduler::default()))
            .with_resolver(memory.clone())
            .with_fetcher(memory)
            .with_connector(Arc::new(CannedConnector(vec![
                ("shared", "db"),
                ("db.only", "yes"),
            ])))
    }

    fn abc() -> Vec<(&'static str, &'static str)> {
        vec![
            ("a", "shared=A\nonly.a=1\n"),
            ("b", "shared=B\nonly.b=2\nbc=B\n"),
            ("c", "shared=C\nonly.c=3\nbc=C\n"),
        ]
    }

    #[tokio::test]
    async fn single_location_is_installed_unwrapped() {
        let cell = StoreCell::new();
        let engine = aggregator(&cell, &abc());
        let active = engine
            .install_location("a", PollingPolicy::default())
            .await
            .unwrap();
        assert!(matches!(active, ActiveConfiguration::Single(_)));
        assert_eq!(active.get("shared").as_deref(), Some("A"));
        assert!(cell.is_installed());
    }

    #[tokio::test]
    async fn missing_single_location_installs_nothing() {
        let cell = StoreCell::new();
        let engine = aggregator(&cell, &abc());
        let err = engine
            .install_location("nope", PollingPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AggregationError::SourceUnavailable(_)));
        assert!(!cell.is_installed());
    }

    #[tokio::test]
    async fn first_listed_location_wins() {
        let cell = StoreCell::new();
        let engine = aggregator(&cell, &abc());
        let active = engine
            .install_locations(&["a", "b", "c"], false, PollingPolicy::default())
            .await
            .unwrap();

        assert_eq!(active.get("shared").as_deref(), Some("A"));
        assert_eq!(active.get("bc").as_deref(), Some("B"));
        assert_eq!(active.get("only.c").as_deref(), Some("3"));
        let order: Vec<_> = active.sources().iter().map(|s| s.name()).collect();
        assert_eq!(
            order,
            vec!["mem://host/a", "mem://host/b", "mem://host/c"]
        );
    }

    #[tokio::test]
    async fn ignore_missing_skips_unresolvable_location() {
        let cell = StoreCell::new();
        let files = vec![("a", "shared=A\n"), ("c", "only.c=3\n")];
        let engine = aggregator(&cell, &files);
        let active = engine
            .install_locations(&["a", "b", "c"], true, PollingPolicy::default())
            .await
            .unwrap();

        assert_eq!(active.sources().len(), 2);
        assert_eq!(active.get("shared").as_deref(), Some("A"));
        assert_eq!(active.get("only.c").as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn missing_location_without_flag_aborts() {
        let cell = StoreCell::new();
        let files = vec![("a", "shared=A\n"), ("c", "only.c=3\n")];
        let engine = aggregator(&cell, &files);
        let err = engine
            .install_locations(&["a", "b", "c"], false, PollingPolicy::default())
            .await
            .unwrap_err();

        match err {
            AggregationError::SourceUnavailable(e) => assert_eq!(e.origin(), "b"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!cell.is_installed());
    }

    #[tokio::test]
    async fn unreadable_location_without_flag_aborts() {
        let cell = StoreCell::new();
        let memory = MemoryLocations::with_unreadable(&abc(), &["down"]);
        let engine = Aggregator::new(&cell, Arc::new(ManualScheduler::default()))
            .with_resolver(memory.clone())
            .with_fetcher(memory);

        let err = engine
            .install_location("down", PollingPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AggregationError::SourceUnavailable(_)));
        assert!(!cell.is_installed());

        let err = engine
            .install_locations(&["a", "down"], false, PollingPolicy::default())
            .await
            .unwrap_err();
        match err {
            AggregationError::SourceUnavailable(e) => {
                assert_eq!(e.origin(), "mem://host/down")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!cell.is_installed());
    }

    #[tokio::test]
    async fn ignore_missing_skips_unreadable_location() {
        let cell = StoreCell::new();
        let memory = MemoryLocations::with_unreadable(&abc(), &["down"]);
        let engine = Aggregator::new(&cell, Arc::new(ManualScheduler::default()))
            .with_resolver(memory.clone())
            .with_fetcher(memory);

        let active = engine
            .install_locations(&["down", "b"], true, PollingPolicy::default())
            .await
            .unwrap();
        assert_eq!(active.sources().len(), 1);
        assert_eq!(active.get("shared").as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn aborted_build_stops_loaded_locations() {
        let cell = StoreCell::new();
        let memory = MemoryLocations::with_unreadable(&abc(), &["down"]);
        let scheduler = Arc::new(TaskScheduler::default());
        let engine = Aggregator::new(&cell, scheduler.clone())
            .with_resolver(memory.clone())
            .with_fetcher(memory);

        // Walked last-to-first: "a" is loaded and scheduled before "down" fails.
        engine
            .install_locations(&["down", "a"], false, PollingPolicy::default())
            .await
            .unwrap_err();

        assert!(!cell.is_installed());
        assert_eq!(scheduler.tasks.lock().unwrap().len(), 1);
        assert_eq!(scheduler.cancelled_after_yield().await, 1);
    }

    #[tokio::test]
    async fn unreachable_database_installs_nothing() {
        let cell = StoreCell::new();
        let memory = MemoryLocations::with(&abc());
        let scheduler = Arc::new(TaskScheduler::default());
        let engine = Aggregator::new(&cell, scheduler.clone())
            .with_resolver(memory.clone())
            .with_fetcher(memory)
            .with_connector(Arc::new(DownConnector));

        let err = engine
            .install_database(DESCRIPTOR, PollingPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AggregationError::SourceUnavailable(_)));
        assert!(!cell.is_installed());

        let err = engine
            .install_mixed(DESCRIPTOR, &["a", "b"], &parameter_map(1000, 1000, false, true))
            .await
            .unwrap_err();
        assert!(matches!(err, AggregationError::SourceUnavailable(_)));
        assert!(!cell.is_installed());
        assert!(scheduler.tasks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn mixed_location_failure_stops_database() {
        let cell = StoreCell::new();
        let scheduler = Arc::new(TaskScheduler::default());
        let memory = MemoryLocations::with(&abc());
        let engine = Aggregator::new(&cell, scheduler.clone())
            .with_resolver(memory.clone())
            .with_fetcher(memory)
            .with_connector(Arc::new(CannedConnector(vec![("shared", "db")])));

        let err = engine
            .install_mixed(DESCRIPTOR, &["a", "missing"], &parameter_map(1000, 1000, false, false))
            .await
            .unwrap_err();
        assert!(matches!(err, AggregationError::SourceUnavailable(_)));
        assert!(!cell.is_installed());
        assert_eq!(scheduler.tasks.lock().unwrap().len(), 1);
        assert_eq!(scheduler.cancelled_after_yield().await, 1);
    }

    #[tokio::test]
    async fn last_listed_failure_is_reported() {
        let cell = StoreCell::new();
        let engine = aggregator(&cell, &abc());
        let err = engine
            .install_locations(&["x", "a", "y"], false, PollingPolicy::default())
            .await
            .unwrap_err();
        match err {
            AggregationError::SourceUnavailable(e) => assert_eq!(e.origin(), "y"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn database_only_accepts_raw_and_mapped_descriptors() {
        let cell = StoreCell::new();
        let engine = aggregator(&cell, &[]);
        let active = engine
            .install_database(DESCRIPTOR, PollingPolicy::default())
            .await
            .unwrap();
        assert!(matches!(active, ActiveConfiguration::Single(_)));
        assert_eq!(active.get("db.only").as_deref(), Some("yes"));

        let other_cell = StoreCell::new();
        let engine = aggregator(&other_cell, &[]);
        let mapped = descriptor::parse(DESCRIPTOR).unwrap().to_map();
        engine
            .install_database(mapped, PollingPolicy::default())
            .await
            .unwrap();
        assert!(other_cell.is_installed());
    }

    #[tokio::test]
    async fn malformed_descriptor_installs_nothing() {
        let cell = StoreCell::new();
        let engine = aggregator(&cell, &[]);
        let err = engine
            .install_database("dbURL#x", PollingPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AggregationError::MalformedDescriptor(_)));
        assert!(err.to_string().contains("valueColumnName#"));
        assert!(!cell.is_installed());
    }

    #[tokio::test]
    async fn mixed_build_puts_database_first() {
        let cell = StoreCell::new();
        let engine = aggregator(&cell, &abc());
        let params = parameter_map(1000, 1000, false, false);
        let active = engine
            .install_mixed(DESCRIPTOR, &["a", "b"], &params)
            .await
            .unwrap();

        assert_eq!(active.get("shared").as_deref(), Some("db"));
        assert_eq!(active.get("bc").as_deref(), Some("B"));
        assert_eq!(active.get("only.a").as_deref(), Some("1"));
        let order: Vec<_> = active.sources().iter().map(|s| s.name()).collect();
        assert_eq!(order, vec!["sqlite:cfg.db", "mem://host/a", "mem://host/b"]);
    }

    #[tokio::test]
    async fn mixed_single_location_honours_ignore_missing() {
        let cell = StoreCell::new();
        let engine = aggregator(&cell, &abc());
        let params = parameter_map(1000, 1000, false, true);
        let active = engine
            .install_mixed_location(DESCRIPTOR, "nope", &params)
            .await
            .unwrap();
        assert_eq!(active.sources().len(), 1);

        let strict_cell = StoreCell::new();
        let engine = aggregator(&strict_cell, &abc());
        let params = parameter_map(1000, 1000, false, false);
        let err = engine
            .install_mixed_location(DESCRIPTOR, "nope", &params)
            .await
            .unwrap_err();
        assert!(matches!(err, AggregationError::SourceUnavailable(_)));
        assert!(!strict_cell.is_installed());
    }

    #[tokio::test]
    async fn mixed_rejects_bad_parameters_before_building() {
        let cell = StoreCell::new();
        let engine = aggregator(&cell, &abc());
        let mut params = parameter_map(1000, 1000, false, false);
        params.insert("delayMillis".into(), "often".into());
        let err = engine
            .install_mixed(DESCRIPTOR, &["a"], &params)
            .await
            .unwrap_err();
        assert!(matches!(err, AggregationError::InvalidParameter(_)));
        assert!(!cell.is_installed());
    }

    #[tokio::test]
    async fn second_install_fails_and_keeps_first() {
        let cell = StoreCell::new();
        let engine = aggregator(&cell, &abc());
        engine
            .install_location("a", PollingPolicy::default())
            .await
            .unwrap();

        let again = engine
            .install_locations(&["b"], false, PollingPolicy::default())
            .await
            .unwrap_err();
        assert_eq!(again, AggregationError::AlreadyConfigured(AlreadyConfigured));
        let db = engine
            .install_database(DESCRIPTOR, PollingPolicy::default())
            .await
            .unwrap_err();
        assert_eq!(db, AggregationError::AlreadyConfigured(AlreadyConfigured));

        assert_eq!(cell.get().unwrap().get("shared").as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn concurrent_installs_have_one_winner_and_loser_is_stopped() {
        let cell = StoreCell::new();
        let memory = MemoryLocations::with(&abc());
        let scheduler = Arc::new(TaskScheduler::default());
        let engine = Aggregator::new(&cell, scheduler.clone())
            .with_resolver(memory.clone())
            .with_fetcher(Arc::new(GatedFetcher {
                inner: memory,
                gate: tokio::sync::Barrier::new(2),
            }));

        // Both builds pass the vacancy check and load before either publishes.
        let (first, second) = tokio::join!(
            engine.install_location("a", PollingPolicy::default()),
            engine.install_location("b", PollingPolicy::default()),
        );

        let winner = match (&first, &second) {
            (Ok(_), Err(e)) => {
                assert_eq!(*e, AggregationError::AlreadyConfigured(AlreadyConfigured));
                "A"
            }
            (Err(e), Ok(_)) => {
                assert_eq!(*e, AggregationError::AlreadyConfigured(AlreadyConfigured));
                "B"
            }
            _ => panic!("expected exactly one winner: {first:?} / {second:?}"),
        };
        assert_eq!(cell.get().unwrap().get("shared").as_deref(), Some(winner));
        assert_eq!(scheduler.tasks.lock().unwrap().len(), 2);
        assert_eq!(scheduler.cancelled_after_yield().await, 1);
    }

    #[tokio::test]
    async fn guard_is_checked_before_parameters() {
        let cell = StoreCell::new();
        let engine = aggregator(&cell, &abc());
        engine
            .install_location("a", PollingPolicy::default())
            .await
            .unwrap();
        let err = engine
            .install_mixed("garbage", &["a"], &HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(err, AggregationError::AlreadyConfigured(AlreadyConfigured));
    }

    #[test]
    fn descriptor_input_conversions() {
        let parsed = descriptor::parse(DESCRIPTOR).unwrap();
        let from_map = DescriptorInput::from(parsed.to_map()).into_descriptor().unwrap();
        let from_parsed = DescriptorInput::from(parsed.clone()).into_descriptor().unwrap();
        let from_string = DescriptorInput::from(DESCRIPTOR.to_string())
            .into_descriptor()
            .unwrap();
        assert_eq!(from_map, parsed);
        assert_eq!(from_parsed, parsed);
        assert_eq!(from_string, parsed);
    }
}
