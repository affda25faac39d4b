//! Query-backed sources.
//!
//! A [`DatabaseConnector`] turns a [`ConnectionDescriptor`] into a
//! [`QueryExecutor`]; the [`DatabaseSource`] runs the descriptor's query on
//! every poll and reads one key column and one value column per row.
//!
//! The default connector uses the sqlx `Any` driver (sqlite and postgres).
//! Pools are created lazily, so building a source validates the URL but
//! does not connect; connectivity problems surface on each poll.

use std::sync::{Arc, LazyLock, Once};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};

use super::{ConfigurationSource, Snapshot, SourceError};
use crate::descriptor::ConnectionDescriptor;

/// URL schemes the default connector accepts.
const SUPPORTED_SCHEMES: &[&str] = &["sqlite", "postgres", "postgresql"];

/// Prefix carried over from JDBC-style descriptors; stripped before use.
const JDBC_PREFIX: &str = "jdbc:";

const MAX_CONNECTIONS: u32 = 2;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

static INSTALL_DRIVERS: Once = Once::new();

/// Runs a query and returns `(key, value)` rows.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn fetch_pairs(
        &self,
        sql: &str,
        key_column: &str,
        value_column: &str,
    ) -> Result<Vec<(String, String)>, SourceError>;
}

/// Builds a connection handle from descriptor credentials.
pub trait DatabaseConnector: Send + Sync {
    fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn QueryExecutor>, SourceError>;
}

/// Connector backed by a lazily connecting sqlx `AnyPool`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxConnector;

impl DatabaseConnector for SqlxConnector {
    fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Arc<dyn QueryExecutor>, SourceError> {
        let display = redacted_url(descriptor.db_url());
        let url = connection_url(descriptor)?;

        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);
        let pool = AnyPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy(&url)
            .map_err(|e| SourceError::unavailable(&display, e))?;

        Ok(Arc::new(SqlxExecutor { pool, display }))
    }
}

/// Executes queries on an sqlx pool.
pub struct SqlxExecutor {
    pool: AnyPool,
    display: String,
}

#[async_trait]
impl QueryExecutor for SqlxExecutor {
    async fn fetch_pairs(
        &self,
        sql: &str,
        key_column: &str,
        value_column: &str,
    ) -> Result<Vec<(String, String)>, SourceError> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SourceError::unavailable(&self.display, e))?;

        let mut pairs = Vec::with_capacity(rows.len());
        for row in &rows {
            let key = column_text(row, key_column)
                .map_err(|e| SourceError::unavailable(&self.display, e))?;
            let value = column_text(row, value_column)
                .map_err(|e| SourceError::unavailable(&self.display, e))?;
            if let (Some(key), Some(value)) = (key, value) {
                pairs.push((key, value));
            }
        }
        Ok(pairs)
    }
}

/// Read a column as text, accepting integer, float and boolean columns too.
fn column_text(row: &AnyRow, column: &str) -> Result<Option<String>, sqlx::Error> {
    if let Ok(text) = row.try_get::<Option<String>, _>(column) {
        return Ok(text);
    }
    if let Ok(number) = row.try_get::<Option<i64>, _>(column) {
        return Ok(number.map(|n| n.to_string()));
    }
    if let Ok(number) = row.try_get::<Option<f64>, _>(column) {
        return Ok(number.map(|n| n.to_string()));
    }
    row.try_get::<Option<bool>, _>(column)
        .map(|b| b.map(|b| b.to_string()))
}

/// Normalize the descriptor URL and fold in its credentials.
fn connection_url(descriptor: &ConnectionDescriptor) -> Result<String, SourceError> {
    let raw = descriptor.db_url().trim();
    let display = redacted_url(raw);
    let raw = raw.strip_prefix(JDBC_PREFIX).unwrap_or(raw);

    let mut url = Url::parse(raw).map_err(|e| SourceError::unavailable(&display, e))?;
    if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
        return Err(SourceError::unavailable(
            &display,
            format!(
                "unsupported database scheme `{}` (supported: {})",
                url.scheme(),
                SUPPORTED_SCHEMES.join(", ")
            ),
        ));
    }

    if url.has_host() && !descriptor.username().is_empty() {
        url.set_username(descriptor.username())
            .map_err(|()| SourceError::unavailable(&display, "cannot set username"))?;
        let password = Some(descriptor.password()).filter(|p| !p.is_empty());
        url.set_password(password)
            .map_err(|()| SourceError::unavailable(&display, "cannot set password"))?;
    }

    Ok(url.to_string())
}

/// `user:password@` right after the scheme separator.
static USERINFO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"//([^/@:]*):[^/]*@").expect("userinfo pattern is valid")
});

/// The URL with any embedded password masked, for logs and errors.
///
/// URLs that do not parse are masked textually.
pub fn redacted_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed.strip_prefix(JDBC_PREFIX).unwrap_or(trimmed);
    match Url::parse(inner) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("REDACTED"));
            url.to_string()
        }
        Ok(_) => trimmed.to_string(),
        Err(_) => USERINFO_RE
            .replace(trimmed, "//${1}:REDACTED@")
            .into_owned(),
    }
}

/// A source that runs one query per poll.
pub struct DatabaseSource {
    executor: Arc<dyn QueryExecutor>,
    query: String,
    key_column: String,
    value_column: String,
    display: String,
}

impl DatabaseSource {
    pub fn new(executor: Arc<dyn QueryExecutor>, descriptor: &ConnectionDescriptor) -> Self {
        Self {
            executor,
            query: descriptor.sql_query().to_string(),
            key_column: descriptor.key_column().to_string(),
            value_column: descriptor.value_column().to_string(),
            display: redacted_url(descriptor.db_url()),
        }
    }
}

#[async_trait]
impl ConfigurationSource for DatabaseSource {
    fn describe(&self) -> String {
        self.display.clone()
    }

    async fn poll(&self) -> Result<Snapshot, SourceError> {
        let rows = self
            .executor
            .fetch_pairs(&self.query, &self.key_column, &self.value_column)
            .await?;
        Ok(rows.into_iter().collect())
    }
}
