//! Location-backed sources: files, `classpath:` resources and HTTP URLs.
//!
//! Resolution (turning a location spec into a URL) happens once, when the
//! source is built; a spec that cannot be resolved fails the build.
//! Fetching happens on every poll.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::warn;

use super::{ConfigurationSource, Format, Snapshot, SourceError};
use crate::constants::DEFAULT_HTTP_TIMEOUT_SECS;

/// Prefix for resources looked up under the configured resource roots.
pub const CLASSPATH_PREFIX: &str = "classpath:";

/// Turns a location spec into a fetchable URL.
pub trait LocationResolver: Send + Sync {
    fn resolve(&self, spec: &str) -> Result<Url, SourceError>;
}

/// Reads the current contents behind a resolved URL.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String, SourceError>;
}

/// Resolver for `http(s)://` URLs, `file:` URLs, plain paths and
/// `classpath:` resources.
#[derive(Debug, Clone, Default)]
pub struct DefaultResolver {
    resource_roots: Vec<PathBuf>,
}

impl DefaultResolver {
    /// `resource_roots` are searched in order for `classpath:` specs.
    pub fn new(resource_roots: Vec<PathBuf>) -> Self {
        Self { resource_roots }
    }

    fn resolve_path(&self, spec: &str, path: &Path) -> Result<Url, SourceError> {
        if !path.is_file() {
            return Err(SourceError::unavailable(spec, "file not found"));
        }
        let absolute = path
            .canonicalize()
            .map_err(|e| SourceError::unavailable(spec, e))?;
        Url::from_file_path(&absolute)
            .map_err(|()| SourceError::unavailable(spec, "path cannot be expressed as a file URL"))
    }

    fn resolve_classpath(&self, spec: &str, relative: &str) -> Result<Url, SourceError> {
        let relative = relative.trim_start_matches('/');
        let found = self
            .resource_roots
            .iter()
            .map(|root| root.join(relative))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| {
                SourceError::unavailable(
                    spec,
                    format!(
                        "resource not found in {} resource root(s)",
                        self.resource_roots.len()
                    ),
                )
            })?;
        self.resolve_path(spec, &found)
    }
}

impl LocationResolver for DefaultResolver {
    fn resolve(&self, spec: &str) -> Result<Url, SourceError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(SourceError::unavailable(spec, "empty location"));
        }

        if let Some(relative) = spec.strip_prefix(CLASSPATH_PREFIX) {
            return self.resolve_classpath(spec, relative);
        }

        if spec.starts_with("http://") || spec.starts_with("https://") {
            return Url::parse(spec).map_err(|e| SourceError::unavailable(spec, e));
        }

        if spec.starts_with("file:") {
            let url = Url::parse(spec).map_err(|e| SourceError::unavailable(spec, e))?;
            let path = url
                .to_file_path()
                .map_err(|()| SourceError::unavailable(spec, "not a local file URL"))?;
            return self.resolve_path(spec, &path);
        }

        self.resolve_path(spec, Path::new(spec))
    }
}

/// Fetches `file:` URLs from disk and `http(s)` URLs with reqwest.
#[derive(Debug, Clone)]
pub struct DefaultFetcher {
    client: reqwest::Client,
}

impl DefaultFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("layerconf/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for DefaultFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client; falling back to one without a timeout");
                Self::with_client(reqwest::Client::new())
            })
    }
}

#[async_trait]
impl ContentFetcher for DefaultFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, SourceError> {
        match url.scheme() {
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|()| SourceError::unavailable(url.as_str(), "not a local file URL"))?;
                tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| SourceError::unavailable(url.as_str(), e))
            }
            "http" | "https" => {
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(|e| SourceError::unavailable(url.as_str(), e))?;
                response
                    .text()
                    .await
                    .map_err(|e| SourceError::unavailable(url.as_str(), e))
            }
            other => Err(SourceError::unavailable(
                url.as_str(),
                format!("unsupported scheme `{other}`"),
            )),
        }
    }
}

/// A source that re-reads one location on every poll.
pub struct LocationSource {
    url: Url,
    format: Format,
    fetcher: Arc<dyn ContentFetcher>,
}

impl LocationSource {
    pub fn new(url: Url, fetcher: Arc<dyn ContentFetcher>) -> Self {
        let format = Format::for_location(url.path());
        Self {
            url,
            format,
            fetcher,
        }
    }

    /// Override the format picked from the URL's extension.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn format(&self) -> Format {
        self.format
    }
}

#[async_trait]
impl ConfigurationSource for LocationSource {
    fn describe(&self) -> String {
        self.url.to_string()
    }

    async fn poll(&self) -> Result<Snapshot, SourceError> {
        let content = self.fetcher.fetch(&self.url).await?;
        self.format.parse(self.url.as_str(), &content)
    }
}
