//! Remote HTTP/HTTPS repository.

use super::Repository;
use crate::core::{Snapshot, SnapshotCell};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde_yaml::Value;
use std::time::Duration;

/// Header carrying the API key sent to the remote endpoint.
const API_KEY_HEADER: &str = "X-API-Key";

/// Repository that fetches a YAML document from an HTTP endpoint.
///
/// # Examples
///
/// ```rust,no_run
/// use remote_config::sources::HttpRepository;
/// use std::time::Duration;
///
/// # fn example() -> remote_config::error::Result<()> {
/// let repository = HttpRepository::builder()
///     .with_name("payments")
///     .with_url("https://config.example.com/payments.yaml")
///     .with_api_key("secret-key")
///     .with_timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct HttpRepository {
    name: String,
    url: String,
    api_key: Option<String>,
    client: Client,
    snapshot: SnapshotCell,
}

impl HttpRepository {
    /// Create a new builder for constructing an HTTP repository.
    pub fn builder() -> HttpRepositoryBuilder {
        HttpRepositoryBuilder::new()
    }

    /// The URL this repository fetches.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Bytes> {
        let mut request = self.client.get(&self.url);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ConfigError::LoadError(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConfigError::LoadError(format!(
                "HTTP request failed with status {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| ConfigError::LoadError(format!("Failed to read response body: {}", e)))
    }
}

#[async_trait]
impl Repository for HttpRepository {
    async fn refresh(&self) -> Result<()> {
        let raw = self.fetch().await?;
        let snapshot = Snapshot::from_yaml(raw)?;
        self.snapshot.store(snapshot);
        Ok(())
    }

    fn get_data(&self, key: &str) -> Option<Value> {
        self.snapshot.get(key)
    }

    fn get_raw_data(&self) -> Bytes {
        self.snapshot.raw()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Builder for constructing an [`HttpRepository`].
pub struct HttpRepositoryBuilder {
    name: Option<String>,
    url: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpRepositoryBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            name: None,
            url: None,
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Set the repository name. Defaults to the last path segment of the URL.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the URL to fetch configuration from.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Send `key` in the `X-API-Key` header of every request.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the request timeout. Default is 10 seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the HTTP repository.
    ///
    /// # Errors
    ///
    /// Returns an error if no URL is provided, if no name is given and none
    /// can be derived from the URL, or if the HTTP client cannot be built.
    pub fn build(self) -> Result<HttpRepository> {
        let url = self
            .url
            .ok_or_else(|| ConfigError::LoadError("URL is required for HttpRepository".to_string()))?;

        let name = match self.name {
            Some(name) => name,
            None => name_from_url(&url).ok_or_else(|| {
                ConfigError::LoadError(format!("Cannot derive a repository name from {}", url))
            })?,
        };

        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ConfigError::LoadError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpRepository {
            name,
            url,
            api_key: self.api_key,
            client,
            snapshot: SnapshotCell::new(),
        })
    }
}

impl Default for HttpRepositoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `https://host/path/app.yaml?x=1` → `app`
fn name_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let path = path.split_once("://").map_or(path, |(_, rest)| rest);
    let (_, path) = path.split_once('/')?;
    let segment = path.trim_end_matches('/').rsplit('/').next()?;
    let stem = segment.split('.').next()?;
    (!stem.is_empty()).then(|| stem.to_string())
}
