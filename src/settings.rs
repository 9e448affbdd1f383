//! Process settings for the server binary.
//!
//! Settings come from an optional file (YAML, TOML or JSON, picked by
//! extension) overlaid with `REMOTE_CONFIG__*` environment variables, e.g.
//! `REMOTE_CONFIG__LISTEN_ADDRESS=127.0.0.1:9000`.
//!
//! ```yaml
//! listen_address: 0.0.0.0:8090
//! refresh_interval_secs: 30
//! read_timeout_secs: 180
//! auth_key: s3cret
//! repositories:
//!   - name: payments
//!     kind: file
//!     path: /etc/config/payments.yaml
//!   - name: search
//!     kind: http
//!     url: https://config.internal/search.yaml
//!     api_key: upstream-key
//!     timeout_secs: 5
//! ```

use crate::error::{ConfigError, Result};
use crate::sources::{FileRepository, Repository};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Prefix of environment variables read by [`Settings::load`].
pub const ENV_PREFIX: &str = "REMOTE_CONFIG";

/// Separator between the prefix and nested keys in environment variables.
pub const ENV_SEPARATOR: &str = "__";

/// Environment variable naming the settings file used by the binary.
pub const SETTINGS_FILE_ENV: &str = "REMOTE_CONFIG_FILE";

/// Top-level server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Address the HTTP listener binds.
    pub listen_address: String,
    /// Seconds between refreshes of each repository.
    pub refresh_interval_secs: u64,
    /// Seconds allowed for draining connections on shutdown.
    pub shutdown_timeout_secs: u64,
    /// Seconds a connection may take to send request headers, idle time
    /// between keep-alive requests included.
    pub read_timeout_secs: u64,
    /// Seconds allowed for handling one request.
    pub request_timeout_secs: u64,
    /// Shared key required on protected routes. Unset or empty disables auth.
    #[serde(default)]
    pub auth_key: Option<String>,
    /// Repositories to serve.
    #[serde(default)]
    pub repositories: Vec<RepositorySettings>,
}

/// Backend used for a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    /// A YAML file on local disk.
    File,
    /// A YAML document fetched over HTTP.
    Http,
}

/// Settings for one repository.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositorySettings {
    /// Name to serve the repository under. Derived from the path or URL if
    /// omitted.
    #[serde(default)]
    pub name: Option<String>,
    /// Backend kind.
    pub kind: RepositoryKind,
    /// File path, for `file` repositories.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Endpoint, for `http` repositories.
    #[serde(default)]
    pub url: Option<String>,
    /// Upstream API key, for `http` repositories.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Upstream request timeout, for `http` repositories.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Settings {
    /// Load settings from `path` (if given) and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Settings`] if the file is missing or malformed,
    /// or a value has the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, environment())
    }

    fn load_with(path: Option<&Path>, environment: Environment) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("listen_address", "0.0.0.0:8090")?
            .set_default("refresh_interval_secs", 30)?
            .set_default("shutdown_timeout_secs", 30)?
            .set_default("read_timeout_secs", 180)?
            .set_default("request_timeout_secs", 180)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings: Settings = builder.add_source(environment).build()?.try_deserialize()?;
        tracing::debug!(
            listen_address = %settings.listen_address,
            repositories = settings.repositories.len(),
            "Settings loaded"
        );
        Ok(settings)
    }

    /// Refresh interval as a [`Duration`].
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Shutdown timeout as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Header read timeout as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Construct every configured repository.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRepository`] if a repository lacks the
    /// field its kind needs, or names a kind this build does not support.
    pub fn build_repositories(&self) -> Result<Vec<Arc<dyn Repository>>> {
        self.repositories.iter().map(RepositorySettings::build).collect()
    }
}

impl RepositorySettings {
    /// Construct the repository these settings describe.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRepository`] if a required field is
    /// missing.
    pub fn build(&self) -> Result<Arc<dyn Repository>> {
        match self.kind {
            RepositoryKind::File => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::InvalidRepository("file repository requires 'path'".to_string())
                })?;
                let mut repository = FileRepository::new(path)?;
                if let Some(name) = &self.name {
                    repository = repository.with_name(name.clone());
                }
                Ok(Arc::new(repository))
            }
            RepositoryKind::Http => self.build_http(),
        }
    }

    #[cfg(feature = "remote")]
    fn build_http(&self) -> Result<Arc<dyn Repository>> {
        let url = self.url.as_ref().ok_or_else(|| {
            ConfigError::InvalidRepository("http repository requires 'url'".to_string())
        })?;

        let mut builder = crate::sources::HttpRepository::builder().with_url(url.clone());
        if let Some(name) = &self.name {
            builder = builder.with_name(name.clone());
        }
        if let Some(key) = &self.api_key {
            builder = builder.with_api_key(key.clone());
        }
        if let Some(secs) = self.timeout_secs {
            builder = builder.with_timeout(Duration::from_secs(secs));
        }
        Ok(Arc::new(builder.build()?))
    }

    #[cfg(not(feature = "remote"))]
    fn build_http(&self) -> Result<Arc<dyn Repository>> {
        Err(ConfigError::InvalidRepository(
            "http repositories require the 'remote' feature".to_string(),
        ))
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}
