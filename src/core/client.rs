//! Single-repository configuration client.

use crate::core::lookup::{self, FromConfigValue};
use crate::core::registry;
use crate::core::scheduler::{effective_interval, refresh_once, spawn_refresh_task};
use crate::core::status::{RefreshStatus, StatusTracker};
use crate::error::{ConfigError, Fallback, Result};
use crate::sources::Repository;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Options controlling client construction.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Register the new client as the process-wide default. Defaults to `true`.
    pub set_as_default: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            set_as_default: true,
        }
    }
}

/// Reads configuration from one [`Repository`] and keeps it fresh in the
/// background.
///
/// Construction performs a first refresh and fails if it does, so a client
/// always starts with data. After that a background task refreshes the
/// repository every interval; failures are logged and counted but never
/// surface through the accessors, which keep serving the last good snapshot.
///
/// Cloning a `Client` is cheap and yields a handle to the same client.
///
/// # Examples
///
/// ```rust,no_run
/// use remote_config::prelude::*;
/// use remote_config::sources::FileRepository;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<()> {
/// let repository = Arc::new(FileRepository::new("config/app.yaml")?);
/// let client = Client::new(repository, Duration::from_secs(30)).await?;
///
/// let name = client.get_string("name", "unknown").unwrap_or_else(Fallback::into_value);
/// println!("Hello, {}", name);
///
/// client.close();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    repository: Arc<dyn Repository>,
    refresh_interval: Duration,
    status: Arc<StatusTracker>,
    cancel: CancellationToken,
    tasks: TaskTracker,
    closed: AtomicBool,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Client {
    /// Create a client and register it as the process-wide default.
    ///
    /// `refresh_interval` is raised to
    /// [`MIN_REFRESH_INTERVAL`](crate::core::MIN_REFRESH_INTERVAL) if it is
    /// shorter.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InitialRefresh`] if the first refresh fails.
    pub async fn new(repository: Arc<dyn Repository>, refresh_interval: Duration) -> Result<Self> {
        Self::with_options(repository, refresh_interval, ClientOptions::default()).await
    }

    /// Create a client with explicit [`ClientOptions`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InitialRefresh`] if the first refresh fails.
    pub async fn with_options(
        repository: Arc<dyn Repository>,
        refresh_interval: Duration,
        options: ClientOptions,
    ) -> Result<Self> {
        let refresh_interval = effective_interval(refresh_interval);
        let status = Arc::new(StatusTracker::new(refresh_interval));

        refresh_once(repository.as_ref(), &status)
            .await
            .map_err(|e| ConfigError::InitialRefresh {
                repository: repository.name().to_string(),
                source: Box::new(e),
            })?;

        let cancel = CancellationToken::new();
        let tasks = TaskTracker::new();
        spawn_refresh_task(
            &tasks,
            Arc::clone(&repository),
            Arc::clone(&status),
            refresh_interval,
            cancel.clone(),
        );
        tasks.close();

        tracing::info!(
            repository = %repository.name(),
            interval_secs = refresh_interval.as_secs(),
            "Client started"
        );

        let client = Self {
            inner: Arc::new(ClientInner {
                repository,
                refresh_interval,
                status,
                cancel,
                tasks,
                closed: AtomicBool::new(false),
            }),
        };

        if options.set_as_default {
            registry::set_default_client(client.clone());
        }

        Ok(client)
    }

    /// Create a builder for a client reading `repository`.
    pub fn builder(repository: Arc<dyn Repository>) -> ClientBuilder {
        ClientBuilder::new(repository)
    }

    /// Name of the underlying repository.
    pub fn name(&self) -> &str {
        self.inner.repository.name()
    }

    /// The refresh interval in effect, after the minimum was applied.
    pub fn refresh_interval(&self) -> Duration {
        self.inner.refresh_interval
    }

    /// Decode the value stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed, the key is missing, or the
    /// value cannot be decoded into `T`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        self.ensure_open()?;
        lookup::decode(name, self.inner.repository.get_data(name))
    }

    /// Decode the value stored under `name` into `out`.
    ///
    /// On any failure `default` is written to `out` before the error is
    /// returned, so `out` always holds a usable value afterwards.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use remote_config::prelude::*;
    /// # fn example(client: &Client) {
    /// let mut region = String::new();
    /// if let Err(e) = client.get_config("region", &mut region, "us-east-1".to_string()) {
    ///     tracing::warn!(error = %e, "Using default region");
    /// }
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the client is closed, the key is missing, or the
    /// value cannot be decoded into `T`.
    pub fn get_config<T: DeserializeOwned>(&self, name: &str, out: &mut T, default: T) -> Result<()> {
        match self.get(name) {
            Ok(value) => {
                *out = value;
                Ok(())
            }
            Err(err) => {
                *out = default;
                Err(err)
            }
        }
    }

    /// Read a value with a strict [`FromConfigValue`] conversion, falling
    /// back to `default` on failure.
    pub fn get_typed<T: FromConfigValue>(&self, name: &str, default: T) -> std::result::Result<T, Fallback<T>> {
        self.ensure_open()
            .and_then(|()| lookup::convert(name, self.inner.repository.get_data(name)))
            .map_err(|e| Fallback::new(default, e))
    }

    /// Read a string value.
    pub fn get_string(&self, name: &str, default: impl Into<String>) -> std::result::Result<String, Fallback<String>> {
        self.get_typed(name, default.into())
    }

    /// Read an integer value. Floats are a type mismatch.
    pub fn get_int(&self, name: &str, default: i64) -> std::result::Result<i64, Fallback<i64>> {
        self.get_typed(name, default)
    }

    /// Read a float value. Integers are a type mismatch.
    pub fn get_float(&self, name: &str, default: f64) -> std::result::Result<f64, Fallback<f64>> {
        self.get_typed(name, default)
    }

    /// Read a boolean value.
    pub fn get_bool(&self, name: &str, default: bool) -> std::result::Result<bool, Fallback<bool>> {
        self.get_typed(name, default)
    }

    /// Read a sequence whose items are all strings.
    pub fn get_string_array(
        &self,
        name: &str,
        default: Vec<String>,
    ) -> std::result::Result<Vec<String>, Fallback<Vec<String>>> {
        self.get_typed(name, default)
    }

    /// The encoded bytes of the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Closed`] if the client is closed.
    pub fn raw_data(&self) -> Result<Bytes> {
        self.ensure_open()?;
        Ok(self.inner.repository.get_raw_data())
    }

    /// Copy of the current refresh accounting.
    pub fn refresh_status(&self) -> RefreshStatus {
        self.inner.status.snapshot()
    }

    /// Whether the cached data is fresh enough to serve.
    ///
    /// Only staleness counts: a failed refresh leaves the client healthy
    /// until two intervals pass without a success. A closed client is never
    /// healthy.
    pub fn is_healthy(&self) -> bool {
        !self.is_closed() && !self.inner.status.is_stale()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Stop background refreshes and make every accessor fail.
    ///
    /// Idempotent and safe to call from several tasks at once.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.cancel.cancel();
        tracing::info!(repository = %self.name(), "Client closed");
    }

    /// Close the client and wait until its refresh task has exited.
    pub async fn close_and_wait(&self) {
        self.close();
        self.inner.tasks.wait().await;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(ConfigError::Closed)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("repository", &self.name())
            .field("refresh_interval", &self.inner.refresh_interval)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Builder for constructing a [`Client`].
///
/// # Examples
///
/// ```rust,no_run
/// use remote_config::prelude::*;
/// use remote_config::sources::FileRepository;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<()> {
/// let client = Client::builder(Arc::new(FileRepository::new("flags.yaml")?))
///     .with_refresh_interval(Duration::from_secs(60))
///     .with_set_as_default(false)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    repository: Arc<dyn Repository>,
    refresh_interval: Duration,
    options: ClientOptions,
}

impl ClientBuilder {
    /// Default refresh interval used when none is given.
    pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

    /// Create a builder for a client reading `repository`.
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self {
            repository,
            refresh_interval: Self::DEFAULT_REFRESH_INTERVAL,
            options: ClientOptions::default(),
        }
    }

    /// Set the refresh interval.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Choose whether the client becomes the process-wide default.
    pub fn with_set_as_default(mut self, set_as_default: bool) -> Self {
        self.options.set_as_default = set_as_default;
        self
    }

    /// Perform the first refresh and start the client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InitialRefresh`] if the first refresh fails.
    pub async fn build(self) -> Result<Client> {
        Client::with_options(self.repository, self.refresh_interval, self.options).await
    }
}
