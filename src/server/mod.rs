//! Multi-repository HTTP publisher.
//!
//! A [`Server`] refreshes several repositories in the background and serves
//! their raw snapshots over HTTP, together with health, readiness and status
//! probes. Unlike a [`Client`](crate::core::Client), a server tolerates
//! repositories that fail their first refresh: the failure is recorded and
//! the repository keeps retrying on its interval.

mod auth;
mod routes;

pub use auth::API_KEY_HEADER;

use crate::core::{StatusTracker, effective_interval, refresh_once, spawn_refresh_task};
use crate::error::{ConfigError, Result};
use crate::sources::Repository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Paths served by the server itself, unavailable as repository names.
pub const RESERVED_NAMES: [&str; 3] = ["health", "ready", "status"];

/// Status of one repository as reported by `/health` and `/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryStatus {
    /// Repository name
    pub name: String,
    /// Time of the last successful refresh
    pub last_refresh_time: Option<DateTime<Utc>>,
    /// Message of the last failed refresh, if it has not succeeded since
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refresh_error: Option<String>,
    /// Successful refreshes
    pub refresh_count: u64,
    /// Failed refreshes
    pub refresh_errors: u64,
    /// Whether the most recent refresh succeeded
    pub is_healthy: bool,
}

struct Entry {
    repository: Arc<dyn Repository>,
    status: Arc<StatusTracker>,
}

impl Entry {
    fn status(&self) -> RepositoryStatus {
        let snapshot = self.status.snapshot();
        RepositoryStatus {
            name: self.repository.name().to_string(),
            last_refresh_time: snapshot.last_refresh_time,
            last_refresh_error: snapshot.last_error,
            refresh_count: snapshot.refresh_count,
            refresh_errors: snapshot.error_count,
            is_healthy: self.status.last_outcome_ok(),
        }
    }
}

/// Refreshes a set of repositories and publishes them over HTTP.
///
/// Cloning a `Server` is cheap and yields a handle to the same server, which
/// is how the HTTP handlers and a signal-watching task share it.
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
/// let server = Server::builder()
///     .with_repository(Arc::new(FileRepository::new("config/payments.yaml")?))
///     .with_repository(Arc::new(FileRepository::new("config/search.yaml")?))
///     .with_refresh_interval(Duration::from_secs(30))
///     .with_auth_key("s3cret")
///     .build()
///     .await?;
///
/// server.start_with_graceful_shutdown("0.0.0.0:8090").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    entries: Vec<Entry>,
    refresh_interval: Duration,
    auth_key: Option<Arc<str>>,
    shutdown_timeout: Duration,
    request_timeout: Duration,
    read_timeout: Duration,
    cancel: CancellationToken,
    tasks: TaskTracker,
    // Fired once by `shutdown`; accept loops and connections watch it.
    closing: CancellationToken,
    // Accept loops and open connections.
    http: TaskTracker,
}

impl Drop for ServerInner {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.closing.cancel();
    }
}

impl Server {
    /// Create a server with default options.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRepository`] if repository names are
    /// empty, duplicated, contain `/` or collide with a built-in path.
    /// Refresh failures are never an error here.
    pub async fn new(repositories: Vec<Arc<dyn Repository>>, refresh_interval: Duration) -> Result<Self> {
        Self::builder()
            .with_repositories(repositories)
            .with_refresh_interval(refresh_interval)
            .build()
            .await
    }

    /// Create a new builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// The refresh interval in effect, after the minimum was applied.
    pub fn refresh_interval(&self) -> Duration {
        self.inner.refresh_interval
    }

    /// Names of the served repositories, in registration order.
    pub fn repository_names(&self) -> impl Iterator<Item = &str> {
        self.inner.entries.iter().map(|entry| entry.repository.name())
    }

    /// True when there is at least one repository and every repository's
    /// most recent refresh succeeded.
    pub fn is_healthy(&self) -> bool {
        !self.inner.entries.is_empty() && self.inner.entries.iter().all(|entry| entry.status.last_outcome_ok())
    }

    /// True when at least one repository has refreshed successfully.
    pub fn is_ready(&self) -> bool {
        self.inner.entries.iter().any(|entry| entry.status.has_succeeded())
    }

    /// Copy of every repository's status, keyed by name.
    pub fn repository_status(&self) -> BTreeMap<String, RepositoryStatus> {
        self.inner
            .entries
            .iter()
            .map(|entry| (entry.repository.name().to_string(), entry.status()))
            .collect()
    }

    pub(crate) fn repository(&self, name: &str) -> Option<&Arc<dyn Repository>> {
        self.inner
            .entries
            .iter()
            .map(|entry| &entry.repository)
            .find(|repository| repository.name() == name)
    }

    /// Bind `address` and serve until [`shutdown`](Self::shutdown) is called.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Bind`] if the address cannot be bound.
    pub async fn start(&self, address: &str) -> Result<()> {
        let listener = TcpListener::bind(address).await.map_err(|source| {
            tracing::error!(address = %address, error = %source, "Failed to bind HTTP listener");
            ConfigError::Bind {
                address: address.to_string(),
                source,
            }
        })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until [`shutdown`](Self::shutdown)
    /// is called.
    ///
    /// Several listeners may be served at once; `shutdown` drains all of
    /// them. Serving a listener after `shutdown` returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serve`] if the listener address cannot be read.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let address = listener.local_addr().map_err(ConfigError::Serve)?;
        let closing = self.inner.closing.clone();
        if closing.is_cancelled() {
            tracing::info!(address = %address, "Server is shutting down, not serving");
            return Ok(());
        }
        let _serving = self.inner.http.token();

        tracing::info!(address = %address, "HTTP server listening");

        let router = self.router();
        loop {
            let accepted = tokio::select! {
                biased;
                () = closing.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => self.spawn_connection(stream, peer, router.clone()),
                Err(e) if is_connection_error(&e) => continue,
                Err(e) => {
                    // EMFILE and friends; retry after a pause.
                    tracing::error!(address = %address, error = %e, "Failed to accept connection");
                    tokio::select! {
                        () = closing.cancelled() => break,
                        () = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
            }
        }
        drop(listener);

        tracing::info!(address = %address, "HTTP server stopped accepting connections");
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr, router: Router) {
        let closing = self.inner.closing.clone();
        let read_timeout = self.inner.read_timeout;
        self.inner.http.spawn(async move {
            let mut builder = auto::Builder::new(TokioExecutor::new());
            builder
                .http1()
                .timer(TokioTimer::new())
                .header_read_timeout(read_timeout);
            let connection =
                builder.serve_connection_with_upgrades(TokioIo::new(stream), TowerToHyperService::new(router));
            let mut connection = std::pin::pin!(connection);

            let mut draining = false;
            loop {
                tokio::select! {
                    result = connection.as_mut() => {
                        if let Err(e) = result {
                            tracing::debug!(peer = %peer, error = %e, "Connection closed with error");
                        }
                        break;
                    }
                    () = closing.cancelled(), if !draining => {
                        draining = true;
                        connection.as_mut().graceful_shutdown();
                    }
                }
            }
        });
    }

    /// Serve on `address` until SIGINT or SIGTERM, then shut down gracefully.
    ///
    /// # Errors
    ///
    /// Returns the start error if the server could not start, or the
    /// shutdown error if draining failed.
    pub async fn start_with_graceful_shutdown(&self, address: &str) -> Result<()> {
        let server = self.clone();
        let address = address.to_string();
        let mut running = tokio::spawn(async move { server.start(&address).await });

        tokio::select! {
            () = shutdown_signal() => {
                tracing::info!("Received shutdown signal, initiating graceful shutdown");
            }
            joined = &mut running => {
                return match joined {
                    Ok(result) => result,
                    Err(e) => Err(ConfigError::Serve(std::io::Error::other(e))),
                };
            }
        }

        self.shutdown().await?;
        // Serving has drained; surface anything it reported on the way out.
        match running.await {
            Ok(result) => result,
            Err(e) => Err(ConfigError::Serve(std::io::Error::other(e))),
        }
    }

    /// Stop every refresh task and wait until they have exited.
    ///
    /// Idempotent. The HTTP listener, if any, keeps serving the last
    /// snapshots.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();
        self.inner.tasks.wait().await;
        tracing::debug!("Refresh tasks stopped");
    }

    /// Stop refreshing, then drain every HTTP listener.
    ///
    /// Refresh tasks have all exited before the listeners begin to close.
    /// Draining is bounded by the shutdown timeout. Listeners served after
    /// this call stop at once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ShutdownTimeout`] if open connections do not
    /// finish within the shutdown timeout.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop().await;

        self.inner.closing.cancel();
        self.inner.http.close();
        if self.inner.http.is_empty() {
            return Ok(());
        }

        tracing::info!(connections = self.inner.http.len(), "Shutting down HTTP server");

        let timeout = self.inner.shutdown_timeout;
        match tokio::time::timeout(timeout, self.inner.http.wait()).await {
            Ok(_) => {
                tracing::info!("Server shutdown complete");
                Ok(())
            }
            Err(_) => {
                tracing::error!(timeout_secs = timeout.as_secs(), "HTTP server did not drain in time");
                Err(ConfigError::ShutdownTimeout(timeout))
            }
        }
    }
}

fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
    )
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("repositories", &self.repository_names().collect::<Vec<_>>())
            .field("refresh_interval", &self.inner.refresh_interval)
            .field("auth", &self.inner.auth_key.is_some())
            .finish()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Builder for constructing a [`Server`].
pub struct ServerBuilder {
    repositories: Vec<Arc<dyn Repository>>,
    refresh_interval: Duration,
    auth_key: Option<String>,
    shutdown_timeout: Duration,
    request_timeout: Duration,
    read_timeout: Duration,
}

impl ServerBuilder {
    /// Default refresh interval.
    pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
    /// Default bound on draining the listener during shutdown.
    pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default bound on a single request.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);
    /// Default bound on receiving request headers, idle keep-alive included.
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(180);

    /// Create a builder with no repositories.
    pub fn new() -> Self {
        Self {
            repositories: Vec::new(),
            refresh_interval: Self::DEFAULT_REFRESH_INTERVAL,
            auth_key: None,
            shutdown_timeout: Self::DEFAULT_SHUTDOWN_TIMEOUT,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            read_timeout: Self::DEFAULT_READ_TIMEOUT,
        }
    }

    /// Serve `repository` at `/{name}`.
    pub fn with_repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repositories.push(repository);
        self
    }

    /// Serve every repository in `repositories`.
    pub fn with_repositories(mut self, repositories: impl IntoIterator<Item = Arc<dyn Repository>>) -> Self {
        self.repositories.extend(repositories);
        self
    }

    /// Set the refresh interval. Raised to the minimum if shorter.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Require `X-API-KEY: <key>` on every route except `/health` and
    /// `/ready`. An empty key disables authentication.
    pub fn with_auth_key(mut self, key: impl Into<String>) -> Self {
        self.auth_key = Some(key.into());
        self
    }

    /// Bound how long [`Server::shutdown`] waits for connections to drain.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Bound how long a single request may take.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Bound how long a connection may take to deliver request headers.
    ///
    /// The clock also runs while a keep-alive connection sits idle between
    /// requests, so idle connections are closed after this long.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Validate the repository set, refresh every repository once and start
    /// the refresh tasks.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRepository`] for unusable names.
    pub async fn build(self) -> Result<Server> {
        validate_names(&self.repositories)?;

        let refresh_interval = effective_interval(self.refresh_interval);
        let entries: Vec<Entry> = self
            .repositories
            .into_iter()
            .map(|repository| Entry {
                repository,
                status: Arc::new(StatusTracker::new(refresh_interval)),
            })
            .collect();

        for entry in &entries {
            match refresh_once(entry.repository.as_ref(), &entry.status).await {
                Ok(()) => tracing::info!(repository = %entry.repository.name(), "Initial refresh succeeded"),
                Err(_) => tracing::warn!(
                    repository = %entry.repository.name(),
                    "Initial refresh failed, will retry on the next interval"
                ),
            }
        }

        let cancel = CancellationToken::new();
        let tasks = TaskTracker::new();
        for entry in &entries {
            spawn_refresh_task(
                &tasks,
                Arc::clone(&entry.repository),
                Arc::clone(&entry.status),
                refresh_interval,
                cancel.clone(),
            );
        }
        tasks.close();

        tracing::info!(
            repositories = entries.len(),
            interval_secs = refresh_interval.as_secs(),
            "Server started"
        );

        Ok(Server {
            inner: Arc::new(ServerInner {
                entries,
                refresh_interval,
                auth_key: self.auth_key.filter(|key| !key.is_empty()).map(Arc::from),
                shutdown_timeout: self.shutdown_timeout,
                request_timeout: self.request_timeout,
                read_timeout: self.read_timeout,
                cancel,
                tasks,
                closing: CancellationToken::new(),
                http: TaskTracker::new(),
            }),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_names(repositories: &[Arc<dyn Repository>]) -> Result<()> {
    let mut seen = HashSet::new();
    for repository in repositories {
        let name = repository.name();
        if name.is_empty() {
            return Err(ConfigError::InvalidRepository("repository name is empty".to_string()));
        }
        if name.contains('/') {
            return Err(ConfigError::InvalidRepository(format!(
                "repository name '{}' contains '/'",
                name
            )));
        }
        if RESERVED_NAMES.contains(&name) {
            return Err(ConfigError::InvalidRepository(format!(
                "repository name '{}' is reserved",
                name
            )));
        }
        if !seen.insert(name) {
            return Err(ConfigError::InvalidRepository(format!(
                "duplicate repository name '{}'",
                name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MIN_REFRESH_INTERVAL;
    use crate::sources::mock::MockRepository;

    fn repo(repository: MockRepository) -> Arc<dyn Repository> {
        Arc::new(repository)
    }

    #[tokio::test]
    async fn test_interval_floor() {
        let server = Server::new(vec![repo(MockRepository::new("a"))], Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(server.refresh_interval(), MIN_REFRESH_INTERVAL);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_single_failing_repository() {
        let server = Server::new(vec![repo(MockRepository::failing("broken"))], MIN_REFRESH_INTERVAL)
            .await
            .unwrap();

        assert!(!server.is_healthy());
        assert!(!server.is_ready());

        let status = &server.repository_status()["broken"];
        assert_eq!(status.refresh_count, 0);
        assert_eq!(status.refresh_errors, 1);
        assert!(!status.is_healthy);
        assert!(status.last_refresh_time.is_none());
        server.stop().await;
    }

    #[tokio::test]
    async fn test_mixed_repositories() {
        let server = Server::new(
            vec![repo(MockRepository::new("good")), repo(MockRepository::failing("bad"))],
            MIN_REFRESH_INTERVAL,
        )
        .await
        .unwrap();

        assert!(!server.is_healthy());
        assert!(server.is_ready());
        assert_eq!(server.repository_names().collect::<Vec<_>>(), vec!["good", "bad"]);

        let statuses = server.repository_status();
        assert!(statuses["good"].is_healthy);
        assert_eq!(statuses["good"].refresh_count, 1);
        assert!(!statuses["bad"].is_healthy);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_empty_server_is_not_healthy() {
        let server = Server::builder().build().await.unwrap();
        assert!(!server.is_healthy());
        assert!(!server.is_ready());
        assert!(server.repository_status().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_names_are_rejected() {
        for names in [vec!["a", "a"], vec![""], vec!["a/b"], vec!["status"], vec!["health"]] {
            let repositories = names.into_iter().map(|name| repo(MockRepository::new(name))).collect();
            let result = Server::new(repositories, MIN_REFRESH_INTERVAL).await;
            assert!(matches!(result, Err(ConfigError::InvalidRepository(_))));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_repository_recovers() {
        let flaky = Arc::new(MockRepository::failing("flaky"));
        let server = Server::new(vec![flaky.clone() as Arc<dyn Repository>], MIN_REFRESH_INTERVAL)
            .await
            .unwrap();
        assert!(!server.is_ready());

        flaky.set_failing(false);
        tokio::time::sleep(MIN_REFRESH_INTERVAL + Duration::from_millis(10)).await;

        assert!(server.is_ready());
        assert!(server.is_healthy());
        let status = &server.repository_status()["flaky"];
        assert!(status.last_refresh_error.is_none());
        assert_eq!(status.refresh_errors, 1);
        server.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_refresh_tasks() {
        let a = Arc::new(MockRepository::new("a"));
        let b = Arc::new(MockRepository::new("b"));
        let server = Server::new(
            vec![a.clone() as Arc<dyn Repository>, b.clone() as Arc<dyn Repository>],
            MIN_REFRESH_INTERVAL,
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        server.stop().await;
        let counts = (a.refresh_count(), b.refresh_count());
        assert_eq!(counts, (3, 3));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!((a.refresh_count(), b.refresh_count()), counts);

        // Stopping twice is harmless.
        server.stop().await;
    }

    #[tokio::test]
    async fn test_shutdown_without_listener() {
        let server = Server::new(vec![repo(MockRepository::new("a"))], MIN_REFRESH_INTERVAL)
            .await
            .unwrap();
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_serve_after_shutdown_returns_immediately() {
        let server = Server::new(vec![repo(MockRepository::new("a"))], MIN_REFRESH_INTERVAL)
            .await
            .unwrap();
        server.shutdown().await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let serving = {
            let server = server.clone();
            tokio::spawn(async move { server.serve(listener).await })
        };
        let result = tokio::time::timeout(Duration::from_secs(2), serving).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shutdown_racing_serve_always_stops_it() {
        for _ in 0..50 {
            let server = Server::new(vec![repo(MockRepository::new("a"))], MIN_REFRESH_INTERVAL)
                .await
                .unwrap();
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let serving = {
                let server = server.clone();
                tokio::spawn(async move { server.serve(listener).await })
            };

            server.shutdown().await.unwrap();
            let result = tokio::time::timeout(Duration::from_secs(2), serving).await;
            assert!(matches!(result, Ok(Ok(Ok(())))));
        }
    }

    #[test]
    fn test_status_serialization_omits_missing_error() {
        let status = RepositoryStatus {
            name: "a".to_string(),
            last_refresh_time: None,
            last_refresh_error: None,
            refresh_count: 0,
            refresh_errors: 0,
            is_healthy: false,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert!(json.get("last_refresh_error").is_none());
        assert_eq!(json["refresh_errors"], 0);
        assert!(json["last_refresh_time"].is_null());
    }
}
