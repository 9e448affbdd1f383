//! Error types for remote-config.

use std::fmt;

/// Result type alias for remote-config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when fetching, serving or reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested key is absent from the current snapshot.
    #[error("config not found: {0}")]
    NotFound(String),

    /// The value exists but does not have the requested shape.
    #[error("config '{name}' is not {expected}")]
    TypeMismatch {
        /// The key that was looked up
        name: String,
        /// Human-readable name of the expected shape
        expected: &'static str,
    },

    /// The value exists but could not be decoded into the target type.
    #[error("Failed to decode config '{name}': {reason}")]
    DecodeError {
        /// The key that was looked up
        name: String,
        /// Decoder message
        reason: String,
    },

    /// The client has been closed.
    #[error("client is closed")]
    Closed,

    /// No default client has been registered.
    #[error("no default client registered")]
    NoDefaultClient,

    /// Failed to fetch configuration from a source.
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    /// Failed to parse the encoded configuration payload.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// The first refresh performed while constructing a client failed.
    #[error("Initial refresh of '{repository}' failed: {source}")]
    InitialRefresh {
        /// Name of the repository that failed
        repository: String,
        /// The underlying refresh error
        #[source]
        source: Box<ConfigError>,
    },

    /// The repository set handed to a server is not usable.
    #[error("Invalid repository configuration: {0}")]
    InvalidRepository(String),

    /// The HTTP listener could not be bound.
    #[cfg(feature = "server")]
    #[error("Failed to bind {address}: {source}")]
    Bind {
        /// The address that was requested
        address: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server stopped with an error while serving.
    #[cfg(feature = "server")]
    #[error("Server failed: {0}")]
    Serve(#[source] std::io::Error),

    /// Draining the HTTP listener took longer than the shutdown timeout.
    #[cfg(feature = "server")]
    #[error("Server shutdown timed out after {0:?}")]
    ShutdownTimeout(std::time::Duration),

    /// Process settings could not be loaded.
    #[error("Invalid settings: {0}")]
    Settings(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ConfigError {
    /// Whether this error was produced by a lookup on a client
    /// (missing key, wrong shape, closed client).
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::TypeMismatch { .. }
                | Self::DecodeError { .. }
                | Self::Closed
                | Self::NoDefaultClient
        )
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Settings(err.to_string())
    }
}

/// A failed lookup that still carries the value the caller should use.
///
/// Typed accessors return `Err(Fallback)` holding the caller-supplied default,
/// so the default is never lost on the error path:
///
/// ```rust,no_run
/// # use remote_config::prelude::*;
/// # fn example(client: &Client) {
/// let port = client.get_int("port", 8080).unwrap_or_else(Fallback::into_value);
/// # }
/// ```
pub struct Fallback<T> {
    /// The default value supplied by the caller.
    pub value: T,
    /// Why the lookup failed.
    pub error: ConfigError,
}

impl<T> Fallback<T> {
    pub(crate) fn new(value: T, error: ConfigError) -> Self {
        Self { value, error }
    }

    /// Discard the error and keep the default.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Discard the default and keep the error.
    pub fn into_error(self) -> ConfigError {
        self.error
    }
}

impl<T> fmt::Debug for Fallback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fallback")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for Fallback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl<T> std::error::Error for Fallback<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
