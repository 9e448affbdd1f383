//! # remote-config
//!
//! Periodically refreshed configuration, read through typed accessors or
//! published over HTTP.
//!
//! ## Overview
//!
//! Configuration lives in a [`Repository`](sources::Repository): a file, an
//! HTTP endpoint or any backend you implement. Two consumers sit on top:
//!
//! - [`Client`](core::Client) reads one repository in-process. It refreshes
//!   in the background, swaps snapshots atomically and serves typed values
//!   that fall back to a caller default on any failure.
//! - [`Server`](server::Server) (feature `server`) refreshes many
//!   repositories and serves their raw snapshots over HTTP, with health,
//!   readiness and status probes and an optional shared-key gate.
//!
//! Refresh failures never reach readers. They are logged, counted, and show
//! up as staleness once two intervals pass without a success.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use remote_config::prelude::*;
//! use remote_config::sources::FileRepository;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> remote_config::error::Result<()> {
//! let client = Client::new(
//!     Arc::new(FileRepository::new("config/app.yaml")?),
//!     Duration::from_secs(30),
//! )
//! .await?;
//!
//! let port = client.get_int("port", 8080).unwrap_or_else(Fallback::into_value);
//!
//! // The newest client is also the process-wide default.
//! let region = remote_config::core::get_string("region", "us-east-1")
//!     .unwrap_or_else(Fallback::into_value);
//! println!("{}:{}", region, port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `server` (default): the HTTP [`Server`](server::Server) and the
//!   `remote-config-server` binary.
//! - `remote` (default): [`HttpRepository`](sources::HttpRepository).

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod settings;
pub mod sources;

#[cfg(feature = "server")]
pub mod server;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{Client, ClientBuilder, ClientOptions, RefreshStatus};
    pub use crate::error::{ConfigError, Fallback, Result};
    pub use crate::sources::Repository;

    #[cfg(feature = "server")]
    pub use crate::server::{RepositoryStatus, Server, ServerBuilder};
}
