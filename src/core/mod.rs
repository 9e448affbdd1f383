//! Core client types: snapshots, refresh scheduling and status, typed lookups.

mod client;
mod lookup;
pub(crate) mod registry;
mod scheduler;
mod snapshot;
mod status;

pub use client::{Client, ClientBuilder, ClientOptions};
pub use lookup::FromConfigValue;
pub use registry::{
    clear_default_client, default_client, get, get_bool, get_config, get_float, get_int, get_string,
    get_string_array, get_typed, set_default_client,
};
pub use scheduler::{MIN_REFRESH_INTERVAL, effective_interval};
pub use snapshot::{Snapshot, SnapshotCell};
pub use status::{RefreshStatus, STALENESS_FACTOR, staleness_exceeded};

#[cfg(feature = "server")]
pub(crate) use scheduler::{refresh_once, spawn_refresh_task};
#[cfg(feature = "server")]
pub(crate) use status::StatusTracker;
