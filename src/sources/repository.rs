//! Repository trait.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde_yaml::Value;

/// A pluggable source of configuration snapshots.
///
/// Implement this trait to serve configuration from a new backend (object
/// storage, a database, a version-control checkout). Clients and servers
/// call [`refresh`](Repository::refresh) from a background task and read
/// through the other methods from any number of concurrent callers.
///
/// Implementations should decode fetched data before publishing it, so a
/// failed refresh never blanks or corrupts the snapshot already held.
/// [`SnapshotCell`](crate::core::SnapshotCell) provides that behaviour.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Fetch and decode the latest data, then atomically replace the held
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if fetching or decoding fails. The previous snapshot
    /// must be left untouched in that case.
    async fn refresh(&self) -> Result<()>;

    /// Return the value stored under `key` in the current snapshot.
    fn get_data(&self, key: &str) -> Option<Value>;

    /// Return the encoded bytes of the current snapshot.
    fn get_raw_data(&self) -> Bytes;

    /// Stable identifier, used as the HTTP route and as the status map key.
    fn name(&self) -> &str;
}
