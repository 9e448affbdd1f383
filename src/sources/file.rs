//! File-based repository.

use super::Repository;
use crate::core::{Snapshot, SnapshotCell};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde_yaml::Value;
use std::path::{Path, PathBuf};

/// Repository backed by a YAML file on the local filesystem.
///
/// # Examples
///
/// ```rust,no_run
/// use remote_config::sources::FileRepository;
///
/// # fn example() -> remote_config::error::Result<()> {
/// let repository = FileRepository::new("config/app.yaml")?.with_name("app");
/// # Ok(())
/// # }
/// ```
pub struct FileRepository {
    name: String,
    path: PathBuf,
    snapshot: SnapshotCell,
}

impl FileRepository {
    /// Create a repository for the file at `path`.
    ///
    /// The path is made absolute against the current directory, so later
    /// changes of working directory do not affect refreshes. The repository
    /// name defaults to the file stem (`config/app.yaml` → `app`).
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = std::path::absolute(path.as_ref())?;
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("config")
            .to_string();

        Ok(Self {
            name,
            path,
            snapshot: SnapshotCell::new(),
        })
    }

    /// Override the repository name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The absolute path this repository reads.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Repository for FileRepository {
    async fn refresh(&self) -> Result<()> {
        let raw = tokio::fs::read(&self.path).await.map_err(|e| {
            ConfigError::LoadError(format!("Failed to read {}: {}", self.path.display(), e))
        })?;

        let snapshot = Snapshot::from_yaml(raw)?;
        self.snapshot.store(snapshot);

        tracing::debug!(repository = %self.name, path = %self.path.display(), "File repository refreshed");
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
