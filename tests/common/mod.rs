//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use remote_config::core::{Snapshot, SnapshotCell};
use remote_config::error::{ConfigError, Result};
use remote_config::sources::Repository;
use serde_yaml::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

/// Repository serving a YAML document held in memory.
///
/// [`set_document`](Self::set_document) changes what the next refresh
/// publishes; readers keep the previous snapshot until then.
pub struct MemoryRepository {
    name: String,
    document: Mutex<String>,
    snapshot: SnapshotCell,
    failing: AtomicBool,
    refreshes: AtomicUsize,
}

impl MemoryRepository {
    pub fn new(name: &str, document: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            document: Mutex::new(document.to_string()),
            snapshot: SnapshotCell::new(),
            failing: AtomicBool::new(false),
            refreshes: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        let repository = Self::new(name, "");
        repository.set_failing(true);
        repository
    }

    pub fn set_document(&self, document: &str) {
        *self.document.lock() = document.to_string();
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn refresh(&self) -> Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ConfigError::LoadError(format!("{} is unavailable", self.name)));
        }
        let document = self.document.lock().clone();
        self.snapshot.store(Snapshot::from_yaml(document)?);
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

pub const APP_DOCUMENT: &str = r#"
name: checkout
port: 8443
ratio: 0.25
enabled: true
regions:
  - eu-west-1
  - us-east-1
database:
  host: db.internal
  pool: 16
"#;

/// Write `contents` to `<dir>/<file>` and return the path.
pub fn write_file(dir: &TempDir, file: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(file);
    std::fs::write(&path, contents).unwrap();
    path
}
