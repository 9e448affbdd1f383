//! In-memory repository used by unit tests.

use super::Repository;
use crate::core::{Snapshot, SnapshotCell};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde_yaml::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) struct MockRepository {
    name: String,
    source: RwLock<HashMap<String, Value>>,
    snapshot: SnapshotCell,
    failing: AtomicBool,
    refreshes: AtomicUsize,
    delay: Duration,
}

impl MockRepository {
    pub(crate) fn new(name: &str) -> Self {
        let mut source = HashMap::new();
        source.insert("name".to_string(), Value::from("test"));
        source.insert("age".to_string(), Value::from(30));
        source.insert("score".to_string(), Value::from(9.5));
        source.insert("enabled".to_string(), Value::from(true));
        source.insert(
            "hobbies".to_string(),
            Value::Sequence(vec![Value::from("chess"), Value::from("climbing")]),
        );

        Self {
            name: name.to_string(),
            source: RwLock::new(source),
            snapshot: SnapshotCell::new(),
            failing: AtomicBool::new(false),
            refreshes: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn failing(name: &str) -> Self {
        let repository = Self::new(name);
        repository.set_failing(true);
        repository
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Visible to readers after the next successful refresh.
    pub(crate) fn set(&self, key: &str, value: impl Into<Value>) {
        self.source.write().insert(key.to_string(), value.into());
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Completed refresh attempts, successful or not.
    pub(crate) fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Repository for MockRepository {
    async fn refresh(&self) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.refreshes.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(ConfigError::LoadError("mock refresh error".to_string()));
        }

        let values = self.source.read().clone();
        let raw = serde_yaml::to_string(&values).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        self.snapshot.store(Snapshot::new(values, raw));
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
