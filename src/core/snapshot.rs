//! Immutable configuration snapshots and the cell that publishes them.

use crate::error::{ConfigError, Result};
use arc_swap::ArcSwap;
use bytes::Bytes;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A decoded configuration document together with the bytes it was decoded from.
///
/// Snapshots are never mutated after construction. A refresh builds a new
/// snapshot and publishes it through a [`SnapshotCell`], so anyone holding an
/// `Arc<Snapshot>` keeps a consistent view of one fetch cycle.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    values: HashMap<String, Value>,
    raw: Bytes,
}

impl Snapshot {
    /// Create an empty snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from already-decoded values and their encoded form.
    pub fn new(values: HashMap<String, Value>, raw: impl Into<Bytes>) -> Self {
        Self {
            values,
            raw: raw.into(),
        }
    }

    /// Decode a YAML document whose root is a mapping.
    ///
    /// An empty document yields an empty snapshot. Scalar keys (numbers,
    /// booleans) are converted to their string form.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] if the document is not valid YAML,
    /// if its root is not a mapping, or if a key is not a scalar.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use remote_config::core::Snapshot;
    ///
    /// let snapshot = Snapshot::from_yaml("name: demo\nport: 8080\n").unwrap();
    /// assert!(snapshot.get("port").is_some());
    /// ```
    pub fn from_yaml(raw: impl Into<Bytes>) -> Result<Self> {
        let raw = raw.into();
        let document: Value = serde_yaml::from_slice(&raw)
            .map_err(|e| ConfigError::ParseError(format!("invalid YAML: {}", e)))?;

        let values = match document {
            Value::Null => HashMap::new(),
            Value::Mapping(mapping) => mapping_to_values(mapping)?,
            other => {
                return Err(ConfigError::ParseError(format!(
                    "expected a mapping at the document root, found {}",
                    kind_name(&other)
                )));
            }
        };

        Ok(Self { values, raw })
    }

    /// Look up a top-level key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// The encoded bytes this snapshot was decoded from.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Iterate over the top-level keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of top-level keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the snapshot holds no keys.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn mapping_to_values(mapping: Mapping) -> Result<HashMap<String, Value>> {
    let mut values = HashMap::with_capacity(mapping.len());
    for (key, value) in mapping {
        let key = match key {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                return Err(ConfigError::ParseError(format!(
                    "unsupported key type: {}",
                    kind_name(&other)
                )));
            }
        };
        values.insert(key, value);
    }
    Ok(values)
}

pub(crate) fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Atomically replaceable holder for the current [`Snapshot`].
///
/// Repositories embed one of these. Reads are lock-free; a refresh decodes
/// the new document first and only then swaps the pointer, so a failed
/// refresh leaves the previous snapshot in place.
#[derive(Debug)]
pub struct SnapshotCell {
    current: ArcSwap<Snapshot>,
}

impl SnapshotCell {
    /// Create a cell holding an empty snapshot.
    pub fn new() -> Self {
        Self::with_snapshot(Snapshot::empty())
    }

    /// Create a cell holding the given snapshot.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    /// The current snapshot.
    pub fn load(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Publish a new snapshot.
    pub fn store(&self, snapshot: Snapshot) {
        self.current.store(Arc::new(snapshot));
    }

    /// Clone out the value for `key` from the current snapshot.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.current.load().get(key).cloned()
    }

    /// The encoded bytes of the current snapshot.
    pub fn raw(&self) -> Bytes {
        self.current.load().raw().clone()
    }
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new()
    }
}
