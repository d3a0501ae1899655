//! Durable publication registry.
//!
//! A key-value store with upsert semantics, keyed on canonical identifiers.
//! Re-running a batch overwrites each record with its freshest state rather
//! than appending duplicates. The file-backed implementation is a single
//! JSON document, rewritten atomically on every upsert; a remote store
//! slots in behind the same trait.

use crate::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

pub trait Registry: Send + Sync {
    /// Insert or replace the record under `key`.
    fn upsert(&self, key: &str, value: &Value) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<Value>>;

    fn keys(&self) -> Result<Vec<String>>;
}

/// File-backed registry: one JSON object mapping canonical keys to records.
pub struct FileRegistry {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl FileRegistry {
    /// Open or create the registry at `path`, loading any existing records.
    pub fn open(path: PathBuf) -> Result<Self> {
        let entries = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::Io(e)),
        };
        debug!("Opened registry at {:?} with {} records", path, entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp = self.path.with_extension("tmp");
        std::fs::write(&temp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Value>>> {
        self.entries.lock().map_err(|_| Error::Service(
            "registry lock poisoned".to_string(),
        ))
    }
}

impl Registry for FileRegistry {
    fn upsert(&self, key: &str, value: &Value) -> Result<()> {
        let mut entries = self.lock()?;
        entries.insert(key.to_string(), value.clone());
        self.persist(&entries)
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

/// Registry that records nothing. Used when persistence is disabled.
pub struct NoopRegistry;

impl Registry for NoopRegistry {
    fn upsert(&self, _key: &str, _value: &Value) -> Result<()> {
        Ok(())
    }

    fn get(&self, _key: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
