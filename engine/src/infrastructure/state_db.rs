//! Persistent key/value store backing the monitored-state database
//!
//! Small state, infrequent writes: a full rewrite of an owner-only JSON file
//! on every sync keeps recovery trivial and avoids WAL machinery.

use crate::constants::modes;
use crate::domain::{Error, Result};
use crate::infrastructure::fs::{file_exists, open_file_secure};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// Last observed state of a check, as persisted across daemon restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub id: String,
    pub monitored: bool,
    pub data_collected_at: SystemTime,
    pub uptime: Duration,
}

/// Typed values the store can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Str(String),
    Int(i64),
    Timestamp(SystemTime),
    Duration(Duration),
    Entry(StateEntry),
}

/// File-backed store. All access goes through a single lock; `serialize`
/// holds it for the duration of the write.
pub struct StateDb {
    path: PathBuf,
    storage: Mutex<BTreeMap<String, Value>>,
}

impl StateDb {
    /// Empty store bound to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            storage: Mutex::new(BTreeMap::new()),
        }
    }

    /// Opens `path`, loading its contents when the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let db = Self::new(path);
        if file_exists(&db.path) {
            db.deserialize()?;
        }
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.storage.lock().unwrap().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.storage.lock().unwrap().insert(key.into(), value);
    }

    pub fn exists(&self, key: &str) -> bool {
        self.storage.lock().unwrap().contains_key(key)
    }

    /// Removes `key`, reporting whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.storage.lock().unwrap().remove(key).is_some()
    }

    /// Snapshot of the stored keys in ascending lexicographic order.
    pub fn keys(&self) -> Vec<String> {
        self.storage.lock().unwrap().keys().cloned().collect()
    }

    pub fn entry(&self, id: &str) -> Option<StateEntry> {
        match self.get(id) {
            Some(Value::Entry(entry)) => Some(entry),
            _ => None,
        }
    }

    pub fn set_entry(&self, entry: StateEntry) {
        self.set(entry.id.clone(), Value::Entry(entry));
    }

    /// Rewrites the whole store to disk with owner-only permissions.
    pub fn serialize(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::EmptyStatePath);
        }
        let mut opts = OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        let file = open_file_secure(&self.path, opts, modes::STATE_FILE)?;
        let storage = self.storage.lock().unwrap();
        serde_json::to_writer_pretty(file, &*storage)
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))
    }

    /// Reloads the store from disk. A completely empty file counts as an
    /// empty store; malformed content is an error and leaves the in-memory
    /// state untouched.
    pub fn deserialize(&self) -> Result<()> {
        let mut opts = OpenOptions::new();
        opts.read(true);
        let mut file = open_file_secure(&self.path, opts, modes::STATE_FILE)?;
        let mut contents = String::new();
        std::io::Read::read_to_string(&mut file, &mut contents)?;
        let loaded = if contents.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&contents).map_err(|e| Error::MalformedDatabase(e.to_string()))?
        };
        *self.storage.lock().unwrap() = loaded;
        Ok(())
    }
}
