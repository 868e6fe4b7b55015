//! File-backed state that outlives a run.
//!
//! One JSON document holds the last notification time per fingerprint and
//! the last observed row count per check:
//!
//! ```json
//! {
//!   "fingerprints": { "3f2a…": "2025-06-01T06:00:12Z" },
//!   "history": { "event_volume_drop": { "row_count": 3, "observed": "2025-06-01T06:00:10Z" } }
//! }
//! ```
//!
//! Writes go to a uniquely named temporary file in the same directory which
//! is then renamed over the original. Saves are serialized, and each one
//! snapshots the state after taking the save lock, so the last rename always
//! carries every earlier update.

use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, RwLock}
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{
    context::Baseline,
    dedup::DedupStore,
    error::{AppResult, StoreError, state_error}
};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    fingerprints: HashMap<String, DateTime<Utc>>,
    #[serde(default)]
    history:      HashMap<String, Baseline>
}

/// JSON state file shared by the deduplicator and the trend baselines.
#[derive(Debug)]
pub struct FileStateStore {
    path:      PathBuf,
    state:     RwLock<StateFile>,
    save_lock: Mutex<()>
}

impl FileStateStore {
    /// Open the state file, starting empty when it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let state = if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| state_error(format!("cannot read {}: {}", path.display(), e)))?;
            if content.trim().is_empty() {
                StateFile::default()
            } else {
                serde_json::from_str(&content)
                    .map_err(|e| state_error(format!("corrupt {}: {}", path.display(), e)))?
            }
        } else {
            StateFile::default()
        };
        Ok(Self {
            path,
            state: RwLock::new(state),
            save_lock: Mutex::new(())
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Row counts observed by the previous runs.
    pub fn baselines(&self) -> HashMap<String, Baseline> {
        self.state
            .read()
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }

    /// Record this run's row counts; written on the next [`save`](Self::save).
    pub fn record_baselines(&self, observed: impl IntoIterator<Item = (String, Baseline)>) {
        if let Ok(mut state) = self.state.write() {
            state.history.extend(observed);
        }
    }

    /// Write the state file atomically.
    ///
    /// Blocks on file I/O; async callers run it on the blocking pool.
    pub fn save(&self) -> Result<(), StoreError> {
        let _saving = self
            .save_lock
            .lock()
            .map_err(|_| StoreError("state save lock poisoned".to_string()))?;
        let snapshot = self
            .state
            .read()
            .map_err(|_| StoreError("state lock poisoned".to_string()))?
            .clone();
        let data = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| StoreError(format!("cannot serialize state: {}", e)))?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new(".")
        };
        fs::create_dir_all(dir)
            .map_err(|e| StoreError(format!("cannot create {}: {}", dir.display(), e)))?;
        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| StoreError(format!("cannot create temp file in {}: {}", dir.display(), e)))?;
        tmp.write_all(&data)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| StoreError(format!("cannot write {}: {}", tmp.path().display(), e)))?;
        tmp.persist(&self.path)
            .map(|_| ())
            .map_err(|e| StoreError(format!("cannot replace {}: {}", self.path.display(), e.error)))
    }
}

impl DedupStore for FileStateStore {
    fn get(&self, fingerprint: &str) -> Option<DateTime<Utc>> {
        self.state.read().ok()?.fingerprints.get(fingerprint).copied()
    }

    fn put(&self, fingerprint: &str, notified_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError("state lock poisoned".to_string()))?
            .fingerprints
            .insert(fingerprint.to_string(), notified_at);
        self.save()
    }
}
