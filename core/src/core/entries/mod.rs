//! Per-key entry envelopes and visit logs.
//!
//! Layout under the entries directory:
//! - `<key>/entry.json`: the envelope. Its presence is what "has data" means
//! - `<key>/history.ndjson`: append-only audit log, one JSON record per line
//! - `<key>/images/`: normalized image files
//!
//! All writes are serialized by a single store-wide `RwLock`; reads share it.

use crate::core::fs::write_atomic;
use crate::core::registry::KeyRegistry;
use crate::types::{AuditRecord, EntryEnvelope, EntryPayload, Key};
use chrono::{DateTime, Utc};
use error::EntryStoreError;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

pub mod error {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EntryStoreError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Invalid key: {0:?}")]
        InvalidKey(String),

        #[error("Key not found")]
        KeyNotFound,

        #[error("Entry not found")]
        NotFound,

        #[error("Stored record is malformed: {0}")]
        Decode(#[from] serde_json::Error),

        #[error("Invalid image name: {0:?}")]
        InvalidImageName(String),
    }
}

const ENTRY_FILE: &str = "entry.json";
const HISTORY_FILE: &str = "history.ndjson";
const IMAGES_DIR: &str = "images";

pub(crate) fn parse_key(raw: &str) -> Result<Key, EntryStoreError> {
    Key::try_from(raw).map_err(|_| EntryStoreError::InvalidKey(raw.to_string()))
}

pub struct EntryStore {
    entries_path: PathBuf,
    registry: Arc<KeyRegistry>,
    lock: RwLock<()>,
}

impl EntryStore {
    pub fn new(entries_path: impl Into<PathBuf>, registry: Arc<KeyRegistry>) -> Self {
        Self {
            entries_path: entries_path.into(),
            registry,
            lock: RwLock::new(()),
        }
    }

    fn entry_dir(&self, key: &Key) -> PathBuf {
        self.entries_path.join(key.as_str())
    }

    fn entry_file(&self, key: &Key) -> PathBuf {
        self.entry_dir(key).join(ENTRY_FILE)
    }

    fn history_file(&self, key: &Key) -> PathBuf {
        self.entry_dir(key).join(HISTORY_FILE)
    }

    pub fn images_dir(&self, key: &Key) -> PathBuf {
        self.entry_dir(key).join(IMAGES_DIR)
    }

    /// Validates the key format and that the registry knows it.
    pub fn registered_key(&self, raw: &str) -> Result<Key, EntryStoreError> {
        let key = parse_key(raw)?;
        if !self.registry.contains(&key) {
            return Err(EntryStoreError::KeyNotFound);
        }
        Ok(key)
    }
}

fn read_envelope(path: &Path) -> Result<Option<EntryEnvelope>, EntryStoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Envelope operations.
impl EntryStore {
    /// Writes the envelope for `key`, keeping the original `created_at` if one exists.
    pub fn save_data(
        &self,
        raw_key: &str,
        payload: EntryPayload,
        now: DateTime<Utc>,
    ) -> Result<EntryEnvelope, EntryStoreError> {
        let key = self.registered_key(raw_key)?;
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);

        let path = self.entry_file(&key);
        let created_at = read_envelope(&path)?.map_or(now, |old| old.created_at);
        let envelope = EntryEnvelope {
            created_at,
            data: payload,
        };

        let bytes = serde_json::to_vec_pretty(&envelope)?;
        write_atomic(&path, &bytes)?;

        tracing::info!(key = %key, images = envelope.data.images.len(), "entry saved");
        Ok(envelope)
    }

    pub fn load_data(&self, raw_key: &str) -> Result<EntryEnvelope, EntryStoreError> {
        let key = parse_key(raw_key)?;
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);

        read_envelope(&self.entry_file(&key))?.ok_or(EntryStoreError::NotFound)
    }

    /// False for malformed keys and for keys without a persisted envelope.
    pub fn has_data(&self, raw_key: &str) -> bool {
        parse_key(raw_key).is_ok_and(|key| self.entry_file(&key).is_file())
    }
}

/// Audit log operations.
impl EntryStore {
    /// Appends one visit. The log is created on first use.
    pub fn record_visit(&self, raw_key: &str, record: &AuditRecord) -> Result<(), EntryStoreError> {
        let key = self.registered_key(raw_key)?;
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let path = self.history_file(&key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        file.write_all(&line)?;
        Ok(())
    }

    /// Visits, most recent first. A missing log is an empty history.
    pub fn read_visits(&self, raw_key: &str) -> Result<Vec<AuditRecord>, EntryStoreError> {
        let key = parse_key(raw_key)?;
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);

        let file = match std::fs::File::open(self.history_file(&key)) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let lines = BufReader::new(file)
            .lines()
            .filter(|line| !line.as_ref().is_ok_and(|l| l.trim().is_empty()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                // A crash mid-append can leave the last line torn.
                Err(e) if i + 1 == lines.len() => {
                    tracing::warn!(key = %key, error = %e, "skipping torn last visit line");
                }
                Err(e) => return Err(e.into()),
            }
        }
        records.reverse();
        Ok(records)
    }
}

/// Image file resolution.
impl EntryStore {
    /// Path of a stored image. `name` must be a bare file name.
    pub fn image_path(&self, raw_key: &str, name: &str) -> Result<PathBuf, EntryStoreError> {
        let key = parse_key(raw_key)?;
        let is_bare = !name.is_empty()
            && Path::new(name).file_name().is_some_and(|n| n == name)
            && !name.starts_with('.');
        if !is_bare {
            return Err(EntryStoreError::InvalidImageName(name.to_string()));
        }

        let path = self.images_dir(&key).join(name);
        if !path.is_file() {
            return Err(EntryStoreError::NotFound);
        }
        Ok(path)
    }

    /// Deletes every file in the key's images directory for which `keep` is false and
    /// returns how many were removed. Failures are logged, not returned.
    pub fn retain_images(&self, key: &Key, keep: impl Fn(&str) -> bool) -> usize {
        let dir = self.images_dir(key);
        let Ok(read_dir) = std::fs::read_dir(&dir) else {
            return 0;
        };

        let mut removed = 0;
        for dir_entry in read_dir.flatten() {
            let name = dir_entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if keep(name) {
                continue;
            }
            match std::fs::remove_file(dir_entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(key = %key, name, error = %e, "failed to remove stale image"),
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests;
