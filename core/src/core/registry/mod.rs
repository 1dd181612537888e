//! Key registry backed by a single JSON file.
//!
//! The registry is the only authority on whether a key exists. The whole key set lives in
//! memory behind one `RwLock`; every mutation rewrites `keys.json` through a temp file and
//! rename, and rolls the in-memory state back if that write fails.

use crate::core::fs::write_atomic;
use crate::types::{GENERATION_ALPHABET, Key, KeyRecord, MAX_KEY_LENGTH};
use chrono::{DateTime, Utc};
use error::RegistryError;
use rand::prelude::IndexedRandom;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub mod error {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum RegistryError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Registry file is malformed: {0}")]
        Decode(#[from] serde_json::Error),

        #[error("Invalid batch size: {0}")]
        InvalidCount(usize),

        #[error("Invalid key length: {0}")]
        InvalidLength(usize),

        #[error("Duplicate key in registry file: {0}")]
        Duplicate(String),

        #[error("Could not generate a unique key after {0} attempts")]
        CollisionBudgetExhausted(usize),
    }
}

/// Attempts per key before a batch gives up.
pub const MAX_ATTEMPTS_PER_KEY: usize = 10_000;

#[derive(Default)]
struct Keys {
    /// Creation order, oldest first. This is also the on-disk order.
    records: Vec<KeyRecord>,
    index: HashMap<Key, usize>,
}

impl Keys {
    fn from_records(records: Vec<KeyRecord>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            if index.insert(record.key.clone(), position).is_some() {
                return Err(RegistryError::Duplicate(record.key.to_string()));
            }
        }
        Ok(Self { records, index })
    }

    fn push(&mut self, record: KeyRecord) {
        self.index.insert(record.key.clone(), self.records.len());
        self.records.push(record);
    }

    fn truncate(&mut self, len: usize) {
        for record in self.records.drain(len..) {
            self.index.remove(&record.key);
        }
    }
}

pub struct KeyRegistry {
    path: PathBuf,
    keys: RwLock<Keys>,
}

impl KeyRegistry {
    /// Loads the registry file, creating an empty one if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let keys = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => Keys::default(),
            Ok(bytes) => {
                let mut records: Vec<KeyRecord> = serde_json::from_slice(&bytes)?;
                records.sort_by_key(|r| r.created_at);
                Keys::from_records(records)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                persist(&path, &[])?;
                Keys::default()
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(path = %path.display(), keys = keys.records.len(), "key registry loaded");
        Ok(Self {
            path,
            keys: RwLock::new(keys),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> RwLockReadGuard<'_, Keys> {
        self.keys.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Keys> {
        self.keys.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn persist(path: &Path, records: &[KeyRecord]) -> Result<(), RegistryError> {
    let bytes = serde_json::to_vec_pretty(records)?;
    write_atomic(path, &bytes)?;
    Ok(())
}

fn random_key(rng: &mut impl rand::Rng, length: usize) -> Result<Key, RegistryError> {
    let raw: String = (0..length)
        .filter_map(|_| GENERATION_ALPHABET.choose(rng).map(|&b| char::from(b)))
        .collect();
    Key::try_from(raw.as_str()).map_err(|_| RegistryError::InvalidLength(length))
}

/// Read operations.
impl KeyRegistry {
    pub fn get(&self, key: &Key) -> Option<KeyRecord> {
        let keys = self.read();
        keys.index.get(key).map(|&i| keys.records[i].clone())
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.read().index.contains_key(key)
    }

    /// All keys, newest first.
    pub fn list(&self) -> Vec<KeyRecord> {
        self.read().records.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Generation.
impl KeyRegistry {
    /// Generates `count` fresh keys of `length` characters and persists them.
    ///
    /// Either the whole batch is committed (in memory and on disk) or nothing is.
    pub fn generate(
        &self,
        count: usize,
        length: usize,
        comment: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<KeyRecord>, RegistryError> {
        if count == 0 {
            return Err(RegistryError::InvalidCount(count));
        }
        if length == 0 || length > MAX_KEY_LENGTH {
            return Err(RegistryError::InvalidLength(length));
        }

        let mut keys = self.write();
        let mut rng = rand::rng();
        let mut batch: HashSet<Key> = HashSet::with_capacity(count);
        let mut created = Vec::with_capacity(count);

        for _ in 0..count {
            let mut fresh = None;
            for _ in 0..MAX_ATTEMPTS_PER_KEY {
                let candidate = random_key(&mut rng, length)?;
                if !keys.index.contains_key(&candidate) && !batch.contains(&candidate) {
                    fresh = Some(candidate);
                    break;
                }
            }
            let key = fresh.ok_or(RegistryError::CollisionBudgetExhausted(MAX_ATTEMPTS_PER_KEY))?;

            batch.insert(key.clone());
            created.push(KeyRecord {
                key,
                created_at: now,
                comment: comment.to_string(),
            });
        }

        let committed = keys.records.len();
        for record in &created {
            keys.push(record.clone());
        }

        if let Err(e) = persist(&self.path, &keys.records) {
            keys.truncate(committed);
            tracing::error!(error = %e, count, "failed to persist key batch, rolled back");
            return Err(e);
        }

        tracing::info!(count, length, comment, "generated key batch");
        Ok(created)
    }
}
