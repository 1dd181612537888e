//! Tracker core combining the key registry, entry store, image pipeline and authorization.

use crate::error::{Result, ValidationError};
use crate::types::{
    AuditRecord, Config, EntryEnvelope, EntryPayload, Key, KeyRecord, KeyStatus, KeyUsage,
    Limits, MethodKind,
};
use auth::error::AuthError;
use auth::{Authorizer, Grant, Route, check_window};
use chrono::{DateTime, Utc};
use entries::EntryStore;
use entries::error::EntryStoreError;
use images::{ImageNormalizer, NormalizedImage};
use registry::KeyRegistry;
use serde::Serialize;
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod auth;
pub mod entries;
pub(crate) mod fs;
pub mod images;
pub mod registry;

/// One uploaded file as received from the client.
pub struct ImageUpload<R> {
    /// Client-declared name. Never trusted for the format.
    pub filename: String,
    pub source: R,
}

/// Request metadata written to the audit log.
#[derive(Debug, Clone, Default)]
pub struct Visitor {
    pub user_agent: String,
    pub client_ip: String,
}

/// An entry as returned to a viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryView {
    pub key: Key,
    #[serde(flatten)]
    pub envelope: EntryEnvelope,
    /// Set when the trusted operator is viewing.
    pub admin: bool,
}

pub struct TrackerCore {
    base_path: PathBuf,
    limits: Limits,
    registry: Arc<KeyRegistry>,
    entries: Arc<EntryStore>,
    images: ImageNormalizer,
    auth: Authorizer,
}

impl TrackerCore {
    pub fn open(config: Config, limits: Limits, token_secret: &[u8]) -> Result<Self> {
        let images = ImageNormalizer::new(&limits);
        Self::open_with_images(config, limits, token_secret, images)
    }

    /// Like [`TrackerCore::open`] with a caller-supplied image pipeline, e.g. one with a
    /// different container decoder.
    pub fn open_with_images(
        config: Config,
        limits: Limits,
        token_secret: &[u8],
        images: ImageNormalizer,
    ) -> Result<Self> {
        let problems = limits.validate();
        if !problems.is_empty() {
            return Err(ValidationError::InvalidLimits(problems).into());
        }
        if token_secret.is_empty() {
            return Err(ValidationError::MissingTokenSecret.into());
        }

        let registry = Arc::new(KeyRegistry::open(config.keys_path())?);
        let entries = Arc::new(EntryStore::new(config.entries_path(), registry.clone()));
        let auth = Authorizer::new(registry.clone(), entries.clone(), token_secret, &limits);

        tracing::info!(data_dir = %config.base_path.display(), "tracker core opened");
        Ok(Self {
            base_path: config.base_path,
            limits,
            registry,
            entries,
            images,
            auth,
        })
    }

    /// Returns the base data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.base_path
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn authorizer(&self) -> &Authorizer {
        &self.auth
    }
}

/// Key operations.
impl TrackerCore {
    pub fn generate_keys(
        &self,
        count: usize,
        length: usize,
        comment: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<KeyRecord>> {
        let limits = &self.limits;
        if count == 0 || count > limits.max_batch {
            return Err(ValidationError::InvalidBatch {
                count,
                max: limits.max_batch,
            }
            .into());
        }
        if length < limits.min_key_length || length > limits.max_key_length {
            return Err(ValidationError::InvalidKeyLength {
                length,
                min: limits.min_key_length,
                max: limits.max_key_length,
            }
            .into());
        }

        Ok(self.registry.generate(count, length, comment, now)?)
    }

    pub fn key_status(&self, raw_key: &str) -> Result<KeyStatus> {
        let key = Key::try_from(raw_key)
            .map_err(|_| ValidationError::InvalidKey(raw_key.to_string()))?;
        let status = match self.registry.get(&key) {
            None => KeyStatus::NotFound,
            Some(record) if self.entries.has_data(&key) => KeyStatus::Used {
                created_at: record.created_at,
            },
            Some(record) => KeyStatus::Available {
                created_at: record.created_at,
            },
        };
        Ok(status)
    }

    /// All keys, newest first, each marked with whether an entry exists for it.
    pub fn list_with_usage(&self) -> Vec<KeyUsage> {
        self.registry
            .list()
            .into_iter()
            .map(|record| {
                let used = self.entries.has_data(&record.key);
                KeyUsage { record, used }
            })
            .collect()
    }
}

/// Entry operations.
impl TrackerCore {
    /// Normalizes `uploads` in order and saves the entry with the resulting image names.
    ///
    /// The image cap is checked before any upload is read. The first failing upload aborts
    /// the whole request and removes the files already written for it. Once the new entry
    /// is saved, files left over from an earlier save for the same key are removed.
    pub fn create_entry<R: Read>(
        &self,
        raw_key: &str,
        mut payload: EntryPayload,
        uploads: Vec<ImageUpload<R>>,
        now: DateTime<Utc>,
    ) -> Result<EntryEnvelope> {
        let key = self.entries.registered_key(raw_key)?;
        if uploads.len() > self.limits.max_images {
            return Err(ValidationError::TooManyImages {
                count: uploads.len(),
                max: self.limits.max_images,
            }
            .into());
        }
        if let Some(method) = &payload.access.method
            && method.kind == MethodKind::Password
            && method.secret.is_none()
        {
            return Err(ValidationError::MissingSecret.into());
        }

        let images_dir = self.entries.images_dir(&key);
        let mut written: Vec<NormalizedImage> = Vec::with_capacity(uploads.len());
        for upload in uploads {
            match self
                .images
                .normalize(&images_dir, upload.source, &upload.filename)
            {
                Ok(image) => written.push(image),
                Err(e) => {
                    tracing::warn!(key = %key, filename = %upload.filename, error = %e, "upload rejected, aborting entry");
                    discard_all(&images_dir, &written);
                    return Err(e.into());
                }
            }
        }

        payload.images = written.iter().map(|image| image.stored.clone()).collect();
        match self.entries.save_data(&key, payload, now) {
            Ok(envelope) => {
                let keep: HashSet<&str> = written.iter().flat_map(|i| i.file_names()).collect();
                let removed = self.entries.retain_images(&key, |name| keep.contains(name));
                if removed > 0 {
                    tracing::info!(key = %key, removed, "removed images of the previous entry");
                }
                Ok(envelope)
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "failed to save entry");
                discard_all(&images_dir, &written);
                Err(e.into())
            }
        }
    }

    pub fn has_data(&self, raw_key: &str) -> bool {
        self.entries.has_data(raw_key)
    }

    /// Operator read of an entry. No authorization and no audit.
    pub fn load_entry(&self, raw_key: &str) -> Result<EntryEnvelope> {
        Ok(self.entries.load_data(raw_key)?)
    }

    /// Audit log for a registered key, most recent first.
    pub fn visits(&self, raw_key: &str) -> Result<Vec<AuditRecord>> {
        let key = self.entries.registered_key(raw_key)?;
        Ok(self.entries.read_visits(&key)?)
    }
}

fn discard_all(images_dir: &Path, written: &[NormalizedImage]) {
    for image in written {
        ImageNormalizer::discard(images_dir, image);
    }
}

/// Lookup and view.
impl TrackerCore {
    pub fn route(&self, raw_key: &str) -> Route {
        self.auth.route(raw_key)
    }

    pub fn lookup(
        &self,
        raw_key: &str,
        credential: &str,
        prior_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Grant> {
        Ok(self.auth.lookup(raw_key, credential, prior_token, now)?)
    }

    /// Returns the entry for a viewer.
    ///
    /// The operator skips the token and window checks and is never audited. Everyone else
    /// needs a token listing the key, and every successful view is appended to the log.
    pub fn view(
        &self,
        raw_key: &str,
        token: Option<&str>,
        operator: bool,
        visitor: &Visitor,
        now: DateTime<Utc>,
    ) -> Result<EntryView> {
        let key = if operator {
            self.entries.registered_key(raw_key)?
        } else {
            self.auth.authorize_view(raw_key, token, now)?
        };

        let mut envelope = self.entries.load_data(&key)?;
        if !operator {
            check_window(&envelope.data, now).map_err(|_| AuthError::Denied)?;
            self.entries.record_visit(
                &key,
                &AuditRecord {
                    time: now,
                    user_agent: visitor.user_agent.clone(),
                    client_ip: visitor.client_ip.clone(),
                },
            )?;
            if let Some(method) = envelope.data.access.method.as_mut() {
                method.secret = None;
            }
        }

        Ok(EntryView {
            key,
            envelope,
            admin: operator,
        })
    }

    /// Resolves a stored image for a viewer, with the same token and window rules as
    /// [`Self::view`].
    pub fn image_path(
        &self,
        raw_key: &str,
        name: &str,
        token: Option<&str>,
        operator: bool,
        now: DateTime<Utc>,
    ) -> Result<PathBuf> {
        if !operator {
            let key = self.auth.authorize_view(raw_key, token, now)?;
            let envelope = self.entries.load_data(&key)?;
            check_window(&envelope.data, now).map_err(|_| AuthError::Denied)?;
        }
        match self.entries.image_path(raw_key, name) {
            Ok(path) => Ok(path),
            Err(e @ EntryStoreError::InvalidImageName(_)) => {
                tracing::warn!(key = raw_key, error = %e, "rejected image name");
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
