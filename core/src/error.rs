use crate::core::auth::error::AuthError;
use crate::core::entries::error::EntryStoreError;
use crate::core::images::error::ImageError;
use crate::core::registry::error::RegistryError;
use crate::types::AppConfigError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input. The caller's fault.
    Validation,
    NotFound,
    /// Credential or capability check failed. Always reported generically.
    Authorization,
    /// An external collaborator failed. Fail closed.
    Upstream,
    Codec,
    /// Disk or other server-side failure. Logged in detail, reported generically.
    Persistence,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("entry store error: {0}")]
    EntryStore(#[from] EntryStoreError),

    #[error("image error: {0}")]
    Image(#[from] ImageError),

    #[error("authorization error: {0}")]
    Auth(#[from] AuthError),

    #[error("config error: {0}")]
    Config(#[from] AppConfigError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    #[error("too many images: {count} exceeds {max}")]
    TooManyImages { count: usize, max: usize },

    #[error("password access requires a secret")]
    MissingSecret,

    #[error("batch size {count} must be between 1 and {max}")]
    InvalidBatch { count: usize, max: usize },

    #[error("key length {length} must be between {min} and {max}")]
    InvalidKeyLength { length: usize, min: usize, max: usize },

    #[error("token secret must not be empty")]
    MissingTokenSecret,

    #[error("invalid limits: {}", .0.join("; "))]
    InvalidLimits(Vec<String>),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Registry(e) => registry_kind(e),
            Error::EntryStore(e) => entry_store_kind(e),
            Error::Image(e) => image_kind(e),
            Error::Auth(e) => auth_kind(e),
            Error::Config(_) => ErrorKind::Persistence,
            Error::Validation(_) => ErrorKind::Validation,
        }
    }
}

fn registry_kind(e: &RegistryError) -> ErrorKind {
    match e {
        RegistryError::InvalidCount(_)
        | RegistryError::InvalidLength(_)
        | RegistryError::CollisionBudgetExhausted(_) => ErrorKind::Validation,
        RegistryError::Io(_) | RegistryError::Decode(_) | RegistryError::Duplicate(_) => {
            ErrorKind::Persistence
        }
    }
}

fn entry_store_kind(e: &EntryStoreError) -> ErrorKind {
    match e {
        EntryStoreError::InvalidKey(_) | EntryStoreError::InvalidImageName(_) => {
            ErrorKind::Validation
        }
        EntryStoreError::KeyNotFound | EntryStoreError::NotFound => ErrorKind::NotFound,
        EntryStoreError::Io(_) | EntryStoreError::Decode(_) => ErrorKind::Persistence,
    }
}

fn image_kind(e: &ImageError) -> ErrorKind {
    match e {
        ImageError::PayloadTooLarge { .. }
        | ImageError::TooManyPixels { .. }
        | ImageError::UnsupportedMediaType(_)
        | ImageError::Read(_) => ErrorKind::Validation,
        ImageError::DecodeFailed(_) | ImageError::EncodeFailed(_) => ErrorKind::Codec,
        ImageError::WriteFailed(_) => ErrorKind::Persistence,
    }
}

fn auth_kind(e: &AuthError) -> ErrorKind {
    match e {
        AuthError::Store(inner) => entry_store_kind(inner),
        AuthError::Signing(_) => ErrorKind::Persistence,
        AuthError::Rejected
        | AuthError::Denied
        | AuthError::NotYetAvailable
        | AuthError::NoLongerAvailable
        | AuthError::Expired
        | AuthError::Token(_) => ErrorKind::Authorization,
    }
}
