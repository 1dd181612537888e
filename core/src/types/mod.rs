pub(crate) mod config;
pub use config::{AppConfig, AppConfigError, Config, Limits};

pub(crate) mod key;
pub use key::{GENERATION_ALPHABET, Key, KeyError, MAX_KEY_LENGTH};

pub(crate) mod entry;
pub use entry::{
    AccessControl, AccessMethod, EntryEnvelope, EntryPayload, LookupLimit, MethodKind,
    WindowPosition,
};

pub(crate) mod record;
pub use record::{AuditRecord, KeyRecord, KeyStatus, KeyUsage};
