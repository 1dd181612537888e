use crate::types::Key;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered access key. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub key: Key,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub comment: String,
}

/// Usage of a key as seen by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum KeyStatus {
    NotFound,
    Available { created_at: DateTime<Utc> },
    Used { created_at: DateTime<Utc> },
}

/// One lookup visit. Appended to the per-key audit log, never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub time: DateTime<Utc>,
    #[serde(rename = "ua")]
    pub user_agent: String,
    #[serde(rename = "ip")]
    pub client_ip: String,
}

/// A registered key plus whether an entry has been created for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyUsage {
    #[serde(flatten)]
    pub record: KeyRecord,
    pub used: bool,
}
