//! Entry envelope and payload as persisted in `entry.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored wrapper around an entry payload.
///
/// `created_at` is fixed by the first write and carried forward by every later one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryEnvelope {
    pub created_at: DateTime<Utc>,
    pub data: EntryPayload,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPayload {
    #[serde(default)]
    pub recipient_name: String,
    #[serde(default)]
    pub remarks: String,
    #[serde(default)]
    pub origin_location: String,
    #[serde(default)]
    pub post_date: String,
    /// Stored image file names, in upload order.
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "AccessControl::is_unrestricted")]
    pub access: AccessControl,
}

/// Lookup rules. Both facets are optional and independent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessControl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<AccessMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<LookupLimit>,
}

impl AccessControl {
    pub fn is_unrestricted(&self) -> bool {
        self.method.is_none() && self.limit.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessMethod {
    pub kind: MethodKind,
    /// Only meaningful for `Password`. `Some("")` is an empty password, `None` is no
    /// password at all (which never matches).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    None,
    Recipient,
    Password,
}

/// Time window during which lookups are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupLimit {
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_after: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_before: Option<DateTime<Utc>>,
}

/// Where `now` falls relative to a [`LookupLimit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPosition {
    Before,
    Within,
    After,
}

impl LookupLimit {
    pub const DISABLED_KIND: &'static str = "none";

    /// Bounds are inclusive. A `kind` of `"none"` disables the window entirely.
    pub fn position(&self, now: DateTime<Utc>) -> WindowPosition {
        if self.kind == Self::DISABLED_KIND {
            return WindowPosition::Within;
        }
        if self.available_after.is_some_and(|after| now < after) {
            return WindowPosition::Before;
        }
        if self.available_before.is_some_and(|before| now > before) {
            return WindowPosition::After;
        }
        WindowPosition::Within
    }
}
