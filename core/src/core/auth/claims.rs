use crate::types::Key;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Claims carried by the capability token.
///
/// `allowed_keys` only ever grows. `scope` and `iat` are set by the first grant of a
/// session and never touched again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    #[serde(rename = "allowKeyList", default)]
    pub allowed_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default)]
    pub exp: i64,
}

impl AccessClaims {
    pub fn allows(&self, key: &Key) -> bool {
        self.allowed_keys.iter().any(|k| k == key.as_str())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }
}

/// Adds `key` to `claims` after a successful lookup.
pub fn grant(
    mut claims: AccessClaims,
    key: &Key,
    scope: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> AccessClaims {
    if claims.scope.is_empty() {
        claims.scope = scope.to_string();
    }
    if claims.iat.is_none() {
        claims.iat = Some(now.timestamp());
    }
    claims.exp = (now + ttl).timestamp();
    if !claims.allows(key) {
        claims.allowed_keys.push(key.to_string());
    }
    claims
}
