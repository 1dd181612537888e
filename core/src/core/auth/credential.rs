use crate::types::{EntryPayload, MethodKind};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::sync::LazyLock;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Process-wide key for [`keyed_digest`]; digests are never stored or sent anywhere.
static DIGEST_KEY: LazyLock<[u8; 32]> = LazyLock::new(|| {
    let mut key = [0u8; 32];
    rand::rng().fill_bytes(&mut key);
    key
});

/// Fixed-length HMAC-SHA256 of `value`.
pub(super) fn keyed_digest(value: &str) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(DIGEST_KEY.as_slice()).ok()?;
    mac.update(value.as_bytes());
    Some(mac.finalize().into_bytes().to_vec())
}

/// Compares two secrets without leaking the length or content of a wrong guess.
///
/// Both sides are reduced to digests of the same size first, so the comparison time does
/// not depend on either input.
pub fn secret_eq(presented: &str, expected: &str) -> bool {
    match (keyed_digest(presented), keyed_digest(expected)) {
        (Some(a), Some(b)) => a.ct_eq(&b).into(),
        _ => false,
    }
}

/// Checks a submitted lookup credential against the entry's access method.
///
/// An entry without a method, or with kind `none`, accepts anything. A recipient method
/// with no stored recipient name and a password method with no stored secret never match.
pub fn credential_matches(payload: &EntryPayload, submitted: &str) -> bool {
    let Some(method) = &payload.access.method else {
        return true;
    };
    match method.kind {
        MethodKind::None => true,
        MethodKind::Recipient => {
            !payload.recipient_name.is_empty() && secret_eq(submitted, &payload.recipient_name)
        }
        MethodKind::Password => method
            .secret
            .as_deref()
            .is_some_and(|secret| secret_eq(submitted, secret)),
    }
}
