//! Lookup and view authorization.
//!
//! A successful lookup folds the key into the caller's capability token and re-signs it.
//! Viewing requires a valid token that lists the key. Every rejection a client can see is
//! one of two generic errors, [`AuthError::Rejected`] for lookups and [`AuthError::Denied`]
//! for views, so responses never reveal which part of a request was wrong.
//!
//! Human verification and the trusted-operator identity are decided by the caller.

use crate::core::entries::error::EntryStoreError;
use crate::core::entries::{EntryStore, parse_key};
use crate::core::registry::KeyRegistry;
use crate::types::{EntryPayload, Key, Limits, WindowPosition};
use chrono::{DateTime, Duration, Utc};
use error::AuthError;
use std::sync::Arc;

mod claims;
mod credential;
mod token;

pub use claims::{AccessClaims, grant};
pub use credential::{credential_matches, secret_eq};
pub use token::TokenSigner;

pub mod error {
    use crate::core::entries::error::EntryStoreError;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum AuthError {
        #[error("Lookup failed")]
        Rejected,

        #[error("No access")]
        Denied,

        #[error("Entry is not available yet")]
        NotYetAvailable,

        #[error("Entry is no longer available")]
        NoLongerAvailable,

        #[error("Token expired")]
        Expired,

        #[error("Invalid token: {0}")]
        Token(#[source] jsonwebtoken::errors::Error),

        #[error("Token signing failed: {0}")]
        Signing(#[source] jsonwebtoken::errors::Error),

        #[error("Entry store error: {0}")]
        Store(#[from] EntryStoreError),
    }
}

/// Where the routing endpoint sends a client for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Malformed or unregistered key. Indistinguishable from each other on purpose.
    Landing,
    AwaitingCreation(Key),
    AwaitingLookup(Key),
}

/// Result of a successful lookup: the re-signed token and the claims inside it.
#[derive(Debug, Clone)]
pub struct Grant {
    pub token: String,
    pub claims: AccessClaims,
}

/// Enforces an entry's lookup window, if it has one.
pub fn check_window(payload: &EntryPayload, now: DateTime<Utc>) -> Result<(), AuthError> {
    let Some(limit) = &payload.access.limit else {
        return Ok(());
    };
    match limit.position(now) {
        WindowPosition::Within => Ok(()),
        WindowPosition::Before => Err(AuthError::NotYetAvailable),
        WindowPosition::After => Err(AuthError::NoLongerAvailable),
    }
}

pub struct Authorizer {
    registry: Arc<KeyRegistry>,
    entries: Arc<EntryStore>,
    signer: TokenSigner,
    scope: String,
    ttl: Duration,
}

impl Authorizer {
    pub fn new(
        registry: Arc<KeyRegistry>,
        entries: Arc<EntryStore>,
        token_secret: &[u8],
        limits: &Limits,
    ) -> Self {
        Self {
            registry,
            entries,
            signer: TokenSigner::new(token_secret),
            scope: limits.token_scope.clone(),
            ttl: limits.token_ttl(),
        }
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub fn route(&self, raw_key: &str) -> Route {
        let Ok(key) = parse_key(raw_key) else {
            return Route::Landing;
        };
        if !self.registry.contains(&key) {
            return Route::Landing;
        }
        if self.entries.has_data(key.as_str()) {
            Route::AwaitingLookup(key)
        } else {
            Route::AwaitingCreation(key)
        }
    }

    /// Checks `credential` against the entry for `raw_key` and, on success, returns the
    /// prior token's claims extended with this key.
    ///
    /// An unparsable or expired `prior_token` starts a fresh session instead of failing.
    pub fn lookup(
        &self,
        raw_key: &str,
        credential: &str,
        prior_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Grant, AuthError> {
        let key = parse_key(raw_key).map_err(|_| AuthError::Rejected)?;
        if !self.registry.contains(&key) {
            tracing::debug!(key = %key, "lookup for unregistered key");
            return Err(AuthError::Rejected);
        }

        let envelope = match self.entries.load_data(key.as_str()) {
            Ok(envelope) => envelope,
            Err(EntryStoreError::NotFound) => {
                tracing::debug!(key = %key, "lookup for key without entry");
                return Err(AuthError::Rejected);
            }
            Err(e) => return Err(e.into()),
        };

        if !credential_matches(&envelope.data, credential) {
            tracing::warn!(key = %key, "lookup credential rejected");
            return Err(AuthError::Rejected);
        }
        check_window(&envelope.data, now)?;

        let prior = self.prior_claims(prior_token, now);
        let claims = grant(prior, &key, &self.scope, now, self.ttl);
        let token = self.signer.sign(&claims)?;

        tracing::debug!(key = %key, keys = claims.allowed_keys.len(), "capability token renewed");
        Ok(Grant { token, claims })
    }

    /// Token check for viewing `raw_key`. Every failure is [`AuthError::Denied`].
    pub fn authorize_view(
        &self,
        raw_key: &str,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Key, AuthError> {
        let key = parse_key(raw_key).map_err(|_| AuthError::Denied)?;
        let Some(token) = token else {
            tracing::debug!(key = %key, "view without token");
            return Err(AuthError::Denied);
        };

        match self.signer.verify(token, now) {
            Ok(claims) if claims.allows(&key) => Ok(key),
            Ok(_) => {
                tracing::debug!(key = %key, "token does not allow key");
                Err(AuthError::Denied)
            }
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "token rejected");
                Err(AuthError::Denied)
            }
        }
    }

    fn prior_claims(&self, token: Option<&str>, now: DateTime<Utc>) -> AccessClaims {
        token
            .and_then(|t| self.signer.verify(t, now).ok())
            .unwrap_or_default()
    }
}
