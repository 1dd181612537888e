use crate::config::Config;
use crate::geo::{DisabledGeoLocator, GeoLocator};
use crate::verify::{HumanVerifier, TurnstileVerifier};
use anyhow::Context;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use mailtrack_core::TrackerCore;
use mailtrack_core::core::auth::secret_eq;
use mailtrack_core::types::Config as CoreConfig;
use rand::RngCore;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<TrackerCore>,
    pub config: Arc<Config>,
    admin_token: Arc<str>,
    pub verifier: Arc<dyn HumanVerifier>,
    pub geo: Arc<dyn GeoLocator>,
}

impl AppState {
    /// Fails when a required secret is missing or the data directory cannot be opened.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let token_secret = config.token_secret()?;
        let turnstile_secret = config.turnstile_secret()?;

        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("failed to create data dir {}", config.data_dir.display())
        })?;

        let admin_token: Arc<str> = match config.admin_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => token.into(),
            _ => {
                let token = random_token();
                tracing::warn!(admin_token = %token, "admin_token not configured, generated one for this run");
                token.into()
            }
        };

        let core = TrackerCore::open(
            CoreConfig {
                base_path: config.data_dir.clone(),
            },
            config.limits.clone(),
            token_secret.as_bytes(),
        )
        .context("failed to open data dir")?;
        tracing::info!(data_dir = %config.data_dir.display(), "data dir opened");

        let verifier = TurnstileVerifier::new(turnstile_secret, &config.turnstile)?;

        Ok(Self {
            core: Arc::new(core),
            config: Arc::new(config.clone()),
            admin_token,
            verifier: Arc::new(verifier),
            geo: Arc::new(DisabledGeoLocator),
        })
    }

    pub fn with_geo(mut self, geo: Arc<dyn GeoLocator>) -> Self {
        self.geo = geo;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn HumanVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    /// Compares against the configured operator password without leaking its length.
    pub fn is_admin_token(&self, presented: &str) -> bool {
        !self.admin_token.is_empty() && secret_eq(presented, &self.admin_token)
    }

    /// Runs blocking core I/O off the async workers.
    pub async fn run<T, F>(&self, f: F) -> Result<T, crate::error::ServerError>
    where
        F: FnOnce(&TrackerCore) -> mailtrack_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let core = Arc::clone(&self.core);
        tokio::task::spawn_blocking(move || f(core.as_ref()))
            .await
            .map_err(|e| crate::error::ServerError::Internal(format!("worker panicked: {e}")))?
            .map_err(Into::into)
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
