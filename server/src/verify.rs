//! Human verification (Cloudflare Turnstile) for the lookup and login forms.

use crate::config::TurnstileConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("verification response missing")]
    Missing,

    #[error("verification request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("verification rejected: {}", .0.join(", "))]
    Rejected(Vec<String>),
}

/// Decides whether a form submission came from a human.
#[async_trait]
pub trait HumanVerifier: Send + Sync {
    async fn verify(&self, response: &str, client_ip: &str) -> Result<(), VerifyError>;
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

/// Calls the Turnstile `siteverify` endpoint.
pub struct TurnstileVerifier {
    client: reqwest::Client,
    secret: String,
    verify_url: String,
}

impl TurnstileVerifier {
    pub fn new(secret: &str, config: &TurnstileConfig) -> Result<Self, VerifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            secret: secret.to_string(),
            verify_url: config.verify_url.clone(),
        })
    }
}

#[async_trait]
impl HumanVerifier for TurnstileVerifier {
    async fn verify(&self, response: &str, client_ip: &str) -> Result<(), VerifyError> {
        if response.is_empty() {
            return Err(VerifyError::Missing);
        }

        let mut form = vec![("secret", self.secret.as_str()), ("response", response)];
        if !client_ip.is_empty() {
            form.push(("remoteip", client_ip));
        }

        let body: SiteVerifyResponse = self
            .client
            .post(&self.verify_url)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if body.success {
            Ok(())
        } else {
            Err(VerifyError::Rejected(body.error_codes))
        }
    }
}
