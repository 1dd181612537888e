use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use mailtrack_core::types::Limits;
use serde::Deserialize;
use std::path::PathBuf;

pub const CONFIG_FILE: &str = "mailtrack.toml";
pub const ENV_PREFIX: &str = "MAILTRACK_";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub limits: Limits,

    /// Operator password. A random one is generated at startup when unset.
    #[serde(default)]
    pub admin_token: Option<String>,
    /// HS256 key for capability tokens. Required.
    #[serde(default)]
    pub token_secret: Option<String>,

    #[serde(default)]
    pub turnstile: TurnstileConfig,

    /// Adds `Secure` to every cookie. Enable behind TLS.
    #[serde(default)]
    pub secure_cookies: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TurnstileConfig {
    /// Server-side secret. Required.
    pub secret: Option<String>,
    /// Public site key handed to clients that render the widget.
    pub site_key: Option<String>,
    #[serde(default = "default_verify_url")]
    pub verify_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for TurnstileConfig {
    fn default() -> Self {
        Self {
            secret: None,
            site_key: None,
            verify_url: default_verify_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_verify_url() -> String {
    "https://challenges.cloudflare.com/turnstile/v0/siteverify".into()
}
fn default_timeout_ms() -> u64 {
    4000
}

impl Config {
    /// `mailtrack.toml` in the working directory, overridden by `MAILTRACK_*` variables.
    /// Nested keys use a double underscore, e.g. `MAILTRACK_TURNSTILE__SECRET`.
    pub fn load() -> anyhow::Result<Self> {
        let config: Config = Figment::new()
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    pub fn token_secret(&self) -> anyhow::Result<&str> {
        required(self.token_secret.as_deref(), "token_secret")
    }

    pub fn turnstile_secret(&self) -> anyhow::Result<&str> {
        required(self.turnstile.secret.as_deref(), "turnstile.secret")
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> anyhow::Result<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => anyhow::bail!("FATAL: `{name}` is not configured; set it in {CONFIG_FILE} or the environment"),
    }
}
