use crate::types::MAX_KEY_LENGTH;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Operator-tunable settings, persisted as mailtrack.toml in the data directory.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub limits: Limits,
}

impl AppConfig {
    /// Returns the config file path within the given data directory.
    pub fn path(data_dir: &Path) -> std::path::PathBuf {
        data_dir.join("mailtrack.toml")
    }

    /// Loads config from a TOML file. Returns default config if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, AppConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), AppConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Upload, key and token limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default = "default_max_images")]
    pub max_images: usize,
    /// Lossy WebP quality, 0.0..=100.0.
    #[serde(default = "default_webp_quality")]
    pub webp_quality: f32,
    /// Decoded images larger than this on either side are downscaled before encoding.
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    /// Uploads declaring more pixels than this are rejected before decoding.
    #[serde(default = "default_max_source_pixels")]
    pub max_source_pixels: u64,
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: u32,
    #[serde(default = "default_token_scope")]
    pub token_scope: String,
    #[serde(default = "default_min_key_length")]
    pub min_key_length: usize,
    #[serde(default = "default_max_key_length")]
    pub max_key_length: usize,
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            max_images: default_max_images(),
            webp_quality: default_webp_quality(),
            max_dimension: default_max_dimension(),
            max_source_pixels: default_max_source_pixels(),
            token_ttl_days: default_token_ttl_days(),
            token_scope: default_token_scope(),
            min_key_length: default_min_key_length(),
            max_key_length: default_max_key_length(),
            max_batch: default_max_batch(),
        }
    }
}

impl Limits {
    /// Validates limit values and returns list of validation errors.
    /// Returns empty vec if limits are valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_upload_bytes == 0 {
            errors.push("max_upload_bytes must be at least 1".to_string());
        }
        if !(0.0..=100.0).contains(&self.webp_quality) {
            errors.push("webp_quality must be between 0 and 100".to_string());
        }
        if self.max_dimension == 0 {
            errors.push("max_dimension must be at least 1".to_string());
        }
        if self.max_source_pixels == 0 {
            errors.push("max_source_pixels must be at least 1".to_string());
        }
        if self.token_ttl_days == 0 {
            errors.push("token_ttl_days must be at least 1".to_string());
        }
        if self.token_scope.is_empty() {
            errors.push("token_scope must not be empty".to_string());
        }
        if self.min_key_length == 0 || self.min_key_length > self.max_key_length {
            errors.push("min_key_length must be between 1 and max_key_length".to_string());
        }
        if self.max_key_length > MAX_KEY_LENGTH {
            errors.push(format!("max_key_length must be at most {MAX_KEY_LENGTH}"));
        }
        if self.max_batch == 0 {
            errors.push("max_batch must be at least 1".to_string());
        }

        errors
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.token_ttl_days))
    }
}

fn default_max_upload_bytes() -> u64 {
    40 * 1024 * 1024
}

fn default_max_images() -> usize {
    9
}

fn default_webp_quality() -> f32 {
    75.0
}

fn default_max_dimension() -> u32 {
    8192
}

fn default_max_source_pixels() -> u64 {
    64_000_000
}

fn default_token_ttl_days() -> u32 {
    90
}

fn default_token_scope() -> String {
    "page:view".to_string()
}

fn default_min_key_length() -> usize {
    6
}

fn default_max_key_length() -> usize {
    MAX_KEY_LENGTH
}

fn default_max_batch() -> usize {
    1_000_000
}

/// Errors that can occur when loading or saving config.
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Limits::default().validate().is_empty());
        assert_eq!(Limits::default().max_images, 9);
        assert_eq!(Limits::default().token_ttl(), chrono::Duration::days(90));
    }

    #[test]
    fn test_validate_reports_each_problem() {
        let limits = Limits {
            max_upload_bytes: 0,
            webp_quality: 120.0,
            min_key_length: 10,
            max_key_length: 5,
            ..Limits::default()
        };
        let errors = limits.validate();
        assert_eq!(errors.len(), 3, "{errors:?}");
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig::load(&AppConfig::path(temp.path())).unwrap();
        assert_eq!(config.limits.max_images, 9);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let path = AppConfig::path(temp.path());
        std::fs::write(&path, "[limits]\nmax_images = 4\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.limits.max_images, 4);
        assert_eq!(config.limits.webp_quality, 75.0);
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let path = AppConfig::path(temp.path());
        let mut config = AppConfig::default();
        config.limits.token_scope = "entry:read".to_string();
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.limits.token_scope, "entry:read");
    }
}
