mod app;
mod core;

pub use app::{AppConfig, AppConfigError, Limits};
pub use self::core::Config;
