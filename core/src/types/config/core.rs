use std::path::PathBuf;

/// Core configuration for TrackerCore initialization.
#[derive(Clone, Debug)]
pub struct Config {
    pub base_path: PathBuf,
}

impl Config {
    pub fn keys_path(&self) -> PathBuf {
        self.base_path.join("keys.json")
    }

    pub fn entries_path(&self) -> PathBuf {
        self.base_path.join("entries")
    }
}
