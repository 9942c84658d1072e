//! Configuration file paths

use std::path::PathBuf;

/// Directory holding runbox configuration
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("runbox"))
        .unwrap_or_else(|| PathBuf::from(".runbox"))
}

/// Default configuration file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}
