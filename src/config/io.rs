//! Configuration I/O - Loading and saving configuration
//!
//! Layered precedence: built-in defaults, then the config file if one
//! exists, then environment variable overrides (including `.env`).

use secrecy::SecretString;
use std::path::Path;

use super::types::Config;
use crate::error::{Error, Result};

/// Load configuration with layered precedence
pub fn load_config() -> Result<Config> {
    let config_path = super::paths::config_path();

    let mut config = if config_path.exists() {
        load_config_from_path(&config_path)?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);

    Ok(config)
}

/// Load configuration from a specific path, detecting the format by
/// extension (json parses as JSON5, everything else as TOML).
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let config: Config = if path.extension().is_some_and(|ext| ext == "json") {
        json5::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else {
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    };

    Ok(config)
}

/// Save a configuration file as TOML
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Apply environment variable overrides onto an existing config.
///
/// Loads `.env` first, then overlays `RUNBOX_*` variables. Env vars have
/// the highest precedence in the layering: defaults < file < env.
pub fn apply_env_overrides(config: &mut Config) {
    dotenvy::dotenv().ok();

    if let Ok(url) = std::env::var("RUNBOX_COLLAB_URL") {
        config.collab.base_url = url;
    }
    if let Ok(key) = std::env::var("RUNBOX_API_KEY") {
        if !key.is_empty() {
            config.collab.api_key = Some(SecretString::from(key));
        }
    }
    if let Ok(listen) = std::env::var("RUNBOX_LISTEN") {
        match listen.parse() {
            Ok(addr) => config.server.listen = addr,
            Err(e) => tracing::warn!("Ignoring invalid RUNBOX_LISTEN: {}", e),
        }
    }
    if let Ok(path) = std::env::var("RUNBOX_PYTHON") {
        config.host.python_path = Some(path.into());
    }
    if let Ok(path) = std::env::var("RUNBOX_NODE") {
        config.host.node_path = Some(path.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_toml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[collab]\nbase_url = \"https://api.test\"").unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.collab.base_url, "https://api.test");
        // Untouched sections keep defaults.
        assert_eq!(config.host.max_output_bytes, 1024 * 1024);
    }

    #[test]
    fn test_load_json5_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ collab: { timeout_secs: 5 } }").unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.collab.timeout_secs, 5);
    }

    #[test]
    fn test_invalid_config_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "host = \"not a table\"").unwrap();

        assert!(matches!(
            load_config_from_path(&path),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.collab.base_url = "https://saved.test".to_string();
        save_config(&config, &path).unwrap();

        let loaded = load_config_from_path(&path).unwrap();
        assert_eq!(loaded.collab.base_url, "https://saved.test");
    }
}
