//! Configuration types
//!
//! Every section deserializes with full defaults so a missing config file
//! is never an error.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Execution host settings
    #[serde(default)]
    pub host: HostConfig,
    /// External collaborator settings
    #[serde(default)]
    pub collab: CollabConfig,
    /// Replay settings
    #[serde(default)]
    pub replay: ReplayConfig,
    /// Transient handoff store settings
    #[serde(default)]
    pub handoff: HandoffConfig,
    /// API server settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Execution host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Cadence of batched record flushes from the worker
    #[serde(with = "humantime_serde", default = "default_flush_interval")]
    pub flush_interval: Duration,
    /// Watchdog: runs exceeding this are force-failed
    #[serde(with = "humantime_serde", default = "default_watchdog")]
    pub watchdog: Duration,
    /// Maximum captured output per run, in bytes
    #[serde(default = "default_max_output")]
    pub max_output_bytes: usize,
    /// Override for the Python interpreter (PATH lookup otherwise)
    #[serde(default)]
    pub python_path: Option<PathBuf>,
    /// Override for the Node interpreter (PATH lookup otherwise)
    #[serde(default)]
    pub node_path: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            flush_interval: default_flush_interval(),
            watchdog: default_watchdog(),
            max_output_bytes: default_max_output(),
            python_path: None,
            node_path: None,
        }
    }
}

fn default_flush_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_watchdog() -> Duration {
    Duration::from_secs(30)
}

fn default_max_output() -> usize {
    1024 * 1024 // 1MB
}

/// External collaborator configuration (fix, title, bug report)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollabConfig {
    /// Base URL of the collaborator API
    #[serde(default = "default_collab_url")]
    pub base_url: String,
    /// API key, if the collaborator requires one. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,
    /// Per-request timeout in seconds
    #[serde(default = "default_collab_timeout")]
    pub timeout_secs: u64,
    /// Retry budget for retryable failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for CollabConfig {
    fn default() -> Self {
        CollabConfig {
            base_url: default_collab_url(),
            api_key: None,
            timeout_secs: default_collab_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_collab_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_collab_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

/// Replay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Delay between autoplay advances
    #[serde(with = "humantime_serde", default = "default_autoplay_delay")]
    pub autoplay_delay: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        ReplayConfig {
            autoplay_delay: default_autoplay_delay(),
        }
    }
}

fn default_autoplay_delay() -> Duration {
    Duration::from_millis(2000)
}

/// Transient handoff store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    /// Time-to-live of unconsumed handoff values
    #[serde(with = "humantime_serde", default = "default_handoff_ttl")]
    pub ttl: Duration,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        HandoffConfig {
            ttl: default_handoff_ttl(),
        }
    }
}

fn default_handoff_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> SocketAddr {
    "127.0.0.1:8787".parse().expect("valid default address")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.host.flush_interval, Duration::from_millis(250));
        assert_eq!(config.host.watchdog, Duration::from_secs(30));
        assert_eq!(config.replay.autoplay_delay, Duration::from_millis(2000));
        assert_eq!(config.handoff.ttl, Duration::from_secs(300));
        assert!(config.collab.api_key.is_none());
    }

    #[test]
    fn test_empty_document_deserializes() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.host.max_output_bytes, 1024 * 1024);
    }

    #[test]
    fn test_humantime_durations() {
        let config: Config = toml::from_str(
            r#"
            [host]
            flush_interval = "500ms"
            watchdog = "10s"

            [replay]
            autoplay_delay = "2s"
            "#,
        )
        .unwrap();
        assert_eq!(config.host.flush_interval, Duration::from_millis(500));
        assert_eq!(config.host.watchdog, Duration::from_secs(10));
        assert_eq!(config.replay.autoplay_delay, Duration::from_secs(2));
    }
}
