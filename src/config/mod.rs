//! Configuration module - Modular configuration management
//!
//! - types.rs: configuration sections with serde defaults
//! - io.rs: loading and saving (json5/toml, env overrides)
//! - paths.rs: configuration file paths

mod io;
mod paths;
mod types;

pub use io::{apply_env_overrides, load_config, load_config_from_path, save_config};
pub use paths::{config_dir, config_path};
pub use types::{
    CollabConfig, Config, HandoffConfig, HostConfig, ReplayConfig, ServerConfig,
};
