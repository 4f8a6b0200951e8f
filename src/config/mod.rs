//! Configuration management for karaokebox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use karaokebox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Kiosk listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `KARAOKEBOX__<section>__<key>`
//!
//! Examples:
//! - `KARAOKEBOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `KARAOKEBOX__PLAYER__IPC_SOCKET=/run/karaokebox/mpv.sock`
//! - `KARAOKEBOX__LOGGING__MAX_BYTES=2MB`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/karaokebox.toml`.
//! This can be overridden using the `KARAOKEBOX_CONFIG` environment variable
//! or the `--config` command line flag.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    Config, LoggingConfig, PlayerConfig, RetrievalConfig, SearchConfig, ServerConfig,
    WorkerConfig,
};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`KARAOKEBOX__*`)
    /// 2. TOML file (default: `config/karaokebox.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Load configuration, preferring an explicit file over the default lookup
    pub fn load_with(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Port advertised in the join overlay
    pub fn public_port(&self) -> u16 {
        self.server.bind_addr.port()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[server]\nbind_addr = \"0.0.0.0:8181\"\n").unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.public_port(), 8181);
        assert_eq!(config.retrieval.binary, "yt-dlp");
    }

    #[test]
    fn test_validation_catches_bad_provider() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[search]
providers = ["invidious.example/api/v1/search"]
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::InvalidProviderUrl { .. })
        ));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:8080"
db_path = "data/karaokebox.db"
download_dir = "data/downloads"

[retrieval]
binary = "/usr/local/bin/yt-dlp"
format = "best[height<=720]"
cookies_file = "data/cookies.txt"
search_results = 8

[player]
binary = "/usr/bin/mpv"
ipc_socket = "/run/karaokebox/mpv.sock"
video_output = "gpu"
profile = "fast"

[search]
providers = ["https://a.example/api/v1/search", "https://b.example/api/v1/search"]
deadline_ms = 2500
max_results = 12

[workers]
download_poll_ms = 1000
playback_gap_ms = 3000
osd_interval_ms = 4000
library_scan_interval_secs = 60

[logging]
filter = "karaokebox=debug"
file = "data/karaokebox.log"
max_bytes = "2MB"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        assert_eq!(config.retrieval.search_results, 8);
        assert_eq!(config.player.video_output, "gpu");
        assert_eq!(config.search.providers.len(), 2);
        assert_eq!(config.search.deadline().as_millis(), 2500);
        assert_eq!(config.workers.playback_gap().as_secs(), 3);
        assert_eq!(config.workers.library_scan_interval().as_secs(), 60);
        assert_eq!(config.logging.max_bytes.as_u64(), 2 * 1024 * 1024);
    }
}
