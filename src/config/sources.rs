use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "KARAOKEBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/karaokebox.toml";
const ENV_PREFIX: &str = "KARAOKEBOX";
const ENV_SEPARATOR: &str = "__";

/// Resolve the configuration file path: explicit argument, then
/// `KARAOKEBOX_CONFIG`, then `config/karaokebox.toml`
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load(explicit: Option<PathBuf>) -> Result<Config, ConfigError> {
    // A missing .env is the common case on the kiosk
    let _ = dotenvy::dotenv();

    load_from_sources(config_path(explicit))
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // KARAOKEBOX__SEARCH__DEADLINE_MS -> search.deadline_ms
    // KARAOKEBOX__SEARCH__PROVIDERS=https://a/api/v1/search,https://b/api/v1/search
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .list_separator(",")
            .with_list_parse_key("search.providers")
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
