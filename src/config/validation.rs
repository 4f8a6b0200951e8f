use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Search provider '{url}' must be an http:// or https:// URL")]
    InvalidProviderUrl { url: String },

    #[error("{field} must be positive")]
    NonPositiveDuration { field: &'static str },

    #[error("{field} must be at least 1")]
    EmptyLimit { field: &'static str },

    #[error("Search keyword must not be empty")]
    EmptyKeyword,

    #[error("logging.max_bytes must be positive")]
    InvalidLogMaxBytes,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_search(config)?;
    validate_workers(config)?;
    validate_logging(config)?;
    Ok(())
}

/// An empty provider list is accepted: every search then goes straight to the fallback
fn validate_search(config: &Config) -> Result<(), ValidationError> {
    for url in &config.search.providers {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ValidationError::InvalidProviderUrl { url: url.clone() });
        }
    }

    if config.search.deadline_ms == 0 {
        return Err(ValidationError::NonPositiveDuration {
            field: "search.deadline_ms",
        });
    }
    if config.search.max_results == 0 {
        return Err(ValidationError::EmptyLimit {
            field: "search.max_results",
        });
    }
    if config.retrieval.search_results == 0 {
        return Err(ValidationError::EmptyLimit {
            field: "retrieval.search_results",
        });
    }
    if config.search.keyword.trim().is_empty() {
        return Err(ValidationError::EmptyKeyword);
    }

    Ok(())
}

fn validate_workers(config: &Config) -> Result<(), ValidationError> {
    let w = &config.workers;
    let durations = [
        ("workers.download_poll_ms", w.download_poll_ms),
        ("workers.playback_poll_ms", w.playback_poll_ms),
        ("workers.osd_interval_ms", w.osd_interval_ms),
        ("workers.osd_duration_ms", w.osd_duration_ms),
        ("workers.control_deadline_ms", w.control_deadline_ms),
        ("workers.library_scan_interval_secs", w.library_scan_interval_secs),
    ];

    // playback_gap_ms may be zero: no pause between songs
    for (field, value) in durations {
        if value == 0 {
            return Err(ValidationError::NonPositiveDuration { field });
        }
    }

    Ok(())
}

fn validate_logging(config: &Config) -> Result<(), ValidationError> {
    if config.logging.max_bytes.as_u64() == 0 {
        return Err(ValidationError::InvalidLogMaxBytes);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::ByteSize;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_empty_provider_list_is_valid() {
        let mut config = Config::default();
        config.search.providers.clear();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_rejects_non_http_provider() {
        let mut config = Config::default();
        config.search.providers = vec!["ftp://mirror/api/v1/search".to_string()];
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidProviderUrl { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_deadline() {
        let mut config = Config::default();
        config.search.deadline_ms = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::NonPositiveDuration {
                field: "search.deadline_ms"
            })
        ));
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let mut config = Config::default();
        config.workers.download_poll_ms = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::NonPositiveDuration {
                field: "workers.download_poll_ms"
            })
        ));
    }

    #[test]
    fn test_allows_zero_playback_gap() {
        let mut config = Config::default();
        config.workers.playback_gap_ms = 0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_rejects_zero_log_size() {
        let mut config = Config::default();
        config.logging.max_bytes = ByteSize(0);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidLogMaxBytes)
        ));
    }
}
