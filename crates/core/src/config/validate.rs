use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Request interval is a positive, finite number of seconds
/// - Burst size, attempts, worker count and page sizes are at least 1
/// - Volume limit is within 10..=10000
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let interval = config.rate_limit.request_interval_secs;
    if !interval.is_finite() || interval <= 0.0 {
        return Err(ConfigError::ValidationError(
            "rate_limit.request_interval_secs must be greater than 0".to_string(),
        ));
    }

    if config.rate_limit.burst_size == 0 {
        return Err(ConfigError::ValidationError(
            "rate_limit.burst_size must be at least 1".to_string(),
        ));
    }

    if config.retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "retry.max_attempts must be at least 1".to_string(),
        ));
    }

    if !(10..=10_000).contains(&config.search.volume_limit) {
        return Err(ConfigError::ValidationError(
            "search.volume_limit must be between 10 and 10000".to_string(),
        ));
    }

    if config.search.fallback_volume_limit == 0 {
        return Err(ConfigError::ValidationError(
            "search.fallback_volume_limit must be at least 1".to_string(),
        ));
    }

    if config.search.issue_page_size == 0 {
        return Err(ConfigError::ValidationError(
            "search.issue_page_size must be at least 1".to_string(),
        ));
    }

    if config.identify.worker_threads == 0 {
        return Err(ConfigError::ValidationError(
            "identify.worker_threads must be at least 1".to_string(),
        ));
    }

    if config.catalog.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "catalog.timeout_secs must be at least 1".to_string(),
        ));
    }

    Ok(())
}
