use crate::config::types::{
    Config, ExportConfig, ParameterConfig, ProviderConfig, RateLimitConfig, RetryConfig,
    RunConfig, StorageConfig,
};
use crate::storage::{KEY_COLUMN, PERIOD_COLUMN};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_provider_config(&config.provider)?;
    validate_parameters(&config.parameters)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_retry_config(&config.retry)?;
    validate_run_config(&config.run)?;
    validate_storage_config(&config.storage)?;

    if config.stations.path.is_empty() {
        return Err(ConfigError::Validation(
            "stations.path cannot be empty".to_string(),
        ));
    }

    if let Some(export) = &config.export {
        validate_export_config(export)?;
    }

    Ok(())
}

/// Validates provider configuration
fn validate_provider_config(config: &ProviderConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.daily_dataset.is_empty() || config.monthly_dataset.is_empty() {
        return Err(ConfigError::Validation(
            "dataset names cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates both parameter catalogs
///
/// Parameter names become column names, so they must be plain identifiers.
fn validate_parameters(config: &ParameterConfig) -> Result<(), ConfigError> {
    for (label, params) in [("daily", &config.daily), ("monthly", &config.monthly)] {
        if params.is_empty() {
            return Err(ConfigError::Validation(format!(
                "{} parameter list cannot be empty",
                label
            )));
        }

        let mut seen = HashSet::new();
        for param in params {
            validate_identifier(param)?;
            let column = param.to_ascii_lowercase();
            if column == KEY_COLUMN || column == PERIOD_COLUMN {
                return Err(ConfigError::Validation(format!(
                    "parameter '{}' collides with a key column",
                    param
                )));
            }
            if !seen.insert(column) {
                return Err(ConfigError::Validation(format!(
                    "duplicate {} parameter '{}'",
                    label, param
                )));
            }
        }
    }

    Ok(())
}

/// Validates rate limit configuration
fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if config.per_second < 1 || config.per_hour < 1 {
        return Err(ConfigError::Validation(format!(
            "request budgets must be >= 1, got per-second={} per-hour={}",
            config.per_second, config.per_hour
        )));
    }

    if config.short_window_ms == 0 || config.long_window_secs == 0 {
        return Err(ConfigError::Validation(
            "rate limit windows must be non-zero".to_string(),
        ));
    }

    if config.burst_every == 0 {
        return Err(ConfigError::Validation(
            "burst-every must be >= 1".to_string(),
        ));
    }

    validate_range("pacing", config.pacing_min_ms, config.pacing_max_ms)?;
    validate_range(
        "burst-pause",
        config.burst_pause_min_ms,
        config.burst_pause_max_ms,
    )?;

    Ok(())
}

/// Validates retry configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    validate_range(
        "backoff-jitter",
        config.backoff_jitter_min_ms,
        config.backoff_jitter_max_ms,
    )?;
    validate_range(
        "rate-limit-jitter",
        config.rate_limit_jitter_min_ms,
        config.rate_limit_jitter_max_ms,
    )?;

    // 2^max_retries must fit the backoff arithmetic
    if config.max_retries > 16 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be <= 16, got {}",
            config.max_retries
        )));
    }

    Ok(())
}

/// Validates run configuration
fn validate_run_config(config: &RunConfig) -> Result<(), ConfigError> {
    if config.chunk_size < 1 {
        return Err(ConfigError::Validation(format!(
            "chunk-size must be >= 1, got {}",
            config.chunk_size
        )));
    }

    if config.max_failed_blocks < 1 {
        return Err(ConfigError::Validation(format!(
            "max-failed-blocks must be >= 1, got {}",
            config.max_failed_blocks
        )));
    }

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    validate_identifier(&config.daily_table)?;
    validate_identifier(&config.monthly_table)?;

    if config.daily_table == config.monthly_table {
        return Err(ConfigError::Validation(
            "daily-table and monthly-table must differ".to_string(),
        ));
    }

    if config.spill_threshold < 1 {
        return Err(ConfigError::Validation(
            "spill-threshold must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates export configuration
fn validate_export_config(config: &ExportConfig) -> Result<(), ConfigError> {
    if config.site_dir.is_empty() {
        return Err(ConfigError::Validation(
            "site-dir cannot be empty".to_string(),
        ));
    }

    if config.recent_days < 1 {
        return Err(ConfigError::Validation(
            "recent-days must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_range(name: &str, min: u64, max: u64) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::Validation(format!(
            "{} range is inverted: min {}ms > max {}ms",
            name, min, max
        )));
    }
    Ok(())
}

/// Validates a SQL identifier (table or column name)
fn validate_identifier(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);

    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::InvalidIdentifier(format!(
            "'{}' must start with a letter or underscore and contain only [A-Za-z0-9_]",
            name
        )));
    }

    Ok(())
}
