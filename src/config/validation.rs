use crate::config::types::{
    Config, CrawlerConfig, EmbeddingConfig, RetryConfig, ScheduleConfig, TriggerConfig,
};
use crate::schedule::Trigger;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_output_config(&config.output)?;
    validate_schedule_config(&config.schedule)?;
    validate_embedding_config(&config.embedding)?;
    Ok(())
}

/// Validates the pagination walk configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.start_page < 1 {
        return Err(ConfigError::Validation(format!(
            "start_page must be >= 1, got {}",
            config.start_page
        )));
    }

    if let Some(end) = config.end_page {
        if end < config.start_page {
            return Err(ConfigError::Validation(format!(
                "end_page ({}) must be empty or >= start_page ({})",
                end, config.start_page
            )));
        }
    }

    if config.page_cap == Some(0) {
        return Err(ConfigError::Validation(
            "page_cap must be >= 1 when set".to_string(),
        ));
    }

    if !config.page_delay_secs.is_finite() || config.page_delay_secs < 0.0 {
        return Err(ConfigError::Validation(format!(
            "page_delay_secs must be a non-negative number, got {}",
            config.page_delay_secs
        )));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    let base = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url must use http or https, got '{}'",
            config.base_url
        )));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "retry max_attempts must be >= 1".to_string(),
        ));
    }

    if config.max_backoff_ms < config.initial_backoff_ms {
        return Err(ConfigError::Validation(format!(
            "retry max_backoff_ms ({}) must be >= initial_backoff_ms ({})",
            config.max_backoff_ms, config.initial_backoff_ms
        )));
    }

    Ok(())
}

fn validate_output_config(config: &crate::config::types::OutputConfig) -> Result<(), ConfigError> {
    if config.directory.is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_schedule_config(config: &ScheduleConfig) -> Result<(), ConfigError> {
    if config.tick_secs == 0 {
        return Err(ConfigError::Validation(
            "schedule tick_secs must be >= 1".to_string(),
        ));
    }

    if !(-12..=14).contains(&config.utc_offset_hours) {
        return Err(ConfigError::Validation(format!(
            "utc_offset_hours must be between -12 and 14, got {}",
            config.utc_offset_hours
        )));
    }

    for (name, trigger) in [
        ("full", &config.full),
        ("price", &config.price),
        ("non-price", &config.non_price),
    ] {
        if let Some(trigger) = trigger {
            validate_trigger(name, trigger)?;
        }
    }

    Ok(())
}

fn validate_trigger(name: &str, trigger: &TriggerConfig) -> Result<(), ConfigError> {
    Trigger::from_fields(&trigger.hour, trigger.minute)
        .map(|_| ())
        .map_err(|e| ConfigError::Validation(format!("schedule.{}: {}", name, e)))
}

/// Validates the indexing signal target
fn validate_embedding_config(config: &EmbeddingConfig) -> Result<(), ConfigError> {
    if let Some(server) = &config.server {
        let url = Url::parse(server)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid embedding server: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(format!(
                "embedding server must be an http/https URL, got '{}'",
                server
            )));
        }
    }

    if !matches!(config.method.to_ascii_uppercase().as_str(), "GET" | "POST") {
        return Err(ConfigError::Validation(format!(
            "embedding method must be GET or POST, got '{}'",
            config.method
        )));
    }

    if !config.timeout_secs.is_finite() || config.timeout_secs <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "embedding timeout_secs must be positive, got {}",
            config.timeout_secs
        )));
    }

    Ok(())
}
