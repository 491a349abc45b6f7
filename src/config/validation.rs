use crate::config::types::{Config, CrawlerConfig, EndpointConfig, OutputConfig, RequestConfig};
use crate::subject::REQUIRED_FIELDS;
use crate::ConfigError;
use url::Url;

/// Upper bound for the fetch pool width
const MAX_CONCURRENCY: usize = 64;

/// Validates the entire configuration
///
/// Runs before any network access; every failure here is fatal.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_request_config(&config.request)?;
    validate_endpoints(&config.endpoints)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    config.entity_type.parse::<crate::subject::EntityType>()?;

    if config.start < 1 {
        return Err(ConfigError::Validation(format!(
            "start page must be >= 1, got {}",
            config.start
        )));
    }

    if config.start > config.end {
        return Err(ConfigError::Validation(format!(
            "start page ({}) must not be after end page ({})",
            config.start, config.end
        )));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(
            "batch_size must be >= 1".to_string(),
        ));
    }

    if config.concurrency < 1 || config.concurrency > MAX_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY, config.concurrency
        )));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(
            "max_retries must be >= 1 (it counts the first attempt)".to_string(),
        ));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates request identification
fn validate_request_config(config: &RequestConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if let Some(token) = &config.access_token {
        if token.trim().is_empty() {
            return Err(ConfigError::Validation(
                "access_token cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates that both endpoints are absolute HTTP(S) URLs
fn validate_endpoints(config: &EndpointConfig) -> Result<(), ConfigError> {
    validate_base_url("site_url", &config.site_url)?;
    validate_base_url("api_url", &config.api_url)?;
    Ok(())
}

fn validate_base_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            name, value
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.data_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "data_dir cannot be empty".to_string(),
        ));
    }

    if config.failure_log.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "failure_log cannot be empty".to_string(),
        ));
    }

    // flatten rejects records without these, so dropping one empties the table
    if let Some(field) = config
        .drop_fields
        .iter()
        .find(|field| REQUIRED_FIELDS.contains(&field.as_str()))
    {
        return Err(ConfigError::Validation(format!(
            "drop_fields cannot include required field '{}'",
            field
        )));
    }

    Ok(())
}
