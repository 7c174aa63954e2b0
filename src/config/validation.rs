use crate::config::types::{Config, FetchConfig, IdentityConfig, LedgerConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetch_config(&config.fetch)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_ledger_config(&config.ledger)?;
    validate_identity_config(&config.identity)?;
    Ok(())
}

/// Validates retrieval ceilings, deadlines and retry bounds
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.max_concurrent < 1 || config.max_concurrent > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent must be between 1 and 100, got {}",
            config.max_concurrent
        )));
    }

    if config.max_per_host < 1 || config.max_per_host > config.max_concurrent {
        return Err(ConfigError::Validation(format!(
            "max_per_host must be between 1 and max_concurrent ({}), got {}",
            config.max_concurrent, config.max_per_host
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "timeout_secs must be >= 1, got {}",
            config.timeout_secs
        )));
    }

    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.progress_interval < 1 {
        return Err(ConfigError::Validation(
            "progress_interval must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.collector_name.is_empty() {
        return Err(ConfigError::Validation(
            "user-agent collector-name cannot be empty".to_string(),
        ));
    }

    if !config
        .collector_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "user-agent collector-name must be alphanumeric or hyphens, got '{}'",
            config.collector_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates ledger configuration
fn validate_ledger_config(config: &LedgerConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.retention_days < 1 {
        return Err(ConfigError::Validation(format!(
            "retention_days must be >= 1, got {}",
            config.retention_days
        )));
    }

    Ok(())
}

/// Validates significant query keys
fn validate_identity_config(config: &IdentityConfig) -> Result<(), ConfigError> {
    for key in &config.significant_params {
        if key.trim().is_empty() {
            return Err(ConfigError::Validation(
                "significant_params cannot contain empty keys".to_string(),
            ));
        }
    }
    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
