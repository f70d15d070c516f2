use std::path::Path;

use crate::config::schema::RemedyConfig;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RemedyConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<RemedyConfig, ConfigError> {
    let config: RemedyConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &RemedyConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.poller.interval_ms == 0 {
        return Err(ConfigError::Validation {
            message: "poller.interval_ms must be greater than 0".to_string(),
        });
    }

    if config.poller.stale_multiplier == 0 {
        return Err(ConfigError::Validation {
            message: "poller.stale_multiplier must be greater than 0".to_string(),
        });
    }

    if config.runner.persist_every == 0 {
        return Err(ConfigError::Validation {
            message: "runner.persist_every must be greater than 0".to_string(),
        });
    }

    if tracing_subscriber::EnvFilter::try_new(&config.log_level).is_err() {
        return Err(ConfigError::Validation {
            message: format!("Invalid log_level filter: '{}'", config.log_level),
        });
    }

    Ok(())
}
