//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: impl AsRef<Path>) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GatewayConfig = toml::from_str(&content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DeliveryPolicy;

    #[test]
    fn partial_toml_fills_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [listener]
            port = 7200

            [dispatch]
            policy = "broadcast"
            "#,
        )
        .unwrap();
        assert_eq!(config.listener.port, 7200);
        assert_eq!(config.listener.read_timeout_secs, 60);
        assert_eq!(config.dispatch.policy, DeliveryPolicy::Broadcast);
        assert_eq!(config.dispatch.queue_capacity, 5000);
        assert_eq!(config.status.interval_secs, 15);
    }

    #[test]
    fn supervisor_defaults_follow_backoff_constants() {
        use crate::supervisor::backoff;
        let config = GatewayConfig::default();
        assert_eq!(
            config.supervisor.consumer_restart_secs,
            backoff::CONSUMER_RESTART.as_secs()
        );
        assert_eq!(
            config.supervisor.registry_restart_secs,
            backoff::REGISTRY_RESTART.as_secs()
        );
    }

    #[test]
    fn invalid_port_fails_validation() {
        let config: GatewayConfig = toml::from_str("[listener]\nport = 80\n").unwrap();
        assert!(matches!(
            validate_config(&config),
            Err(ref e) if e.len() == 1
        ));
    }
}
