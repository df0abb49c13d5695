//! Configuration validation.

use thiserror::Error;

use crate::config::schema::GatewayConfig;

/// A single validation failure.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("listener.port {0} outside allowed range [1000, 65535]")]
    ForbiddenPort(u16),

    #[error("listener.read_timeout_secs must be non-zero")]
    ZeroReadTimeout,

    #[error("dispatch.queue_capacity must be non-zero")]
    ZeroQueueCapacity,

    #[error("status.interval_secs must be non-zero")]
    ZeroStatusInterval,

    #[error("status.server_name must not be empty")]
    EmptyServerName,

    #[error("allowlist.refresh_secs must be non-zero when the allow-list is enabled")]
    ZeroAllowListRefresh,
}

/// Check every section; all failures are reported, not just the first.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.port < 1000 {
        errors.push(ValidationError::ForbiddenPort(config.listener.port));
    }
    if config.listener.read_timeout_secs == 0 {
        errors.push(ValidationError::ZeroReadTimeout);
    }
    if config.dispatch.queue_capacity == 0 {
        errors.push(ValidationError::ZeroQueueCapacity);
    }
    if config.status.interval_secs == 0 {
        errors.push(ValidationError::ZeroStatusInterval);
    }
    if config.status.server_name.is_empty() {
        errors.push(ValidationError::EmptyServerName);
    }
    if config.allowlist.enabled && config.allowlist.refresh_secs == 0 {
        errors.push(ValidationError::ZeroAllowListRefresh);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn low_port_is_rejected() {
        let mut config = GatewayConfig::default();
        config.listener.port = 999;
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::ForbiddenPort(999)));
    }

    #[test]
    fn all_failures_reported_together() {
        let mut config = GatewayConfig::default();
        config.listener.port = 80;
        config.dispatch.queue_capacity = 0;
        config.status.server_name.clear();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
