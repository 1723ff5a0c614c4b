use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server URLs and client ID are set
/// - Monitor check period, timeout and buffer size are non-zero
/// - At least one fetch attempt is allowed
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.base_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "server.base_url cannot be empty".to_string(),
        ));
    }
    if config.server.auth_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "server.auth_url cannot be empty".to_string(),
        ));
    }
    if config.server.client_id.is_empty() {
        return Err(ConfigError::ValidationError(
            "server.client_id cannot be empty".to_string(),
        ));
    }

    if config.monitor.check_period_ms == 0 {
        return Err(ConfigError::ValidationError(
            "monitor.check_period_ms cannot be 0".to_string(),
        ));
    }
    if config.monitor.timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "monitor.timeout_ms cannot be 0".to_string(),
        ));
    }
    if config.monitor.buffer_size == 0 {
        return Err(ConfigError::ValidationError(
            "monitor.buffer_size cannot be 0".to_string(),
        ));
    }

    if config.ingest.retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "ingest.retry.max_attempts must be at least 1".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExportConfig, IngestConfig, MonitorConfig, ServerConfig};
    use tokio_test::{assert_err, assert_ok};

    fn valid_config() -> Config {
        Config {
            server: ServerConfig {
                base_url: "https://fhir.example.com".to_string(),
                auth_url: "https://fhir.example.com/token".to_string(),
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
                scopes: vec![],
                request_timeout_secs: 60,
            },
            export: ExportConfig::default(),
            monitor: MonitorConfig::default(),
            ingest: IngestConfig::default(),
        }
    }

    #[test]
    fn test_validate_valid_config() {
        assert_ok!(validate_config(&valid_config()));
    }

    #[test]
    fn test_validate_empty_base_url_fails() {
        let mut config = valid_config();
        config.server.base_url = " ".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_check_period_fails() {
        let mut config = valid_config();
        config.monitor.check_period_ms = 0;
        let err = assert_err!(validate_config(&config));
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_attempts_fails() {
        let mut config = valid_config();
        config.ingest.retry.max_attempts = 0;
        assert_err!(validate_config(&config));
    }
}
