//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check the TLS section is complete enough to initialize
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: TerminatorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::TerminatorConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("tls: {0}")]
    Tls(String),

    #[error("observability.log_level: unknown level '{0}'")]
    LogLevel(String),
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn check_address(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

/// Check every section and collect all problems.
pub fn validate_config(config: &TerminatorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address("listener.bind_address", &config.listener.bind_address, &mut errors);
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_connections"));
    }

    if let Err(e) = config.tls.validate() {
        errors.push(ValidationError::Tls(e.to_string()));
    }
    if config.tls.session_timeout_secs == 0 {
        errors.push(ValidationError::Zero("tls.session_timeout_secs"));
    }

    if config.timeouts.handshake_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.handshake_secs"));
    }
    if config.timeouts.idle_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.idle_secs"));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }
    if config.observability.metrics_enabled {
        check_address(
            "observability.metrics_address",
            &config.observability.metrics_address,
            &mut errors,
        );
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
    use crate::tls::TlsConfig;

    fn valid() -> TerminatorConfig {
        TerminatorConfig {
            tls: TlsConfig::with_key_pair("cert.pem", "key.pem"),
            ..TerminatorConfig::default()
        }
    }

    #[test]
    fn accepts_complete_config() {
        assert_eq!(validate_config(&valid()), Ok(()));
    }

    #[test]
    fn defaults_lack_certificates() {
        let errors = validate_config(&TerminatorConfig::default()).unwrap_err();
        assert!(matches!(errors.as_slice(), [ValidationError::Tls(_)]));
    }

    #[test]
    fn collects_every_error() {
        let mut config = valid();
        config.listener.bind_address = "not-an-address".to_string();
        config.listener.max_connections = 0;
        config.timeouts.idle_secs = 0;
        config.observability.log_level = "loud".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::Zero("listener.max_connections")));
        assert!(errors.contains(&ValidationError::LogLevel("loud".to_string())));
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = valid();
        config.observability.metrics_address = "nope".to_string();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
