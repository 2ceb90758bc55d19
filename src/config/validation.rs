//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (parsing happens in the loader)
//! - Validate value ranges (ports non-zero, window and limit > 0)
//! - Reject upstream targets the forwarder cannot reach
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::ProxyConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} must be a non-zero port")]
    ZeroPort(&'static str),
    #[error("HTTP and HTTPS ports must differ (both {0})")]
    PortClash(u16),
    #[error("target URL {0} must use http://")]
    UnsupportedScheme(String),
    #[error("target URL {0} has no host")]
    MissingHost(String),
    #[error("rate limit window must be greater than zero")]
    ZeroWindow,
    #[error("rate limit max must be greater than zero")]
    ZeroLimit,
    #[error("bind host must not be empty")]
    EmptyBindHost,
}

/// Check a loaded configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.bind_host.trim().is_empty() {
        errors.push(ValidationError::EmptyBindHost);
    }
    if config.http_port == 0 {
        errors.push(ValidationError::ZeroPort("HTTP_PORT"));
    }
    if config.https_port == 0 {
        errors.push(ValidationError::ZeroPort("HTTPS_PORT"));
    }
    if config.http_port != 0 && config.http_port == config.https_port && config.tls.enabled {
        errors.push(ValidationError::PortClash(config.http_port));
    }

    if config.target_url.scheme() != "http" {
        errors.push(ValidationError::UnsupportedScheme(config.target_display()));
    }
    if config.target_url.host_str().map_or(true, str::is_empty) {
        errors.push(ValidationError::MissingHost(config.target_display()));
    }

    if config.rate_limit.window.is_zero() {
        errors.push(ValidationError::ZeroWindow);
    }
    if config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::ZeroLimit);
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
    use std::time::Duration;
    use url::Url;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let mut config = ProxyConfig::default();
        config.http_port = 0;
        config.rate_limit.window = Duration::ZERO;
        config.rate_limit.max_requests = 0;
        config.target_url = Url::parse("https://printer.lan").unwrap();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::ZeroPort("HTTP_PORT")));
        assert!(errors.contains(&ValidationError::ZeroWindow));
        assert!(errors.contains(&ValidationError::ZeroLimit));
    }

    #[test]
    fn same_ports_only_clash_with_tls_enabled() {
        let mut config = ProxyConfig::default();
        config.https_port = config.http_port;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::PortClash(8080)]
        );

        config.tls.enabled = false;
        assert!(validate_config(&config).is_ok());
    }
}
