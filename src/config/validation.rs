//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Reject configurations that would fail open (empty service secret)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::HeaderName;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted location of the offending value, e.g. `routes[2].path`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate the process configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {}", config.listener.bind_address),
        ));
    }

    if config.auth.service_secret.trim().is_empty() {
        errors.push(ValidationError::new(
            "auth.service_secret",
            "must be set; the gateway refuses to run unauthenticated",
        ));
    }
    if HeaderName::from_bytes(config.auth.secret_header.as_bytes()).is_err() {
        errors.push(ValidationError::new(
            "auth.secret_header",
            format!("invalid header name: {}", config.auth.secret_header),
        ));
    }

    if config.routing.routes_path.trim().is_empty() {
        errors.push(ValidationError::new("routing.routes_path", "must be set"));
    }
    let mut seen = HashSet::new();
    for (i, agg) in config.routing.aggregate.iter().enumerate() {
        if !agg.path.starts_with('/') {
            errors.push(ValidationError::new(
                format!("routing.aggregate[{}].path", i),
                "must start with '/'",
            ));
        }
        if !seen.insert(agg.path.as_str()) {
            errors.push(ValidationError::new(
                format!("routing.aggregate[{}].path", i),
                format!("duplicate aggregator path {}", agg.path),
            ));
        }
    }

    let t = &config.timeouts;
    if t.default_secs == 0 {
        errors.push(ValidationError::new("timeouts.default_secs", "must be > 0"));
    }
    if t.max_secs < t.default_secs {
        errors.push(ValidationError::new(
            "timeouts.max_secs",
            "must be >= timeouts.default_secs",
        ));
    }
    if t.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be > 0"));
    }
    if t.aggregate_upstream_secs == 0 {
        errors.push(ValidationError::new(
            "timeouts.aggregate_upstream_secs",
            "must be > 0",
        ));
    }
    if HeaderName::from_bytes(t.header.as_bytes()).is_err() {
        errors.push(ValidationError::new(
            "timeouts.header",
            format!("invalid header name: {}", t.header),
        ));
    }
    if t.query_param.is_empty() {
        errors.push(ValidationError::new("timeouts.query_param", "must be set"));
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be > 0"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "not a socket address: {}",
                config.observability.metrics_address
            ),
        ));
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

    fn valid() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.auth.service_secret = "secret".into();
        config
    }

    #[test]
    fn default_with_secret_is_valid() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn empty_secret_fails_closed() {
        let config = ProxyConfig::default();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "auth.service_secret"));
    }

    #[test]
    fn reports_every_problem() {
        let mut config = valid();
        config.timeouts.default_secs = 0;
        config.timeouts.header = "bad header".into();
        config.listener.bind_address = "nowhere".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
