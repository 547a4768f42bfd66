//! Timeout derivation.
//!
//! # Responsibilities
//! - Derive each request's upstream deadline: query parameter, then
//!   header, then the configured default
//! - Clamp caller-supplied values to a ceiling
//! - Remove the control from the query string forwarded upstream
//!
//! # Design Decisions
//! - Values are seconds and may be fractional (`?timeout=2.5`)
//! - Malformed, zero or negative values are a 400, never silently ignored
//! - Timed-out requests return 504 Gateway Timeout

use std::time::Duration;

use axum::http::{HeaderMap, HeaderName};

use crate::config::schema::TimeoutConfig;
use crate::http::response::GatewayError;

/// Process-wide timeout policy.
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    default: Duration,
    max: Duration,
    aggregate_upstream: Duration,
    query_param: String,
    header: HeaderName,
}

impl TimeoutPolicy {
    pub fn from_config(config: &TimeoutConfig) -> Result<Self, GatewayError> {
        let header = HeaderName::from_bytes(config.header.as_bytes())
            .map_err(|_| GatewayError::Config(format!("invalid timeout header: {}", config.header)))?;
        Ok(Self {
            default: Duration::from_secs(config.default_secs),
            max: Duration::from_secs(config.max_secs),
            aggregate_upstream: Duration::from_secs(config.aggregate_upstream_secs),
            query_param: config.query_param.clone(),
            header,
        })
    }

    /// Header carrying the per-request control.
    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    /// Each aggregate call's own budget.
    pub fn aggregate_upstream(&self) -> Duration {
        self.aggregate_upstream
    }

    /// Effective timeout for one request.
    pub fn derive(&self, query: Option<&str>, headers: &HeaderMap) -> Result<Duration, GatewayError> {
        let from_query = query.and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == self.query_param.as_str())
                .map(|(_, v)| v.into_owned())
        });

        let raw = match from_query {
            Some(v) => Some(v),
            None => match headers.get(&self.header) {
                Some(v) => Some(
                    v.to_str()
                        .map_err(|_| GatewayError::BadRequest(format!("invalid {} header", self.header)))?
                        .to_string(),
                ),
                None => None,
            },
        };

        match raw {
            Some(raw) => Ok(self.parse(&raw)?.min(self.max)),
            None => Ok(self.default),
        }
    }

    fn parse(&self, raw: &str) -> Result<Duration, GatewayError> {
        let secs: f64 = raw
            .trim()
            .parse()
            .map_err(|_| GatewayError::BadRequest(format!("invalid timeout: {:?}", raw)))?;
        if !secs.is_finite() || secs <= 0.0 {
            return Err(GatewayError::BadRequest(format!(
                "timeout must be a positive number of seconds, got {:?}",
                raw
            )));
        }
        // Anything beyond the ceiling is clamped by the caller anyway.
        Ok(Duration::try_from_secs_f64(secs).unwrap_or(self.max))
    }

    /// Keys are compared decoded, the same way `derive` reads them.
    fn is_control(&self, pair: &str) -> bool {
        url::form_urlencoded::parse(pair.as_bytes())
            .next()
            .is_some_and(|(key, _)| key == self.query_param.as_str())
    }

    /// Query string with the timeout control removed, `None` if nothing is left.
    pub fn strip_control(&self, query: Option<&str>) -> Option<String> {
        let query = query?;
        let kept: Vec<&str> = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| !self.is_control(pair))
            .collect();
        if kept.is_empty() {
            None
        } else {
            Some(kept.join("&"))
        }
    }
}
