//! Error responses.
//!
//! # Responsibilities
//! - Define the gateway's error taxonomy
//! - Map each error to an HTTP status and an OpenAI-style error body
//!
//! # Design Decisions
//! - Bodies are minimal and never carry credentials
//! - Upstream non-2xx responses are NOT errors here; they are relayed verbatim
//! - Backend timeouts result in 504 Gateway Timeout, other transport
//!   failures in 502 Bad Gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::config::loader::ConfigError;

/// Every way the gateway itself can refuse or fail a request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("No route for {method} {path}")]
    NotFound { method: String, path: String },

    #[error("{0}")]
    BadRequest(String),

    #[error("Payload too large (limit {limit} bytes)")]
    PayloadTooLarge { limit: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream {upstream} is not reachable over TLS and is not allowlisted for plain HTTP")]
    InsecureUpstream { upstream: String },

    #[error("Upstream request failed: {upstream}: {reason}")]
    BadGateway { upstream: String, reason: String },

    #[error("Upstream timeout: {upstream}")]
    GatewayTimeout { upstream: String },
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::InsecureUpstream { .. } | GatewayError::BadGateway { .. } => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::GatewayTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn kind(&self) -> (&'static str, &'static str) {
        match self {
            GatewayError::Unauthorized => ("authentication_error", "unauthorized"),
            GatewayError::NotFound { .. } => ("invalid_request_error", "route_not_found"),
            GatewayError::BadRequest(_) => ("invalid_request_error", "bad_request"),
            GatewayError::PayloadTooLarge { .. } => ("invalid_request_error", "request_too_large"),
            GatewayError::Config(_) => ("api_error", "config_error"),
            GatewayError::InsecureUpstream { .. } => ("api_error", "insecure_upstream"),
            GatewayError::BadGateway { .. } => ("api_error", "upstream_error"),
            GatewayError::GatewayTimeout { .. } => ("timeout_error", "upstream_timeout"),
        }
    }
}

impl From<ConfigError> for GatewayError {
    fn from(e: ConfigError) -> Self {
        GatewayError::Config(e.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    kind: &'static str,
    param: Option<String>,
    code: &'static str,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (kind, code) = self.kind();
        let body = ErrorBody {
            error: ErrorDetail {
                message: self.to_string(),
                kind,
                param: None,
                code,
            },
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            GatewayError::PayloadTooLarge { limit: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            GatewayError::Config("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::GatewayTimeout { upstream: "u".into() }.status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::InsecureUpstream { upstream: "u".into() }.status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_openai_error_body() {
        let response = GatewayError::NotFound {
            method: "GET".into(),
            path: "/nope".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["code"], "route_not_found");
        assert_eq!(json["error"]["type"], "invalid_request_error");
        assert!(json["error"]["param"].is_null());
    }
}
