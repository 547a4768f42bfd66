//! Inbound authentication gate.
//!
//! The gateway has one service secret, independent of any upstream
//! credential. Callers present it through any of several carriers; each
//! carrier is a [`SecretExtractor`] and the gate accepts the request if any
//! extracted candidate matches.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, HeaderName, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::{Choice, ConstantTimeEq};

use crate::config::schema::AuthConfig;
use crate::http::response::GatewayError;

/// One way a caller can carry the service secret.
pub trait SecretExtractor: Send + Sync {
    /// Header this carrier uses; stripped before forwarding upstream.
    fn header(&self) -> &HeaderName;

    /// The presented secret, if this carrier is present and well-formed.
    fn extract<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str>;
}

/// Secret sent verbatim in a dedicated header.
pub struct DedicatedHeader {
    name: HeaderName,
}

impl DedicatedHeader {
    pub fn new(name: HeaderName) -> Self {
        Self { name }
    }
}

impl SecretExtractor for DedicatedHeader {
    fn header(&self) -> &HeaderName {
        &self.name
    }

    fn extract<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get(&self.name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    }
}

/// Secret sent as `Authorization: Bearer <secret>`, for clients that only
/// know how to send a single API key.
pub struct BearerAuthorization {
    name: HeaderName,
}

impl Default for BearerAuthorization {
    fn default() -> Self {
        Self { name: AUTHORIZATION }
    }
}

impl SecretExtractor for BearerAuthorization {
    fn header(&self) -> &HeaderName {
        &self.name
    }

    fn extract<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        let value = headers.get(&self.name)?.to_str().ok()?;
        let (scheme, token) = value.trim().split_once(' ')?;
        scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
    }
}

/// Request extension set once the caller has presented the service secret.
///
/// Exempt paths reach the handlers without it unless the caller sent the
/// secret anyway.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated;

/// Validates the service secret before any routing happens.
pub struct AuthGate {
    secret: String,
    extractors: Vec<Box<dyn SecretExtractor>>,
    exempt_paths: HashSet<String>,
}

impl AuthGate {
    pub fn new(secret: impl Into<String>, extractors: Vec<Box<dyn SecretExtractor>>) -> Self {
        Self {
            secret: secret.into(),
            extractors,
            exempt_paths: HashSet::new(),
        }
    }

    /// Gate with the dedicated header first, then bearer authorization.
    pub fn from_config(config: &AuthConfig) -> Result<Self, GatewayError> {
        let header = HeaderName::from_bytes(config.secret_header.as_bytes()).map_err(|_| {
            GatewayError::Config(format!("invalid secret header: {}", config.secret_header))
        })?;
        let mut gate = Self::new(
            config.service_secret.clone(),
            vec![
                Box::new(DedicatedHeader::new(header)),
                Box::new(BearerAuthorization::default()),
            ],
        );
        gate.exempt_paths = config.exempt_paths.iter().cloned().collect();
        Ok(gate)
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.contains(path)
    }

    /// Headers that may carry the service secret.
    pub fn carrier_headers(&self) -> impl Iterator<Item = &HeaderName> {
        self.extractors.iter().map(|e| e.header())
    }

    /// `Ok` if any carrier presents the secret.
    ///
    /// Every carrier is compared, and each comparison is constant-time, so
    /// which carrier matched (if any) does not change the work done.
    pub fn check(&self, headers: &HeaderMap) -> Result<(), GatewayError> {
        if self.secret.is_empty() {
            return Err(GatewayError::Unauthorized);
        }

        let expected = self.secret.as_bytes();
        let mut ok = Choice::from(0u8);
        for extractor in &self.extractors {
            if let Some(candidate) = extractor.extract(headers) {
                ok |= candidate.as_bytes().ct_eq(expected);
            }
        }

        if bool::from(ok) {
            Ok(())
        } else {
            Err(GatewayError::Unauthorized)
        }
    }
}

/// Middleware enforcing the auth gate ahead of routing.
pub async fn auth_middleware(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let verdict = gate.check(request.headers());
    if verdict.is_ok() {
        request.extensions_mut().insert(Authenticated);
    }
    if gate.is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    match verdict {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::warn!(
                method = %request.method(),
                path = %request.uri().path(),
                "Rejected unauthenticated request"
            );
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn gate() -> AuthGate {
        let mut config = AuthConfig::default();
        config.service_secret = "s3cret".into();
        AuthGate::from_config(&config).unwrap()
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_missing_secret_rejected() {
        assert!(gate().check(&HeaderMap::new()).is_err());
    }

    #[test]
    fn test_dedicated_header() {
        assert!(gate().check(&headers(&[("x-gateway-secret", "s3cret")])).is_ok());
        assert!(gate().check(&headers(&[("x-gateway-secret", "wrong")])).is_err());
    }

    #[test]
    fn test_bearer_authorization() {
        assert!(gate().check(&headers(&[("authorization", "Bearer s3cret")])).is_ok());
        assert!(gate().check(&headers(&[("authorization", "bearer s3cret")])).is_ok());
        assert!(gate().check(&headers(&[("authorization", "Basic s3cret")])).is_err());
        assert!(gate().check(&headers(&[("authorization", "s3cret")])).is_err());
    }

    #[test]
    fn test_either_carrier_suffices() {
        let both = headers(&[
            ("x-gateway-secret", "wrong"),
            ("authorization", "Bearer s3cret"),
        ]);
        assert!(gate().check(&both).is_ok());

        let both = headers(&[
            ("x-gateway-secret", "s3cret"),
            ("authorization", "Bearer upstream-key"),
        ]);
        assert!(gate().check(&both).is_ok());
    }

    #[test]
    fn test_prefix_of_secret_rejected() {
        assert!(gate().check(&headers(&[("x-gateway-secret", "s3cre")])).is_err());
        assert!(gate().check(&headers(&[("x-gateway-secret", "s3cret2")])).is_err());
    }

    #[test]
    fn test_empty_secret_never_matches() {
        let gate = AuthGate::new("", vec![Box::new(DedicatedHeader::new(HeaderName::from_static("x-k")))]);
        assert!(gate.check(&headers(&[("x-k", "")])).is_err());
    }

    #[test]
    fn test_carrier_headers() {
        let gate = gate();
        let names: Vec<_> = gate.carrier_headers().map(|h| h.as_str()).collect();
        assert_eq!(names, ["x-gateway-secret", "authorization"]);
    }
}
