//! Header hygiene and upstream credential injection.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Strip the caller's gateway credentials before forwarding
//! - Attach the matched route's upstream credential
//!
//! # Design Decisions
//! - The route credential overwrites any caller value for that header
//! - Credential values are marked sensitive and never logged

use axum::http::{
    header::{self, HeaderName},
    HeaderMap,
};

use crate::routing::RouteEntry;

/// Connection-management headers that describe one hop only.
pub const HOP_BY_HOP: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

const KEEP_ALIVE: &str = "keep-alive";
const PROXY_CONNECTION: &str = "proxy-connection";

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(KEEP_ALIVE);
    headers.remove(PROXY_CONNECTION);
}

/// Prepare caller headers for an upstream.
///
/// `gateway_only` are headers meaningful only to the gateway (secret
/// carriers, timeout controls); they never leave it.
pub fn sanitize_outbound<'a>(
    headers: &mut HeaderMap,
    gateway_only: impl IntoIterator<Item = &'a HeaderName>,
) {
    strip_hop_by_hop(headers);
    for name in gateway_only {
        headers.remove(name);
    }
    // Set by the HTTP client for the outbound connection and body.
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
}

/// Prepare upstream response headers for the caller.
pub fn sanitize_inbound(headers: &mut HeaderMap) {
    strip_hop_by_hop(headers);
}

/// Set the route's upstream credential, overwriting any caller value.
pub fn inject_credential(entry: &RouteEntry, headers: &mut HeaderMap) {
    if let Some(value) = entry.credential() {
        headers.insert(entry.key_header().clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RouteConfig;
    use axum::http::HeaderValue;

    fn entry(header: &str, prefix: &str, key: Option<&str>) -> RouteEntry {
        RouteEntry::from_config(
            0,
            &RouteConfig {
                path: "/v1/chat/completions".into(),
                methods: vec!["POST".into()],
                upstream_url: "https://u1/x".into(),
                upstream_key: key.map(Into::into),
                upstream_key_header: header.into(),
                upstream_key_prefix: prefix.into(),
            },
        )
        .unwrap()
    }

    #[test]
    fn removes_hop_by_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive, x-custom-hop"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-custom-hop", HeaderValue::from_static("1"));
        headers.insert("proxy-authorization", HeaderValue::from_static("secret"));
        headers.insert("proxy-connection", HeaderValue::from_static("keep-alive"));
        headers.insert("te", HeaderValue::from_static("trailers"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("upgrade", HeaderValue::from_static("websocket"));
        headers.insert("content-type", HeaderValue::from_static("text/event-stream"));

        sanitize_inbound(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers["content-type"], "text/event-stream");
    }

    #[test]
    fn outbound_drops_gateway_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer gateway-secret"));
        headers.insert("x-gateway-secret", HeaderValue::from_static("gateway-secret"));
        headers.insert("x-request-timeout", HeaderValue::from_static("5"));
        headers.insert("host", HeaderValue::from_static("gateway.local"));
        headers.insert("x-test", HeaderValue::from_static("ok"));

        let gateway_only = [
            HeaderName::from_static("x-gateway-secret"),
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-timeout"),
        ];
        sanitize_outbound(&mut headers, &gateway_only);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers["x-test"], "ok");
    }

    #[test]
    fn inject_overwrites_caller_value() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer caller"));
        headers.append("authorization", HeaderValue::from_static("Bearer caller-2"));

        inject_credential(&entry("Authorization", "Bearer ", Some("K1")), &mut headers);

        let values: Vec<_> = headers.get_all("authorization").iter().collect();
        assert_eq!(values, ["Bearer K1"]);
    }

    #[test]
    fn inject_custom_header_without_prefix() {
        let mut headers = HeaderMap::new();
        inject_credential(&entry("x-api-key", "", Some("abc")), &mut headers);
        assert_eq!(headers["x-api-key"], "abc");
        assert!(headers.get("authorization").is_none());
    }

    #[test]
    fn no_key_injects_nothing() {
        let mut headers = HeaderMap::new();
        inject_credential(&entry("Authorization", "Bearer ", None), &mut headers);
        assert!(headers.is_empty());
    }
}
