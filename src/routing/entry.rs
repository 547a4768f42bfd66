//! Validated route entries.

use std::fmt;

use axum::http::{HeaderName, HeaderValue, Method};
use url::Url;

use crate::config::schema::RouteConfig;
use crate::config::validation::ValidationError;
use crate::routing::matcher::{PathParam, PathPattern};

/// One routable upstream binding, validated at load time.
///
/// Immutable once built; shared between tables and in-flight requests via
/// `Arc`.
#[derive(Clone)]
pub struct RouteEntry {
    pattern: PathPattern,
    methods: Vec<Method>,
    upstream_url: String,
    upstream_key: Option<String>,
    key_header: HeaderName,
    key_prefix: String,
    /// Prefix + key, marked sensitive so it is never printed by `http`.
    credential: Option<HeaderValue>,
    host: String,
    port: Option<u16>,
    secure: bool,
}

impl RouteEntry {
    /// Build an entry from its raw configuration.
    ///
    /// `index` is the entry's position in the document, used only to
    /// locate validation errors.
    pub fn from_config(index: usize, config: &RouteConfig) -> Result<Self, Vec<ValidationError>> {
        let field = |name: &str| format!("routes[{}].{}", index, name);
        let mut errors = Vec::new();

        let pattern = match PathPattern::parse(config.path.trim()) {
            Ok(p) => Some(p),
            Err(e) => {
                errors.push(ValidationError::new(field("path"), e.to_string()));
                None
            }
        };

        let mut methods = Vec::new();
        if config.methods.is_empty() {
            errors.push(ValidationError::new(field("methods"), "must not be empty"));
        }
        for m in &config.methods {
            match Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()) {
                Ok(method) if !methods.contains(&method) => methods.push(method),
                Ok(_) => {}
                Err(_) => errors.push(ValidationError::new(
                    field("methods"),
                    format!("invalid HTTP method: {}", m),
                )),
            }
        }

        let upstream_url = config.upstream_url.trim().to_string();
        let param = pattern.as_ref().and_then(|p| p.param_name());
        let mut host = String::new();
        let mut port = None;
        let mut secure = false;
        match check_upstream_url(&upstream_url, param) {
            Ok(url) => {
                host = url.host_str().unwrap_or_default().to_ascii_lowercase();
                port = url.port();
                secure = url.scheme() == "https";
            }
            Err(msg) => errors.push(ValidationError::new(field("upstream_url"), msg)),
        }

        let key_header = match HeaderName::from_bytes(config.upstream_key_header.trim().as_bytes()) {
            Ok(h) => Some(h),
            Err(_) => {
                errors.push(ValidationError::new(
                    field("upstream_key_header"),
                    format!("invalid header name: {}", config.upstream_key_header),
                ));
                None
            }
        };

        let upstream_key = config
            .upstream_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);
        let credential = match &upstream_key {
            Some(key) => match HeaderValue::from_str(&format!("{}{}", config.upstream_key_prefix, key)) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    Some(value)
                }
                Err(_) => {
                    // Deliberately does not echo the value.
                    errors.push(ValidationError::new(
                        field("upstream_key"),
                        "prefix + key is not a valid header value",
                    ));
                    None
                }
            },
            None => None,
        };

        match (pattern, key_header) {
            (Some(pattern), Some(key_header)) if errors.is_empty() => Ok(Self {
                pattern,
                methods,
                upstream_url,
                upstream_key,
                key_header,
                key_prefix: config.upstream_key_prefix.clone(),
                credential,
                host,
                port,
                secure,
            }),
            _ => Err(errors),
        }
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Exact method match, ignoring ASCII case. Configured methods are
    /// upper-case; inbound extension methods keep the caller's spelling.
    pub fn allows(&self, method: &Method) -> bool {
        self.methods
            .iter()
            .any(|m| m.as_str().eq_ignore_ascii_case(method.as_str()))
    }

    /// The configured upstream URL, possibly still templated.
    pub fn upstream_url(&self) -> &str {
        &self.upstream_url
    }

    pub fn upstream_key(&self) -> Option<&str> {
        self.upstream_key.as_deref()
    }

    pub fn key_header(&self) -> &HeaderName {
        &self.key_header
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Header value to inject, already prefixed.
    pub fn credential(&self) -> Option<&HeaderValue> {
        self.credential.as_ref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// `host[:port]` of the upstream.
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Concrete URL for one call: the captured parameter substituted and
    /// the caller's query string appended.
    pub fn target_url(&self, param: Option<&PathParam>, query: Option<&str>) -> Result<Url, url::ParseError> {
        let raw = match param {
            Some(p) => self.upstream_url.replace(&format!("{{{}}}", p.name), &p.value),
            None => self.upstream_url.clone(),
        };
        let mut url = Url::parse(&raw)?;
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            let merged = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{}&{}", existing, q),
                _ => q.to_string(),
            };
            url.set_query(Some(&merged));
        }
        Ok(url)
    }
}

fn check_upstream_url(raw: &str, param: Option<&str>) -> Result<Url, String> {
    let candidate = match param {
        Some(name) => raw.replace(&format!("{{{}}}", name), "param"),
        None => raw.to_string(),
    };
    if candidate.contains(['{', '}']) {
        return Err("references a path parameter the route path does not define".to_string());
    }
    let url = Url::parse(&candidate).map_err(|e| format!("not an absolute URL: {}", e))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(format!("unsupported scheme: {}", url.scheme()));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err("missing host".to_string());
    }
    Ok(url)
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("path", &self.pattern.as_str())
            .field("methods", &self.methods)
            .field("upstream_url", &self.upstream_url)
            .field("upstream_key", &self.upstream_key.as_ref().map(|_| "<redacted>"))
            .field("key_header", &self.key_header)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(path: &str, url: &str, key: Option<&str>) -> RouteConfig {
        RouteConfig {
            path: path.into(),
            methods: vec!["post".into()],
            upstream_url: url.into(),
            upstream_key: key.map(Into::into),
            upstream_key_header: "Authorization".into(),
            upstream_key_prefix: "Bearer ".into(),
        }
    }

    #[test]
    fn builds_credential_with_prefix() {
        let entry = RouteEntry::from_config(0, &raw("/v1/chat/completions", "http://u1/x", Some("K1"))).unwrap();

        assert_eq!(entry.credential().unwrap().to_str().unwrap(), "Bearer K1");
        assert!(entry.credential().unwrap().is_sensitive());
        assert!(entry.allows(&Method::POST));
        assert!(!entry.allows(&Method::GET));
        assert_eq!(entry.authority(), "u1");
        assert!(!entry.is_secure());
    }

    #[test]
    fn method_match_ignores_case() {
        let entry = RouteEntry::from_config(0, &raw("/x", "http://u/x", None)).unwrap();
        assert!(entry.allows(&Method::from_bytes(b"post").unwrap()));
        assert!(entry.allows(&Method::from_bytes(b"Post").unwrap()));
        assert!(!entry.allows(&Method::from_bytes(b"get").unwrap()));
    }

    #[test]
    fn empty_prefix_and_custom_header() {
        let mut config = raw("/v1/embeddings", "https://api.example.com:8443/e", Some("abc"));
        config.upstream_key_header = "x-api-key".into();
        config.upstream_key_prefix = String::new();

        let entry = RouteEntry::from_config(0, &config).unwrap();
        assert_eq!(entry.key_header().as_str(), "x-api-key");
        assert_eq!(entry.credential().unwrap().to_str().unwrap(), "abc");
        assert_eq!(entry.authority(), "api.example.com:8443");
        assert!(entry.is_secure());
    }

    #[test]
    fn blank_key_means_no_credential() {
        let entry = RouteEntry::from_config(0, &raw("/x", "http://u/x", Some("  "))).unwrap();
        assert!(entry.credential().is_none());
        assert!(entry.upstream_key().is_none());
    }

    #[test]
    fn target_url_substitutes_param_and_query() {
        let entry = RouteEntry::from_config(
            0,
            &raw("/v1/responses/{id}", "http://vllm:8000/v1/responses/{id}?api-version=2", None),
        )
        .unwrap();
        let param = PathParam {
            name: "id".into(),
            value: "resp_9".into(),
        };

        let url = entry.target_url(Some(&param), Some("stream=true")).unwrap();
        assert_eq!(url.as_str(), "http://vllm:8000/v1/responses/resp_9?api-version=2&stream=true");
    }

    #[test]
    fn collects_all_errors() {
        let config = RouteConfig {
            path: "no-slash".into(),
            methods: vec![],
            upstream_url: "ftp://u/x".into(),
            upstream_key: Some("sk\u{7f}live".into()),
            upstream_key_header: "bad header".into(),
            upstream_key_prefix: "Bearer ".into(),
        };
        let errors = RouteEntry::from_config(3, &config).unwrap_err();

        assert!(errors.iter().all(|e| e.field.starts_with("routes[3].")));
        assert_eq!(errors.len(), 5);
        assert!(errors.iter().all(|e| !e.message.contains("live")));
    }

    #[test]
    fn rejects_unknown_url_param() {
        let errors = RouteEntry::from_config(0, &raw("/x", "http://u/{id}", None)).unwrap_err();
        assert_eq!(errors[0].field, "routes[0].upstream_url");
    }

    #[test]
    fn debug_is_redacted() {
        let entry = RouteEntry::from_config(0, &raw("/x", "http://u/x", Some("sk-secret"))).unwrap();
        assert!(!format!("{:?}", entry).contains("sk-secret"));
    }
}
