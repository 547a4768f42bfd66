//! Stream forwarder.
//!
//! # Responsibilities
//! - Refuse plain-HTTP upstreams that are not allowlisted
//! - Relay the request body upstream incrementally, enforcing the size limit
//! - Relay the response (status, headers, body) back incrementally
//! - Map transport failures to 502 / 504; relay upstream statuses verbatim
//!
//! # Design Decisions
//! - No retries: the request body is consumed as it streams
//! - The derived timeout bounds the wait for response headers; while the
//!   body streams, the same duration bounds each gap between chunks
//! - Redirects are relayed to the caller, never followed
//! - Outcomes are labelled by upstream authority, never by credential

use std::collections::HashSet;
use std::io;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, HttpBody},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::Response,
};
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};

use crate::config::schema::ProxyConfig;
use crate::http::response::GatewayError;
use crate::observability::metrics;
use crate::routing::{PathParam, RouteEntry, RouteMatch};
use crate::security::headers::{inject_credential, sanitize_inbound, sanitize_outbound};
use crate::security::limits::{check_content_length, content_length, limit_body};

/// Upper bound on an aggregate member's response body.
pub const AGGREGATE_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Everything the forwarder needs to know about one inbound call.
pub struct Outbound<'a> {
    pub method: Method,
    pub headers: HeaderMap,
    /// Query string to pass on, controls already removed.
    pub query: Option<&'a str>,
    /// Headers that must not leave the gateway.
    pub gateway_only: &'a [HeaderName],
    pub timeout: Duration,
}

/// Buffered result of one aggregate member call.
#[derive(Debug)]
pub struct Fetched {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Shared outbound client plus transport policy.
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    insecure_allowlist: HashSet<String>,
    max_body_size: u64,
}

impl Forwarder {
    pub fn from_config(config: &ProxyConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            insecure_allowlist: config
                .security
                .insecure_upstream_allowlist
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            max_body_size: config.security.max_body_size,
        })
    }

    pub fn max_body_size(&self) -> u64 {
        self.max_body_size
    }

    /// Refuse to send credentials over plaintext unless the host is allowlisted.
    pub fn check_transport(&self, entry: &RouteEntry) -> Result<(), GatewayError> {
        if entry.is_secure() || self.insecure_allowlist.contains(&entry.host().to_ascii_lowercase()) {
            return Ok(());
        }
        tracing::warn!(upstream = %entry.authority(), "Refusing plain-HTTP upstream not in allowlist");
        metrics::record_upstream(&entry.authority(), "insecure", Duration::ZERO);
        Err(GatewayError::InsecureUpstream {
            upstream: entry.authority(),
        })
    }

    /// Forward one request to the matched upstream and stream the answer back.
    pub async fn forward(
        &self,
        route: &RouteMatch,
        outbound: Outbound<'_>,
        body: Body,
    ) -> Result<Response, GatewayError> {
        let entry = &route.entry;
        let upstream = entry.authority();

        check_content_length(&outbound.headers, self.max_body_size)?;
        self.check_transport(entry)?;

        let url = target(entry, route.param.as_ref(), outbound.query)?;
        let declared = content_length(&outbound.headers);
        let mut headers = outbound.headers;
        sanitize_outbound(&mut headers, outbound.gateway_only);
        if let Some(len) = declared {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        }
        inject_credential(entry, &mut headers);

        let mut request = self.client.request(outbound.method, url).headers(headers);
        let overflow = if body.is_end_stream() {
            None
        } else {
            let (stream, overflow) = limit_body(body, self.max_body_size);
            request = request.body(reqwest::Body::wrap_stream(stream));
            Some(overflow)
        };
        let too_large = || overflow.as_ref().is_some_and(|o| o.exceeded());

        let start = Instant::now();
        let response = match tokio::time::timeout(outbound.timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) if too_large() => {
                metrics::record_upstream(&upstream, "rejected", start.elapsed());
                return Err(GatewayError::PayloadTooLarge {
                    limit: self.max_body_size,
                });
            }
            Ok(Err(e)) => return Err(transport_error(&upstream, e, start)),
            Err(_) => {
                metrics::record_upstream(&upstream, "timeout", start.elapsed());
                tracing::warn!(upstream = %upstream, timeout = ?outbound.timeout, "Upstream timed out");
                return Err(GatewayError::GatewayTimeout { upstream });
            }
        };
        metrics::record_upstream(&upstream, "ok", start.elapsed());

        let status = response.status();
        tracing::debug!(upstream = %upstream, status = %status, "Upstream responded");

        let mut headers = response.headers().clone();
        sanitize_inbound(&mut headers);

        let stream = idle_guarded(response.bytes_stream(), outbound.timeout, upstream);
        let mut relayed = Response::new(Body::from_stream(stream));
        *relayed.status_mut() = status;
        *relayed.headers_mut() = headers;
        Ok(relayed)
    }

    /// Buffered `GET` used by aggregate fan-out. `budget` covers both the
    /// response head and the body read.
    ///
    /// The body is parsed here, so the caller's encoding and range
    /// negotiation is not passed on; the upstream answers in identity.
    pub async fn fetch(
        &self,
        entry: &RouteEntry,
        param: Option<&PathParam>,
        query: Option<&str>,
        mut headers: HeaderMap,
        gateway_only: &[HeaderName],
        budget: Duration,
    ) -> Result<Fetched, GatewayError> {
        let upstream = entry.authority();
        self.check_transport(entry)?;

        let url = target(entry, param, query)?;
        sanitize_outbound(&mut headers, gateway_only);
        for name in [header::ACCEPT_ENCODING, header::RANGE, header::IF_RANGE] {
            headers.remove(name);
        }
        inject_credential(entry, &mut headers);

        let start = Instant::now();
        let call = async {
            let response = self.client.get(url).headers(headers).send().await?;
            let status = response.status();
            let body = read_bounded(response, AGGREGATE_MAX_BODY_BYTES).await?;
            Ok::<_, FetchError>(Fetched { status, body })
        };

        match tokio::time::timeout(budget, call).await {
            Ok(Ok(fetched)) => {
                metrics::record_upstream(&upstream, "ok", start.elapsed());
                Ok(fetched)
            }
            Ok(Err(FetchError::Transport(e))) => Err(transport_error(&upstream, e, start)),
            Ok(Err(FetchError::TooLarge)) => {
                metrics::record_upstream(&upstream, "error", start.elapsed());
                Err(GatewayError::BadGateway {
                    upstream,
                    reason: format!("response exceeded {} bytes", AGGREGATE_MAX_BODY_BYTES),
                })
            }
            Err(_) => {
                metrics::record_upstream(&upstream, "timeout", start.elapsed());
                Err(GatewayError::GatewayTimeout { upstream })
            }
        }
    }
}

enum FetchError {
    Transport(reqwest::Error),
    TooLarge,
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Transport(e)
    }
}

fn target(
    entry: &RouteEntry,
    param: Option<&PathParam>,
    query: Option<&str>,
) -> Result<reqwest::Url, GatewayError> {
    entry
        .target_url(param, query)
        .map_err(|e| GatewayError::BadRequest(format!("cannot build upstream URL: {}", e)))
}

fn transport_error(upstream: &str, e: reqwest::Error, start: Instant) -> GatewayError {
    if e.is_timeout() {
        metrics::record_upstream(upstream, "timeout", start.elapsed());
        return GatewayError::GatewayTimeout {
            upstream: upstream.to_string(),
        };
    }
    metrics::record_upstream(upstream, "error", start.elapsed());
    // The URL may carry caller query parameters; keep it out of the message.
    let e = e.without_url();
    tracing::warn!(upstream = %upstream, error = %e, "Upstream request failed");
    GatewayError::BadGateway {
        upstream: upstream.to_string(),
        reason: e.to_string(),
    }
}

async fn read_bounded(response: reqwest::Response, max_bytes: usize) -> Result<Bytes, FetchError> {
    if content_length(response.headers()).is_some_and(|len| len > max_bytes as u64) {
        return Err(FetchError::TooLarge);
    }
    let mut stream = response.bytes_stream();
    let mut buffered = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if buffered.len().saturating_add(chunk.len()) > max_bytes {
            return Err(FetchError::TooLarge);
        }
        buffered.extend_from_slice(&chunk);
    }
    Ok(buffered.freeze())
}

/// Relay `stream`, ending it with an error if the upstream goes quiet for
/// longer than `idle`.
fn idle_guarded<S>(
    stream: S,
    idle: Duration,
    upstream: String,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    futures_util::stream::unfold(Some(Box::pin(stream)), move |state| {
        let upstream = upstream.clone();
        async move {
            let mut stream = state?;
            match tokio::time::timeout(idle, stream.next()).await {
                Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(stream))),
                Ok(Some(Err(e))) => {
                    tracing::warn!(upstream = %upstream, error = %e.without_url(), "Upstream body failed mid-stream");
                    Some((Err(io::Error::other("upstream body failed")), None))
                }
                Ok(None) => None,
                Err(_) => {
                    tracing::warn!(upstream = %upstream, idle = ?idle, "Upstream body idle timeout");
                    Some((
                        Err(io::Error::new(io::ErrorKind::TimedOut, "upstream body idle timeout")),
                        None,
                    ))
                }
            }
        }
    })
}
