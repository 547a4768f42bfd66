//! Request body size limits.
//!
//! # Responsibilities
//! - Reject bodies whose declared Content-Length exceeds the limit, before
//!   any upstream contact
//! - Count streamed (chunked) bodies and abort the stream at the limit
//!
//! # Design Decisions
//! - Counting wraps the stream; nothing is buffered
//! - The overflow is recorded in a shared flag so the forwarder can report
//!   413 instead of a generic upstream failure

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::http::response::GatewayError;

/// Declared body length, if the caller sent a parseable Content-Length.
pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Reject a declared length over the limit.
pub fn check_content_length(headers: &HeaderMap, limit: u64) -> Result<(), GatewayError> {
    match content_length(headers) {
        Some(len) if len > limit => Err(GatewayError::PayloadTooLarge { limit }),
        _ => Ok(()),
    }
}

/// Set once a limited stream has gone over its limit.
#[derive(Debug, Clone, Default)]
pub struct Overflow(Arc<AtomicBool>);

impl Overflow {
    pub fn exceeded(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn trip(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Stream `body` while counting bytes; yields an error and stops once more
/// than `limit` bytes have been seen.
pub fn limit_body(
    body: Body,
    limit: u64,
) -> (impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static, Overflow) {
    let overflow = Overflow::default();
    let flag = overflow.clone();
    let mut seen: u64 = 0;

    let stream = body
        .into_data_stream()
        .map(move |chunk| {
            let chunk = chunk.map_err(io::Error::other)?;
            seen = seen.saturating_add(chunk.len() as u64);
            if seen > limit {
                flag.trip();
                return Err(io::Error::other(format!("request body exceeds {} bytes", limit)));
            }
            Ok(chunk)
        })
        .scan(false, |failed, item| {
            if *failed {
                return futures_util::future::ready(None);
            }
            *failed = item.is_err();
            futures_util::future::ready(Some(item))
        });

    (stream, overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_declared_length() {
        let mut headers = HeaderMap::new();
        assert!(check_content_length(&headers, 10).is_ok());

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("10"));
        assert!(check_content_length(&headers, 10).is_ok());

        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("11"));
        assert!(matches!(
            check_content_length(&headers, 10),
            Err(GatewayError::PayloadTooLarge { limit: 10 })
        ));
    }

    #[tokio::test]
    async fn test_stream_under_limit_passes() {
        let chunks: Vec<Result<Bytes, io::Error>> = vec![Ok(Bytes::from("hello ")), Ok(Bytes::from("world"))];
        let body = Body::from_stream(futures_util::stream::iter(chunks));

        let (stream, overflow) = limit_body(body, 11);
        let out: Vec<_> = stream.collect().await;

        assert!(out.iter().all(Result::is_ok));
        assert!(!overflow.exceeded());
    }

    #[tokio::test]
    async fn test_stream_over_limit_aborts() {
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from("aaaa")),
            Ok(Bytes::from("bbbb")),
            Ok(Bytes::from("cccc")),
        ];
        let body = Body::from_stream(futures_util::stream::iter(chunks));

        let (stream, overflow) = limit_body(body, 6);
        let out: Vec<_> = stream.collect().await;

        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert!(out[1].is_err());
        assert!(overflow.exceeded());
    }
}
