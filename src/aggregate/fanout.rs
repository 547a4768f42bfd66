//! Concurrent fan-out to every distinct upstream of an aggregator path.

use std::collections::HashSet;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName};
use tokio::time::Instant;

use crate::aggregate::{AggregationResult, Outcome, UpstreamIdentity};
use crate::config::schema::AggregateKind;
use crate::http::forward::{Fetched, Forwarder};
use crate::routing::RouteMatch;

/// Parameters shared by every call of one aggregate.
pub struct FanOut<'a> {
    pub kind: AggregateKind,
    /// Caller's query string, controls already removed.
    pub query: Option<&'a str>,
    pub headers: &'a HeaderMap,
    pub gateway_only: &'a [HeaderName],
    /// Each call's own budget.
    pub per_upstream: Duration,
    /// Bound on the whole aggregate.
    pub deadline: Instant,
}

/// Matches reduced to one per (authority, key), first in table order kept.
pub fn distinct_upstreams(matches: Vec<RouteMatch>) -> Vec<RouteMatch> {
    let mut seen = HashSet::new();
    matches
        .into_iter()
        .filter(|m| {
            seen.insert((
                m.entry.authority(),
                m.entry.upstream_key().map(ToOwned::to_owned),
            ))
        })
        .collect()
}

/// Call every upstream concurrently. Results come back in the order of
/// `targets`, whatever order the calls finish in.
pub async fn fan_out(
    forwarder: &Forwarder,
    targets: &[RouteMatch],
    plan: &FanOut<'_>,
) -> Vec<AggregationResult> {
    futures_util::future::join_all(targets.iter().map(|target| async move {
        let upstream = UpstreamIdentity::of(&target.entry);
        let start = Instant::now();
        let call = forwarder.fetch(
            &target.entry,
            target.param.as_ref(),
            plan.query,
            plan.headers.clone(),
            plan.gateway_only,
            plan.per_upstream,
        );

        let outcome = match tokio::time::timeout_at(plan.deadline, call).await {
            Ok(Ok(fetched)) => interpret(plan.kind, fetched),
            Ok(Err(e)) => Err((None, e.to_string())),
            Err(_) => Err((None, "aggregate deadline exceeded".to_string())),
        };
        let latency = start.elapsed();

        match outcome {
            Ok((status, payload)) => AggregationResult {
                upstream,
                outcome: Outcome::Ok,
                http_status: Some(status),
                payload: Some(payload),
                error: None,
                latency,
            },
            Err((status, error)) => {
                tracing::warn!(upstream = %upstream, error = %error, "Aggregate member failed");
                AggregationResult {
                    upstream,
                    outcome: Outcome::Error,
                    http_status: status,
                    payload: None,
                    error: Some(error),
                    latency,
                }
            }
        }
    }))
    .await
}

type Interpreted = Result<(u16, serde_json::Value), (Option<u16>, String)>;

/// Decide whether one upstream answer counts as a success for `kind`.
fn interpret(kind: AggregateKind, fetched: Fetched) -> Interpreted {
    let status = fetched.status.as_u16();
    if !fetched.status.is_success() {
        return Err((Some(status), format!("upstream returned {}", status)));
    }

    match kind {
        AggregateKind::Models => {
            let json: serde_json::Value = serde_json::from_slice(&fetched.body)
                .map_err(|e| (Some(status), format!("invalid model list: {}", e)))?;
            if !json.get("data").is_some_and(serde_json::Value::is_array) {
                return Err((Some(status), "model list has no data array".to_string()));
            }
            Ok((status, json))
        }
        // Any 2xx is healthy; plain-text bodies are kept as strings.
        AggregateKind::Health => {
            let payload = serde_json::from_slice(&fetched.body).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(&fetched.body).into_owned())
            });
            Ok((status, payload))
        }
    }
}
