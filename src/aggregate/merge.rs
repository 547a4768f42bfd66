//! Merging aggregate results into one response body.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{json, Value};

use crate::aggregate::{AggregationResult, Outcome, UpstreamIdentity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Healthy only if every upstream is; vacuously healthy when empty.
    pub fn of(results: &[AggregationResult]) -> Self {
        let failed = results.iter().filter(|r| !r.is_ok()).count();
        if failed == 0 {
            HealthStatus::Healthy
        } else if failed < results.len() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

#[derive(Debug, Serialize)]
struct UpstreamSummary<'a> {
    upstream: &'a UpstreamIdentity,
    status: Outcome,
    http_status: Option<u16>,
    latency_ms: u128,
    error: Option<&'a str>,
}

impl<'a> From<&'a AggregationResult> for UpstreamSummary<'a> {
    fn from(r: &'a AggregationResult) -> Self {
        Self {
            upstream: &r.upstream,
            status: r.outcome,
            http_status: r.http_status,
            latency_ms: r.latency.as_millis(),
            error: r.error.as_deref(),
        }
    }
}

fn summaries(results: &[AggregationResult]) -> Vec<UpstreamSummary<'_>> {
    results.iter().map(UpstreamSummary::from).collect()
}

/// Union of every successful upstream's model list.
///
/// Duplicate ids keep the first occurrence in `results` order. Each model
/// object gains an `upstream` field naming where it came from.
pub fn merge_models(results: &[AggregationResult]) -> Value {
    let mut seen = HashSet::new();
    let mut data = Vec::new();

    for result in results.iter().filter(|r| r.is_ok()) {
        let models = result
            .payload
            .as_ref()
            .and_then(|p| p.get("data"))
            .and_then(Value::as_array);
        for model in models.into_iter().flatten() {
            let Some(id) = model.get("id").and_then(Value::as_str) else {
                continue;
            };
            if !seen.insert(id.to_string()) {
                continue;
            }
            let mut model = model.clone();
            if let Some(obj) = model.as_object_mut() {
                obj.entry("upstream")
                    .or_insert_with(|| Value::String(result.upstream.to_string()));
            }
            data.push(model);
        }
    }

    json!({
        "object": "list",
        "data": data,
        "upstreams": summaries(results),
    })
}

/// Overall status, plus per-upstream health lines when `details` is set.
///
/// Without details the body names no upstream, key fingerprint or error.
pub fn merge_health(results: &[AggregationResult], details: bool) -> (HealthStatus, Value) {
    let status = HealthStatus::of(results);
    let body = if details {
        json!({
            "status": status,
            "upstreams": summaries(results),
        })
    } else {
        json!({ "status": status })
    };
    (status, body)
}
