//! Read-only HTTP projections of relay state: `/api/stats`, `/api/queue`,
//! `/health`. None of these mutate anything.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use relay_core::{now_ms, CommandSummary, Stats};
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub queue: Vec<CommandSummary>,
}

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `"ok"`, or `"degraded"` once the relay stopped answering.
    pub status: String,
    pub timestamp: i64,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    pub executor_count: usize,
    pub submitter_count: usize,
    /// Open WebSocket connections.
    pub connections: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, stats: Option<Stats>, connections: usize) -> HealthResponse {
    let stats_known = stats.is_some();
    let stats = stats.unwrap_or_default();
    HealthResponse {
        status: if stats_known { "ok" } else { "degraded" }.into(),
        timestamp: now_ms(),
        uptime_secs: start_time.elapsed().as_secs(),
        executor_count: stats.executor_count,
        submitter_count: stats.submitter_count,
        connections,
    }
}

pub async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.relay.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

pub async fn queue_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.relay.queue().await {
        Ok(queue) => Json(QueueResponse { queue }).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.relay.stats().await.ok();
    let resp = health_check(state.started_at, stats, state.hub.count());
    let http_status = if resp.status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (http_status, Json(resp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn status_ok_with_stats() {
        let resp = health_check(Instant::now(), Some(Stats::default()), 0);
        assert_eq!(resp.status, "ok");
    }

    #[test]
    fn status_degraded_without_stats() {
        let resp = health_check(Instant::now(), None, 3);
        assert_eq!(resp.status, "degraded");
        assert_eq!(resp.connections, 3);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now().checked_sub(Duration::from_secs(60)).unwrap();
        let resp = health_check(start, Some(Stats::default()), 0);
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn counters_copied_from_stats() {
        let stats = Stats {
            submitter_count: 7,
            queue_length: 2,
            executor_count: 1,
            total_commands: 12,
        };
        let resp = health_check(Instant::now(), Some(stats), 8);
        assert_eq!(resp.submitter_count, 7);
        assert_eq!(resp.executor_count, 1);
    }

    #[test]
    fn serialization_is_camel_case() {
        let resp = health_check(Instant::now(), Some(Stats::default()), 2);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 2);
        assert!(json["uptimeSecs"].is_number());
        assert!(json["executorCount"].is_number());
        assert!(json["timestamp"].is_number());
    }
}
