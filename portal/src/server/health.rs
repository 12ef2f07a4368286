//! Readiness and metrics endpoints.
//!
//! Liveness (`/health`) comes from `records_web::handlers`; readiness adds a
//! bounded ping of the entity store.

use super::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use records_runtime::{HealthCheck, HealthReport};
use records_web::handlers::health::{ReadinessResponse, readiness};
use std::time::{Duration, Instant};

const PING_TIMEOUT: Duration = Duration::from_secs(2);
const SLOW_PING: Duration = Duration::from_millis(500);

/// Readiness check endpoint.
///
/// # Status Codes
///
/// - 200 OK: the entity store answered (slow answers report `degraded`)
/// - 503 Service Unavailable: the store failed or did not answer in time
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/ready
/// # {"status":"healthy","checks":[{"component":"entity_store","status":"healthy"}]}
/// ```
pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let started = Instant::now();
    let ping = tokio::time::timeout(PING_TIMEOUT, state.services.store().ping()).await;

    let check = match ping {
        Ok(Ok(())) if started.elapsed() > SLOW_PING => HealthCheck::degraded(
            "entity_store",
            format!("ping took {}ms", started.elapsed().as_millis()),
        ),
        Ok(Ok(())) => HealthCheck::healthy("entity_store"),
        Ok(Err(error)) => HealthCheck::unhealthy("entity_store", error.to_string()),
        Err(_elapsed) => HealthCheck::unhealthy("entity_store", "ping timed out"),
    };

    readiness(HealthReport::new(vec![check]))
}

/// Prometheus metrics in text format; 404 when no recorder is installed.
#[allow(clippy::unused_async)]
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(recorder) => (StatusCode::OK, recorder.render()),
        None => (StatusCode::NOT_FOUND, "metrics are not enabled".to_string()),
    }
}
