//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use axum::{Json, http::StatusCode};
use records_runtime::{HealthReport, HealthStatus};
use serde::Serialize;

/// Liveness response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the process answers
    pub status: &'static str,
    /// Crate version serving the request
    pub version: &'static str,
}

/// Simple health check endpoint (for basic liveness).
///
/// Does NOT check dependencies such as the entity store.
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// One component's line in a readiness response.
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    /// Component name
    pub component: String,
    /// `healthy`, `degraded` or `unhealthy`
    pub status: String,
    /// Detail for non-healthy components
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Readiness response body.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// Overall status (worst component)
    pub status: String,
    /// Per-component results
    pub checks: Vec<ComponentStatus>,
}

/// Render a [`HealthReport`] as a readiness response.
///
/// # Status Codes
///
/// - 200 OK: Healthy or Degraded
/// - 503 Service Unavailable: Unhealthy
#[must_use]
pub fn readiness(report: HealthReport) -> (StatusCode, Json<ReadinessResponse>) {
    let code = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    let checks = report
        .checks
        .into_iter()
        .map(|check| ComponentStatus {
            component: check.component,
            status: check.status.to_string(),
            message: check.message,
        })
        .collect();

    (
        code,
        Json(ReadinessResponse {
            status: report.status.to_string(),
            checks,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use records_runtime::HealthCheck;

    #[tokio::test]
    async fn liveness_reports_version() {
        let (status, Json(body)) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert!(!body.version.is_empty());
    }

    #[test]
    fn unhealthy_component_is_unavailable() {
        let report = HealthReport::new(vec![
            HealthCheck::healthy("http"),
            HealthCheck::unhealthy("entity_store", "connection refused"),
        ]);

        let (status, Json(body)) = readiness(report);

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "unhealthy");
        assert_eq!(body.checks.len(), 2);
        assert_eq!(body.checks[1].message.as_deref(), Some("connection refused"));
    }

    #[test]
    fn degraded_is_still_ready() {
        let report = HealthReport::new(vec![HealthCheck::degraded("entity_store", "slow")]);
        let (status, _) = readiness(report);
        assert_eq!(status, StatusCode::OK);
    }
}
