//! Router configuration for the records portal.

use super::health::{metrics, readiness_check};
use super::state::AppState;
use crate::api::{enrollments, inquiries, qr, requests, sections};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use records_web::correlation_id_layer;
use records_web::handlers::health_check;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

/// Uploaded QR images arrive base64-encoded in JSON bodies.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Build the complete Axum router.
///
/// API routes live under `/api`; `/health`, `/ready` and `/metrics` sit at
/// the root. Every request passes through the correlation-id layer.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Document requests
        .route(
            "/requests",
            post(requests::submit_request).get(requests::list_requests),
        )
        .route(
            "/requests/bulk-archive-completed",
            post(requests::bulk_archive_requests),
        )
        .route("/requests/:id", get(requests::get_request))
        .route("/requests/:id/status", put(requests::update_request_status))
        .route("/requests/:id/archive", put(requests::archive_request))
        .route("/requests/:id/restore", put(requests::restore_request))
        // Pickup
        .route("/requests/:id/pickup-token", post(qr::issue_pickup_token))
        .route("/requests/:id/pickup", post(qr::confirm_pickup))
        .route("/qr/verify", post(qr::verify_token))
        .route("/qr/decode", post(qr::decode_image))
        // Enrollments
        .route(
            "/enrollments",
            post(enrollments::submit_enrollment).get(enrollments::list_enrollments),
        )
        .route(
            "/enrollments/bulk-archive-completed",
            post(enrollments::bulk_archive_enrollments),
        )
        .route("/enrollments/:id", get(enrollments::get_enrollment))
        .route(
            "/enrollments/:id/status",
            put(enrollments::update_enrollment_status),
        )
        .route("/enrollments/:id/section", put(enrollments::assign_section))
        .route("/enrollments/:id/archive", put(enrollments::archive_enrollment))
        .route("/enrollments/:id/restore", put(enrollments::restore_enrollment))
        // Inquiries
        .route(
            "/inquiries",
            post(inquiries::submit_inquiry).get(inquiries::list_inquiries),
        )
        .route(
            "/inquiries/bulk-archive-completed",
            post(inquiries::bulk_archive_inquiries),
        )
        .route("/inquiries/:id", get(inquiries::get_inquiry))
        .route("/inquiries/:id/status", put(inquiries::update_inquiry_status))
        .route("/inquiries/:id/reply", post(inquiries::reply_to_inquiry))
        .route("/inquiries/:id/archive", put(inquiries::archive_inquiry))
        .route("/inquiries/:id/restore", put(inquiries::restore_inquiry))
        // Sections
        .route(
            "/sections",
            post(sections::create_section).get(sections::list_sections),
        )
        .route("/sections/grade/:level", get(sections::sections_for_grade))
        .route("/sections/:id/roster", get(sections::section_roster));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics))
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(correlation_id_layer())
        .with_state(state)
}
