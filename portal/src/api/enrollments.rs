//! Enrollment endpoints.
//!
//! - POST /api/enrollments - Submit an enrollment
//! - GET /api/enrollments - List enrollments (`?status=&view=active|archived`)
//! - GET /api/enrollments/:id - Get one enrollment
//! - PUT /api/enrollments/:id/status - Approve, reject, or enroll (with `sectionId`)
//! - PUT /api/enrollments/:id/section - Assign a section
//! - PUT /api/enrollments/:id/archive - Archive a rejected or enrolled record
//! - PUT /api/enrollments/:id/restore - Restore an archived record
//! - POST /api/enrollments/bulk-archive-completed - Archive every enrolled record

use super::dto::{
    AssignSectionBody, BulkArchiveResponse, ListQuery, RequestSummary, StatusUpdateBody,
    SubmitBody,
};
use super::records;
use crate::server::state::AppState;
use crate::types::{ActorId, RequestId, RequestKind};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use records_web::{Actor, WebResult};

const KIND: RequestKind = RequestKind::Enrollment;

/// Submit an enrollment.
///
/// The grade level is normalized, so `"7"` is stored as `"Grade 7"`.
pub async fn submit_enrollment(
    State(state): State<AppState>,
    Json(body): Json<SubmitBody>,
) -> WebResult<(StatusCode, Json<RequestSummary>)> {
    let created = records::submit(&state.services, KIND, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// List enrollments.
pub async fn list_enrollments(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> WebResult<Json<Vec<RequestSummary>>> {
    Ok(Json(records::list(&state.services, KIND, query).await?))
}

/// Get one enrollment.
pub async fn get_enrollment(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
) -> WebResult<Json<RequestSummary>> {
    let enrollment = records::get(&state.services, KIND, id).await?;
    Ok(Json(enrollment.into()))
}

/// Change an enrollment's status.
///
/// `completed` is refused for enrollments; they finish by section assignment.
pub async fn update_enrollment_status(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
    Actor(actor): Actor,
    Json(body): Json<StatusUpdateBody>,
) -> WebResult<Json<RequestSummary>> {
    let updated =
        records::update_status(&state.services, KIND, id, body, ActorId::new(actor)).await?;
    Ok(Json(updated))
}

/// Assign an approved enrollment to a section.
///
/// # Example
///
/// ```bash
/// curl -X PUT http://localhost:8080/api/enrollments/6f1c.../section \
///   -H "Content-Type: application/json" \
///   -d '{"sectionId": "0b9e...", "expectedVersion": 2}'
/// # 409 {"code":"CAPACITY_EXCEEDED", ...} when the section is full
/// ```
pub async fn assign_section(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
    Actor(actor): Actor,
    Json(body): Json<AssignSectionBody>,
) -> WebResult<Json<RequestSummary>> {
    records::get(&state.services, KIND, id).await?;
    let enrolled = state
        .services
        .sections
        .assign_section(id, body.section_id, body.expected_version, ActorId::new(actor))
        .await?;
    Ok(Json(enrolled.into()))
}

/// Archive an enrollment.
pub async fn archive_enrollment(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
    Actor(actor): Actor,
) -> WebResult<Json<RequestSummary>> {
    let archived = records::archive(&state.services, KIND, id, ActorId::new(actor)).await?;
    Ok(Json(archived))
}

/// Restore an archived enrollment.
pub async fn restore_enrollment(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
) -> WebResult<Json<RequestSummary>> {
    Ok(Json(records::restore(&state.services, KIND, id).await?))
}

/// Archive every active enrolled record.
pub async fn bulk_archive_enrollments(
    State(state): State<AppState>,
    Actor(actor): Actor,
) -> WebResult<Json<BulkArchiveResponse>> {
    let archived =
        records::bulk_archive_completed(&state.services, KIND, ActorId::new(actor)).await?;
    Ok(Json(archived))
}
