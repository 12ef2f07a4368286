//! Inquiry endpoints.
//!
//! - POST /api/inquiries - Submit an inquiry
//! - GET /api/inquiries - List inquiries (`?status=&view=active|archived`)
//! - GET /api/inquiries/:id - Get one inquiry
//! - PUT /api/inquiries/:id/status - Approve, reject or complete
//! - POST /api/inquiries/:id/reply - Answer an active inquiry
//! - PUT /api/inquiries/:id/archive - Archive a rejected or completed inquiry
//! - PUT /api/inquiries/:id/restore - Restore an archived inquiry
//! - POST /api/inquiries/bulk-archive-completed - Archive every completed inquiry

use super::dto::{
    BulkArchiveResponse, ListQuery, ReplyBody, RequestSummary, StatusUpdateBody, SubmitBody,
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

const KIND: RequestKind = RequestKind::Inquiry;

/// Submit an inquiry.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/inquiries \
///   -H "Content-Type: application/json" \
///   -d '{"subjectId": "2024-0001", "message": "When is the Form 138 released?"}'
/// ```
pub async fn submit_inquiry(
    State(state): State<AppState>,
    Json(body): Json<SubmitBody>,
) -> WebResult<(StatusCode, Json<RequestSummary>)> {
    let created = records::submit(&state.services, KIND, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// List inquiries.
pub async fn list_inquiries(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> WebResult<Json<Vec<RequestSummary>>> {
    Ok(Json(records::list(&state.services, KIND, query).await?))
}

/// Get one inquiry.
pub async fn get_inquiry(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
) -> WebResult<Json<RequestSummary>> {
    let inquiry = records::get(&state.services, KIND, id).await?;
    Ok(Json(inquiry.into()))
}

/// Change an inquiry's status. Completing it archives it.
pub async fn update_inquiry_status(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
    Actor(actor): Actor,
    Json(body): Json<StatusUpdateBody>,
) -> WebResult<Json<RequestSummary>> {
    let updated =
        records::update_status(&state.services, KIND, id, body, ActorId::new(actor)).await?;
    Ok(Json(updated))
}

/// Append a staff reply.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/inquiries/6f1c.../reply \
///   -H "X-Actor-Id: registrar" \
///   -H "Content-Type: application/json" \
///   -d '{"message": "Released every Friday at the registrar window"}'
/// ```
pub async fn reply_to_inquiry(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
    Actor(actor): Actor,
    Json(body): Json<ReplyBody>,
) -> WebResult<Json<RequestSummary>> {
    let replied =
        records::reply(&state.services, KIND, id, body.message, ActorId::new(actor)).await?;
    Ok(Json(replied))
}

/// Archive an inquiry.
pub async fn archive_inquiry(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
    Actor(actor): Actor,
) -> WebResult<Json<RequestSummary>> {
    let archived = records::archive(&state.services, KIND, id, ActorId::new(actor)).await?;
    Ok(Json(archived))
}

/// Restore an archived inquiry.
pub async fn restore_inquiry(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
) -> WebResult<Json<RequestSummary>> {
    Ok(Json(records::restore(&state.services, KIND, id).await?))
}

/// Archive every active completed inquiry.
pub async fn bulk_archive_inquiries(
    State(state): State<AppState>,
    Actor(actor): Actor,
) -> WebResult<Json<BulkArchiveResponse>> {
    let archived =
        records::bulk_archive_completed(&state.services, KIND, ActorId::new(actor)).await?;
    Ok(Json(archived))
}
