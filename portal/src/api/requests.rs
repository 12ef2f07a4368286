//! Document request endpoints.
//!
//! - POST /api/requests - Submit a document request
//! - GET /api/requests - List requests (`?status=&view=active|archived`)
//! - GET /api/requests/:id - Get one request
//! - PUT /api/requests/:id/status - Approve, reject or complete
//! - PUT /api/requests/:id/archive - Archive a rejected or completed request
//! - PUT /api/requests/:id/restore - Restore an archived request
//! - POST /api/requests/bulk-archive-completed - Archive every completed request

use super::dto::{BulkArchiveResponse, ListQuery, RequestSummary, StatusUpdateBody, SubmitBody};
use super::records;
use crate::server::state::AppState;
use crate::types::{ActorId, RequestId, RequestKind};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use records_web::{Actor, WebResult};

const KIND: RequestKind = RequestKind::Document;

/// Submit a document request.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/requests \
///   -H "Content-Type: application/json" \
///   -d '{"subjectId": "2024-0001", "documentType": "Form 137", "purpose": "Transfer"}'
/// ```
pub async fn submit_request(
    State(state): State<AppState>,
    Json(body): Json<SubmitBody>,
) -> WebResult<(StatusCode, Json<RequestSummary>)> {
    let created = records::submit(&state.services, KIND, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// List document requests, newest first (archived view: most recently archived first).
pub async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> WebResult<Json<Vec<RequestSummary>>> {
    Ok(Json(records::list(&state.services, KIND, query).await?))
}

/// Get one document request.
pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
) -> WebResult<Json<RequestSummary>> {
    let request = records::get(&state.services, KIND, id).await?;
    Ok(Json(request.into()))
}

/// Change a document request's status.
///
/// # Example
///
/// ```bash
/// curl -X PUT http://localhost:8080/api/requests/6f1c.../status \
///   -H "X-Actor-Id: registrar" \
///   -H "Content-Type: application/json" \
///   -d '{"status": "rejected", "rejectionReason": "Missing Form 137", "expectedVersion": 1}'
/// ```
pub async fn update_request_status(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
    Actor(actor): Actor,
    Json(body): Json<StatusUpdateBody>,
) -> WebResult<Json<RequestSummary>> {
    let updated =
        records::update_status(&state.services, KIND, id, body, ActorId::new(actor)).await?;
    Ok(Json(updated))
}

/// Archive a document request.
pub async fn archive_request(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
    Actor(actor): Actor,
) -> WebResult<Json<RequestSummary>> {
    let archived = records::archive(&state.services, KIND, id, ActorId::new(actor)).await?;
    Ok(Json(archived))
}

/// Restore an archived document request.
pub async fn restore_request(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
) -> WebResult<Json<RequestSummary>> {
    Ok(Json(records::restore(&state.services, KIND, id).await?))
}

/// Archive every active completed document request.
pub async fn bulk_archive_requests(
    State(state): State<AppState>,
    Actor(actor): Actor,
) -> WebResult<Json<BulkArchiveResponse>> {
    let archived =
        records::bulk_archive_completed(&state.services, KIND, ActorId::new(actor)).await?;
    Ok(Json(archived))
}
