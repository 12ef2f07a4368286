//! Pickup token endpoints.
//!
//! - POST /api/requests/:id/pickup-token - Issue a pickup QR code
//! - POST /api/qr/verify - Verify a scanned payload
//! - POST /api/qr/decode - Read a payload from an uploaded image
//! - POST /api/requests/:id/pickup - Record the pickup after verification

use super::dto::{DecodeBody, DecodeResponse, PickupBody, RequestSummary, VerifyBody, VerifyResponse};
use crate::qr::capture::{CaptureFlow, StillImageDevice};
use crate::qr::image::data_url_bytes;
use crate::qr::IssuedToken;
use crate::server::state::AppState;
use crate::types::{ActorId, RequestId};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use records_web::{Actor, WebResult};
use std::sync::Arc;
use std::time::Duration;

const DECODE_TIMEOUT: Duration = Duration::from_secs(10);

/// Issue a pickup token for an approved document request.
///
/// Re-issuing replaces a token that has not been verified yet.
pub async fn issue_pickup_token(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
) -> WebResult<(StatusCode, Json<IssuedToken>)> {
    let issued = state.services.qr.issue(id).await?;
    Ok((StatusCode::CREATED, Json(issued)))
}

/// Verify a scanned pickup payload.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/qr/verify \
///   -H "Content-Type: application/json" \
///   -d '{"payload": "{\"type\":\"pickup_verification\", ...}"}'
/// # {"success":true,"isOffline":false,"request":{...}}
/// ```
pub async fn verify_token(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(body): Json<VerifyBody>,
) -> WebResult<Json<VerifyResponse>> {
    let verification = state
        .services
        .qr
        .verify(&body.payload, ActorId::new(actor))
        .await?;
    Ok(Json(verification.into()))
}

/// Decode a QR payload from a base64 PNG or JPEG.
///
/// The upload is run through the capture flow as a still frame.
pub async fn decode_image(
    State(_state): State<AppState>,
    Json(body): Json<DecodeBody>,
) -> WebResult<Json<DecodeResponse>> {
    let frame = data_url_bytes(&body.image)?;
    let flow = CaptureFlow::new(Arc::new(StillImageDevice::new(frame)), DECODE_TIMEOUT);

    let payload = flow.scan().await;
    flow.shutdown().await?;
    Ok(Json(DecodeResponse { payload: payload? }))
}

/// Record who collected a document after an online verification.
pub async fn confirm_pickup(
    State(state): State<AppState>,
    Path(id): Path<RequestId>,
    Actor(actor): Actor,
    Json(body): Json<PickupBody>,
) -> WebResult<Json<RequestSummary>> {
    let completed = state
        .services
        .qr
        .confirm_pickup(id, body.picked_up_by, body.expected_version, ActorId::new(actor))
        .await?;
    Ok(Json(completed.into()))
}
