//! Operations shared by the document request, enrollment and inquiry routes.
//!
//! Every route family addresses the same records; a record of another kind
//! is reported as not found.

use super::dto::{
    BulkArchiveResponse, ListQuery, RequestSummary, StatusUpdateBody, SubmitBody, summaries,
};
use crate::app::PortalServices;
use crate::error::{PortalError, Result};
use crate::types::{ActorId, Request, RequestFilter, RequestId, RequestKind, RequestStatus};

pub(super) async fn submit(
    services: &PortalServices,
    kind: RequestKind,
    body: SubmitBody,
) -> Result<RequestSummary> {
    let request = services
        .lifecycle
        .submit(body.into_new_request(kind))
        .await?;
    Ok(request.into())
}

pub(super) async fn list(
    services: &PortalServices,
    kind: RequestKind,
    query: ListQuery,
) -> Result<Vec<RequestSummary>> {
    let filter = RequestFilter {
        kind,
        status: query.status,
        view: query.view.unwrap_or_default(),
    };
    Ok(summaries(services.lifecycle.list(filter).await?))
}

pub(super) async fn get(
    services: &PortalServices,
    kind: RequestKind,
    id: RequestId,
) -> Result<Request> {
    let request = services.lifecycle.get(id).await?;
    if request.kind == kind {
        Ok(request)
    } else {
        Err(PortalError::NotFound {
            resource: resource(kind),
            id: id.to_string(),
        })
    }
}

/// Dispatch a status change on the requested target status.
pub(super) async fn update_status(
    services: &PortalServices,
    kind: RequestKind,
    id: RequestId,
    body: StatusUpdateBody,
    actor: ActorId,
) -> Result<RequestSummary> {
    get(services, kind, id).await?;
    let lifecycle = &services.lifecycle;

    let updated = match body.status {
        RequestStatus::Approved => {
            lifecycle
                .approve(id, body.expected_version, actor, body.review_notes)
                .await?
        },
        RequestStatus::Rejected => {
            lifecycle
                .reject(
                    id,
                    body.expected_version,
                    body.rejection_reason.unwrap_or_default(),
                    actor,
                    body.review_notes,
                )
                .await?
        },
        RequestStatus::Completed => lifecycle.complete(id, body.expected_version, actor).await?,
        RequestStatus::Enrolled => {
            let section_id = body
                .section_id
                .ok_or_else(|| PortalError::validation("sectionId is required to enroll"))?;
            services
                .sections
                .assign_section(id, section_id, body.expected_version, actor)
                .await?
        },
        RequestStatus::Pending => {
            return Err(PortalError::invalid(format!(
                "request {id} cannot return to pending"
            )));
        },
    };
    Ok(updated.into())
}

pub(super) async fn archive(
    services: &PortalServices,
    kind: RequestKind,
    id: RequestId,
    actor: ActorId,
) -> Result<RequestSummary> {
    get(services, kind, id).await?;
    Ok(services.archive.archive(id, actor).await?.into())
}

pub(super) async fn restore(
    services: &PortalServices,
    kind: RequestKind,
    id: RequestId,
) -> Result<RequestSummary> {
    get(services, kind, id).await?;
    Ok(services.archive.restore(id).await?.into())
}

pub(super) async fn reply(
    services: &PortalServices,
    kind: RequestKind,
    id: RequestId,
    message: String,
    actor: ActorId,
) -> Result<RequestSummary> {
    get(services, kind, id).await?;
    Ok(services.lifecycle.reply(id, message, actor).await?.into())
}

pub(super) async fn bulk_archive_completed(
    services: &PortalServices,
    kind: RequestKind,
    actor: ActorId,
) -> Result<BulkArchiveResponse> {
    let archived_count = services.archive.bulk_archive_completed(kind, actor).await?;
    Ok(BulkArchiveResponse { archived_count })
}

const fn resource(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Document => "Request",
        RequestKind::Enrollment => "Enrollment",
        RequestKind::Inquiry => "Inquiry",
    }
}
