//! Request and response bodies.
//!
//! Field names are camelCase on the wire.

use crate::grade::GradeLevel;
use crate::qr::Verification;
use crate::types::{
    ActorId, ArchiveView, NewRequest, Reply, Request, RequestId, RequestKind, RequestStatus,
    SectionId, SubjectId,
};
use chrono::{DateTime, Utc};
use records_core::version::Version;
use serde::{Deserialize, Serialize};

/// A request, enrollment or inquiry as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    /// Record id
    pub id: RequestId,
    /// Student the record belongs to
    pub subject_id: SubjectId,
    /// Document request, enrollment or inquiry
    pub kind: RequestKind,
    /// Lifecycle status
    pub status: RequestStatus,
    /// The student's question (inquiries only)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    /// Staff answers, oldest first
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub replies: Vec<Reply>,
    /// Requested document (documents only)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub document_type: Option<String>,
    /// Why the document is needed
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub purpose: Option<String>,
    /// Normalized grade level (enrollments only)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub grade_level: Option<GradeLevel>,
    /// Assigned section name, once enrolled
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub section: Option<String>,
    /// Reason given on rejection
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rejection_reason: Option<String>,
    /// Reviewer's notes
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub review_notes: Option<String>,
    /// Who reviewed the record
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reviewed_by: Option<ActorId>,
    /// When the record was reviewed
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reviewed_at: Option<DateTime<Utc>>,
    /// When the request was completed
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Who collected the document
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub picked_up_by: Option<String>,
    /// Whether the record is in the archived view
    pub is_archived: bool,
    /// When the record was archived
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub archived_at: Option<DateTime<Utc>>,
    /// Who archived the record
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub archived_by: Option<ActorId>,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Last change
    pub updated_at: DateTime<Utc>,
    /// Version to send back as `expectedVersion`
    pub version: Version,
}

impl From<Request> for RequestSummary {
    fn from(request: Request) -> Self {
        let (review_notes, reviewed_by, reviewed_at) = match request.review {
            Some(review) => (review.notes, Some(review.by), Some(review.at)),
            None => (None, None, None),
        };
        let (archived_at, archived_by) = match request.archive {
            Some(stamp) => (Some(stamp.at), Some(stamp.by)),
            None => (None, None),
        };

        Self {
            id: request.id,
            subject_id: request.subject,
            kind: request.kind,
            status: request.status,
            message: request.message,
            replies: request.replies,
            document_type: request.document_type,
            purpose: request.purpose,
            grade_level: request.grade_level,
            section: request.section,
            rejection_reason: request.rejection_reason,
            review_notes,
            reviewed_by,
            reviewed_at,
            completed_at: request.completed_at,
            picked_up_by: request.picked_up_by,
            is_archived: archived_at.is_some(),
            archived_at,
            archived_by,
            created_at: request.created_at,
            updated_at: request.updated_at,
            version: request.version,
        }
    }
}

/// Convert a list of records.
pub fn summaries(requests: Vec<Request>) -> Vec<RequestSummary> {
    requests.into_iter().map(RequestSummary::from).collect()
}

/// Body of `POST /requests`, `POST /enrollments` and `POST /inquiries`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
    /// Student the record is for
    pub subject_id: SubjectId,
    /// The question (inquiries)
    #[serde(default)]
    pub message: Option<String>,
    /// Requested document (document requests)
    #[serde(default)]
    pub document_type: Option<String>,
    /// Why the document is needed
    #[serde(default)]
    pub purpose: Option<String>,
    /// Grade level as entered (enrollments)
    #[serde(default)]
    pub grade_level: Option<String>,
}

impl SubmitBody {
    /// The submission for `kind`
    #[must_use]
    pub fn into_new_request(self, kind: RequestKind) -> NewRequest {
        NewRequest {
            subject: self.subject_id,
            kind,
            message: self.message,
            document_type: self.document_type,
            purpose: self.purpose,
            grade_level: self.grade_level,
        }
    }
}

/// Query of the list endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ListQuery {
    /// Only this status
    #[serde(default)]
    pub status: Option<RequestStatus>,
    /// `active` (default) or `archived`
    #[serde(default)]
    pub view: Option<ArchiveView>,
}

/// Body of `PUT /{requests|enrollments|inquiries}/{id}/status`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateBody {
    /// Target status
    pub status: RequestStatus,
    /// Required when rejecting
    #[serde(default)]
    pub rejection_reason: Option<String>,
    /// Optional reviewer notes
    #[serde(default)]
    pub review_notes: Option<String>,
    /// Section to enroll into, when `status` is `enrolled`
    #[serde(default)]
    pub section_id: Option<SectionId>,
    /// Version the caller last read
    pub expected_version: Version,
}

/// Body of `PUT /enrollments/{id}/section`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignSectionBody {
    /// Target section
    pub section_id: SectionId,
    /// Version the caller last read
    pub expected_version: Version,
}

/// Body of `POST /inquiries/{id}/reply`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyBody {
    /// Answer text
    pub message: String,
}

/// Response of the bulk archive endpoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkArchiveResponse {
    /// Records archived by this call
    pub archived_count: usize,
}

/// Body of `POST /requests/{id}/pickup`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupBody {
    /// Who collected the document
    pub picked_up_by: String,
    /// Version the caller last read
    pub expected_version: Version,
}

/// Body of `POST /qr/verify`.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyBody {
    /// Scanned payload text
    pub payload: String,
}

/// Response of `POST /qr/verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Always `true`; failures are error responses
    pub success: bool,
    /// Checked without the entity store
    pub is_offline: bool,
    /// The request, when verified online
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request: Option<RequestSummary>,
}

impl From<Verification> for VerifyResponse {
    fn from(verification: Verification) -> Self {
        Self {
            success: true,
            is_offline: verification.is_offline,
            request: verification.request.map(RequestSummary::from),
        }
    }
}

/// Body of `POST /qr/decode`.
#[derive(Debug, Clone, Deserialize)]
pub struct DecodeBody {
    /// Base64 PNG or JPEG, optionally as a `data:` URL
    pub image: String,
}

/// Response of `POST /qr/decode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeResponse {
    /// Payload text read from the image
    pub payload: String,
}
