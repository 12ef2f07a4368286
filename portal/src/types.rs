//! Domain types for the records portal.
//!
//! A single [`Request`] record models document requests, enrollment
//! applications and student inquiries; [`RequestKind`] tells them apart. Archiving is not a status:
//! a record is in the archived view exactly when it carries an
//! [`ArchiveStamp`], and it keeps the status it had when it was archived.

use crate::grade::GradeLevel;
use chrono::{DateTime, Utc};
use records_core::version::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Capacity given to sections created without an explicit capacity.
pub const DEFAULT_SECTION_CAPACITY: u32 = 40;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a request or enrollment application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new random `RequestId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a `RequestId` from a UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Unique identifier for a class section.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(Uuid);

impl SectionId {
    /// Creates a new random `SectionId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a `SectionId` from a UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to the requesting student.
///
/// Student records live in another system; the portal only stores the id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    /// Creates a `SubjectId` from any string-like value
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the staff member (or system job) performing an operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Creates an `ActorId` from any string-like value
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Request kind and status
// ============================================================================

/// What a request asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// A document (transcript, certificate, Form 137, ...) to be picked up
    Document,
    /// An enrollment application that ends with a section assignment
    Enrollment,
    /// A question to the registrar, answered through staff replies
    Inquiry,
}

impl RequestKind {
    /// Lowercase wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Enrollment => "enrollment",
            Self::Inquiry => "inquiry",
        }
    }

    /// Status a request of this kind reaches when it is fulfilled
    #[must_use]
    pub const fn completed_status(self) -> RequestStatus {
        match self {
            Self::Document | Self::Inquiry => RequestStatus::Completed,
            Self::Enrollment => RequestStatus::Enrolled,
        }
    }

    /// Every kind, for sweeps that cover the whole store
    pub const ALL: [Self; 3] = [Self::Document, Self::Enrollment, Self::Inquiry];
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(Self::Document),
            "enrollment" => Ok(Self::Enrollment),
            "inquiry" => Ok(Self::Inquiry),
            other => Err(format!("unknown request kind '{other}'")),
        }
    }
}

/// Lifecycle status of a request.
///
/// ```text
/// Pending → Approved → Completed (document, inquiry) / Enrolled (enrollment)
///    ↓
/// Rejected
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Submitted, awaiting review
    Pending,
    /// Accepted by staff, awaiting fulfilment
    Approved,
    /// Declined by staff with a reason
    Rejected,
    /// Document handed over, or inquiry closed
    Completed,
    /// Student assigned to a section
    Enrolled,
}

impl RequestStatus {
    /// Lowercase wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::Enrolled => "enrolled",
        }
    }

    /// No further lifecycle transition leaves this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Enrolled)
    }

    /// Terminal because the request was fulfilled (not rejected).
    #[must_use]
    pub const fn is_terminal_complete(self) -> bool {
        matches!(self, Self::Completed | Self::Enrolled)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "completed" => Ok(Self::Completed),
            "enrolled" => Ok(Self::Enrolled),
            other => Err(format!("unknown request status '{other}'")),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// When and by whom a record was archived.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveStamp {
    /// Archive time
    pub at: DateTime<Utc>,
    /// Staff member (or sweep job) that archived the record
    pub by: ActorId,
}

/// Outcome of the last staff review (approve or reject).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    /// Optional free-text notes from the reviewer
    pub notes: Option<String>,
    /// Reviewer
    pub by: ActorId,
    /// Review time
    pub at: DateTime<Utc>,
}

/// A staff answer to an inquiry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    /// Answer text
    pub message: String,
    /// Staff member who answered
    pub by: ActorId,
    /// Answer time
    pub at: DateTime<Utc>,
}

/// A document request, enrollment application or inquiry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Unique id
    pub id: RequestId,
    /// Requesting student
    pub subject: SubjectId,
    /// Document request, enrollment application or inquiry
    pub kind: RequestKind,
    /// Lifecycle status
    pub status: RequestStatus,
    /// The student's question (inquiry kind only)
    pub message: Option<String>,
    /// Staff answers, oldest first (inquiry kind only)
    #[serde(default)]
    pub replies: Vec<Reply>,
    /// Requested document (document kind only)
    pub document_type: Option<String>,
    /// Why the document is needed
    pub purpose: Option<String>,
    /// Normalized grade level (enrollment kind only)
    pub grade_level: Option<GradeLevel>,
    /// Assigned section name (enrollment kind, once enrolled)
    pub section: Option<String>,
    /// Present exactly when `status == Rejected`
    pub rejection_reason: Option<String>,
    /// Last approve/reject review
    pub review: Option<Review>,
    /// When the request reached `Completed`/`Enrolled`
    pub completed_at: Option<DateTime<Utc>>,
    /// Person who collected the document
    pub picked_up_by: Option<String>,
    /// Set exactly when the record is in the archived view
    pub archive: Option<ArchiveStamp>,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Time of the last mutation
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version
    pub version: Version,
}

impl Request {
    /// Whether the record is in the archived view
    #[must_use]
    pub const fn is_archived(&self) -> bool {
        self.archive.is_some()
    }

    /// Archive time, if archived
    #[must_use]
    pub fn archived_at(&self) -> Option<DateTime<Utc>> {
        self.archive.as_ref().map(|a| a.at)
    }

    /// Archiving actor, if archived
    #[must_use]
    pub fn archived_by(&self) -> Option<&ActorId> {
        self.archive.as_ref().map(|a| &a.by)
    }

    /// Whether this record counts towards `section`'s enrolled total.
    #[must_use]
    pub fn occupies(&self, section: &Section) -> bool {
        self.kind == RequestKind::Enrollment
            && self.status == RequestStatus::Enrolled
            && !self.is_archived()
            && self.section.as_deref() == Some(section.name.as_str())
            && self.grade_level.as_ref() == Some(&section.grade_level)
    }
}

/// Submission payload for a new request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    /// Requesting student
    pub subject: SubjectId,
    /// Document request, enrollment application or inquiry
    pub kind: RequestKind,
    /// The question (required for inquiries)
    #[serde(default)]
    pub message: Option<String>,
    /// Requested document (required for documents)
    #[serde(default)]
    pub document_type: Option<String>,
    /// Why the document is needed
    #[serde(default)]
    pub purpose: Option<String>,
    /// Raw grade level as entered (required for enrollments)
    #[serde(default)]
    pub grade_level: Option<String>,
}

/// A class section students are enrolled into.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// Unique id
    pub id: SectionId,
    /// Section name, unique within a grade
    pub name: String,
    /// Normalized grade level
    pub grade_level: GradeLevel,
    /// Class adviser
    pub adviser: Option<String>,
    /// Maximum number of enrolled students
    pub capacity: u32,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Input for creating a section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSection {
    /// Section name
    pub name: String,
    /// Raw grade level as entered
    pub grade_level: String,
    /// Adviser name
    #[serde(default)]
    pub adviser: Option<String>,
    /// Capacity, [`DEFAULT_SECTION_CAPACITY`] when omitted
    #[serde(default)]
    pub capacity: Option<u32>,
}

/// A section together with its live enrolled count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionWithCount {
    /// The section
    #[serde(flatten)]
    pub section: Section,
    /// Enrolled, non-archived requests currently in the section
    pub enrolled_count: u32,
}

impl SectionWithCount {
    /// Seats left before the section is full
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.section.capacity.saturating_sub(self.enrolled_count)
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Which side of the archive a listing shows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveView {
    /// Records that are not archived, newest submission first
    #[default]
    Active,
    /// Archived records, most recently archived first
    Archived,
}

/// Listing filter for requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestFilter {
    /// Kind to list
    pub kind: RequestKind,
    /// Only this status, if set
    pub status: Option<RequestStatus>,
    /// Active or archived view
    pub view: ArchiveView,
}

impl RequestFilter {
    /// Active records of `kind`, any status
    #[must_use]
    pub const fn active(kind: RequestKind) -> Self {
        Self {
            kind,
            status: None,
            view: ArchiveView::Active,
        }
    }

    /// Whether `request` passes this filter
    #[must_use]
    pub fn matches(&self, request: &Request) -> bool {
        request.kind == self.kind
            && self.status.is_none_or(|s| s == request.status)
            && match self.view {
                ArchiveView::Active => !request.is_archived(),
                ArchiveView::Archived => request.is_archived(),
            }
    }

    /// Sort `requests` into this view's order.
    pub fn sort(&self, requests: &mut [Request]) {
        match self.view {
            ArchiveView::Active => requests.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            ArchiveView::Archived => requests.sort_by(|a, b| b.archived_at().cmp(&a.archived_at())),
        }
    }
}

// ============================================================================
// Pickup tokens
// ============================================================================

/// Stored state of the pickup token issued for a document request.
///
/// `issued → verified` is one-way; a verified record is never reset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupTokenRecord {
    /// Request the token was issued for
    pub request_id: RequestId,
    /// Checksum of the current token
    pub checksum: String,
    /// Issue time (whole seconds)
    pub issued_at: DateTime<Utc>,
    /// Time of the successful online verification
    pub verified_at: Option<DateTime<Utc>>,
    /// Staff member who verified the token
    pub verified_by: Option<ActorId>,
}

impl PickupTokenRecord {
    /// Whether the token has been verified online
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn enrolled(section: &Section) -> Request {
        let now = Utc::now();
        Request {
            id: RequestId::new(),
            subject: SubjectId::new("stu-1"),
            kind: RequestKind::Enrollment,
            status: RequestStatus::Enrolled,
            message: None,
            replies: Vec::new(),
            document_type: None,
            purpose: None,
            grade_level: Some(section.grade_level.clone()),
            section: Some(section.name.clone()),
            rejection_reason: None,
            review: None,
            completed_at: Some(now),
            picked_up_by: None,
            archive: None,
            created_at: now,
            updated_at: now,
            version: Version::new(3),
        }
    }

    fn section() -> Section {
        Section {
            id: SectionId::new(),
            name: "Sampaguita".to_string(),
            grade_level: GradeLevel::parse("7").unwrap(),
            adviser: None,
            capacity: 40,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn status_terminality() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(!RequestStatus::Rejected.is_terminal_complete());
        assert!(RequestStatus::Completed.is_terminal_complete());
        assert!(RequestStatus::Enrolled.is_terminal_complete());
    }

    #[test]
    fn status_round_trips_through_wire_name() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::Completed,
            RequestStatus::Enrolled,
        ] {
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
        assert!("archived".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn every_kind_parses_and_names_its_completed_status() {
        for kind in RequestKind::ALL {
            assert_eq!(kind.as_str().parse::<RequestKind>().unwrap(), kind);
        }
        assert_eq!(RequestKind::Inquiry.completed_status(), RequestStatus::Completed);
        assert_eq!(RequestKind::Enrollment.completed_status(), RequestStatus::Enrolled);
        assert!("appeal".parse::<RequestKind>().is_err());
    }

    #[test]
    fn occupancy_requires_matching_section_and_active_enrollment() {
        let section = section();
        let mut request = enrolled(&section);
        assert!(request.occupies(&section));

        request.archive = Some(ArchiveStamp {
            at: Utc::now(),
            by: ActorId::new("Admin"),
        });
        assert!(!request.occupies(&section));

        let mut other_grade = enrolled(&section);
        other_grade.grade_level = Some(GradeLevel::parse("8").unwrap());
        assert!(!other_grade.occupies(&section));
    }

    #[test]
    fn archived_view_sorts_by_archive_time_descending() {
        let section = section();
        let mut first = enrolled(&section);
        let mut second = enrolled(&section);
        let t0 = Utc::now();
        first.archive = Some(ArchiveStamp { at: t0, by: ActorId::new("a") });
        second.archive = Some(ArchiveStamp {
            at: t0 + chrono::Duration::minutes(5),
            by: ActorId::new("a"),
        });

        let filter = RequestFilter {
            kind: RequestKind::Enrollment,
            status: None,
            view: ArchiveView::Archived,
        };
        let mut listed = vec![first.clone(), second.clone()];
        filter.sort(&mut listed);

        assert_eq!(listed[0].id, second.id);
        assert!(filter.matches(&first));
        assert!(!RequestFilter::active(RequestKind::Enrollment).matches(&first));
    }

    #[test]
    fn section_with_count_reports_remaining_seats() {
        let with_count = SectionWithCount {
            section: section(),
            enrolled_count: 39,
        };
        assert_eq!(with_count.remaining(), 1);
    }
}
