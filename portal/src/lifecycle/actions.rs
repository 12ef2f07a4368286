//! Lifecycle state and actions.

use crate::error::PortalError;
use crate::types::{ActorId, NewRequest, Request, RequestId, Section};
use records_core::version::Version;

/// State owned by the lifecycle reducer: one request record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LifecycleState {
    /// The record, `None` before submission
    pub request: Option<Request>,
    /// Why the last command was refused; cleared by the next command
    pub last_error: Option<PortalError>,
}

impl LifecycleState {
    /// State for a record that does not exist yet.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// State for an existing record.
    #[must_use]
    pub const fn loaded(request: Request) -> Self {
        Self {
            request: Some(request),
            last_error: None,
        }
    }
}

/// Everything the lifecycle reducer accepts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Create the record in `pending`
    Submit {
        /// Id for the new record
        id: RequestId,
        /// Submission payload
        new: NewRequest,
    },

    /// `pending → approved`
    Approve {
        /// Version the reviewer saw
        expected_version: Version,
        /// Optional review notes
        notes: Option<String>,
        /// Reviewing staff member
        reviewer: ActorId,
    },

    /// `pending → rejected`
    Reject {
        /// Version the reviewer saw
        expected_version: Version,
        /// Reason shown to the student; must not be blank
        reason: String,
        /// Optional review notes
        notes: Option<String>,
        /// Reviewing staff member
        reviewer: ActorId,
    },

    /// `approved → completed`, archiving in the same mutation (documents and
    /// inquiries)
    Complete {
        /// Version the staff member saw
        expected_version: Version,
        /// Staff member handing over the document
        actor: ActorId,
    },

    /// `approved → enrolled` into `section` (enrollments only)
    ///
    /// Capacity is not checked here: the store rechecks it under the
    /// section's serialization point when the result is written.
    AssignSection {
        /// Version the staff member saw
        expected_version: Version,
        /// Target section
        section: Section,
        /// Staff member making the assignment
        actor: ActorId,
    },

    /// Record who collected the document and complete the request
    RecordPickup {
        /// Version the staff member saw
        expected_version: Version,
        /// Person collecting the document
        picked_up_by: String,
        /// Staff member at the counter
        actor: ActorId,
    },

    /// Append a staff answer to an active inquiry; the status is unchanged
    Reply {
        /// Answer text; must not be blank
        message: String,
        /// Answering staff member
        actor: ActorId,
    },

    /// Move a terminal record into the archived view
    Archive {
        /// Staff member (or sweep job) archiving
        actor: ActorId,
    },

    /// Move an archived record back into the active view
    Restore,

    /// Feedback: a status notification was delivered
    NotificationSent {
        /// Request the notice was about
        request_id: RequestId,
    },

    /// Feedback: a status notification could not be delivered
    NotificationFailed {
        /// Request the notice was about
        request_id: RequestId,
        /// Delivery error
        error: String,
    },
}

impl LifecycleAction {
    /// Short name used in logs and metric labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Submit { .. } => "submit",
            Self::Approve { .. } => "approve",
            Self::Reject { .. } => "reject",
            Self::Complete { .. } => "complete",
            Self::AssignSection { .. } => "assign_section",
            Self::RecordPickup { .. } => "record_pickup",
            Self::Reply { .. } => "reply",
            Self::Archive { .. } => "archive",
            Self::Restore => "restore",
            Self::NotificationSent { .. } => "notification_sent",
            Self::NotificationFailed { .. } => "notification_failed",
        }
    }

    /// Version the caller expects the record to be at, for commands that
    /// carry one.
    #[must_use]
    pub const fn expected_version(&self) -> Option<Version> {
        match self {
            Self::Approve { expected_version, .. }
            | Self::Reject { expected_version, .. }
            | Self::Complete { expected_version, .. }
            | Self::AssignSection { expected_version, .. }
            | Self::RecordPickup { expected_version, .. } => Some(*expected_version),
            _ => None,
        }
    }

    /// Whether this is effect feedback rather than a command.
    #[must_use]
    pub const fn is_feedback(&self) -> bool {
        matches!(
            self,
            Self::NotificationSent { .. } | Self::NotificationFailed { .. }
        )
    }
}
