//! Lifecycle reducer: the request status state machine.
//!
//! ```text
//! pending ──approve──▶ approved ──complete──▶ completed (+ archived)   documents, inquiries
//!    │                    └──assign_section──▶ enrolled                enrollments
//!    └──reject──▶ rejected
//!
//! active inquiry ──reply──▶ same status, one more reply
//!
//! rejected | completed | enrolled ──archive──▶ archived view ──restore──▶ same status
//! ```
//!
//! Every command is applied to a copy of the record. The copy replaces the
//! state only if every check passes, so a refused command leaves the record
//! untouched and reports the reason in [`LifecycleState::last_error`]. A
//! committed command bumps the version by exactly one.

use super::actions::{LifecycleAction, LifecycleState};
use super::environment::LifecycleEnvironment;
use crate::archive::{archive_record, restore_record};
use crate::error::{PortalError, Result};
use crate::grade::GradeLevel;
use crate::notify::StatusNotice;
use crate::types::{
    ActorId, NewRequest, Reply, Request, RequestId, RequestKind, RequestStatus, Review, SubjectId,
};
use chrono::{DateTime, Utc};
use records_core::effect::Effect;
use records_core::reducer::Reducer;
use records_core::version::Version;
use records_core::{SmallVec, smallvec};
use std::sync::Arc;

/// Reducer for the request lifecycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct LifecycleReducer;

impl LifecycleReducer {
    /// Creates a new lifecycle reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn submit(
        state: &mut LifecycleState,
        id: RequestId,
        new: NewRequest,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if state.request.is_some() {
            return Err(PortalError::invalid(format!(
                "request {id} has already been submitted"
            )));
        }

        let subject = new.subject.as_str().trim();
        if subject.is_empty() {
            return Err(PortalError::validation("Student is required"));
        }

        let (document_type, grade_level, message) = match new.kind {
            RequestKind::Document => {
                let document_type = non_blank(new.document_type)
                    .ok_or_else(|| PortalError::validation("Document type is required"))?;
                (Some(document_type), None, None)
            },
            RequestKind::Enrollment => {
                let raw = new.grade_level.unwrap_or_default();
                (None, Some(GradeLevel::parse(&raw)?), None)
            },
            RequestKind::Inquiry => {
                let message = non_blank(new.message)
                    .ok_or_else(|| PortalError::validation("Inquiry message is required"))?;
                (None, None, Some(message))
            },
        };

        state.request = Some(Request {
            id,
            subject: SubjectId::new(subject),
            kind: new.kind,
            status: RequestStatus::Pending,
            message,
            replies: Vec::new(),
            document_type,
            purpose: non_blank(new.purpose),
            grade_level,
            section: None,
            rejection_reason: None,
            review: None,
            completed_at: None,
            picked_up_by: None,
            archive: None,
            created_at: now,
            updated_at: now,
            version: Version::INITIAL.next(),
        });
        Ok(())
    }

    /// Validate `action` against the current record and commit it.
    ///
    /// Returns whether the student should be notified.
    fn transition(
        state: &mut LifecycleState,
        action: LifecycleAction,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let current = state
            .request
            .as_ref()
            .ok_or_else(|| PortalError::invalid("request has not been submitted"))?;

        if let Some(expected) = action.expected_version() {
            if expected != current.version {
                return Err(PortalError::VersionConflict {
                    expected,
                    actual: current.version,
                });
            }
        }

        let mut next = current.clone();
        let notify = Self::apply(&mut next, action, now)?;
        next.version = next.version.next();
        next.updated_at = now;
        state.request = Some(next);
        Ok(notify)
    }

    fn apply(request: &mut Request, action: LifecycleAction, now: DateTime<Utc>) -> Result<bool> {
        match action {
            LifecycleAction::Approve {
                notes, reviewer, ..
            } => {
                require_status(request, RequestStatus::Pending, "approve")?;
                request.status = RequestStatus::Approved;
                request.review = Some(Review {
                    notes: non_blank(notes),
                    by: reviewer,
                    at: now,
                });
                Ok(true)
            },

            LifecycleAction::Reject {
                reason,
                notes,
                reviewer,
                ..
            } => {
                require_status(request, RequestStatus::Pending, "reject")?;
                let reason = non_blank(Some(reason))
                    .ok_or_else(|| PortalError::validation("Rejection reason is required"))?;
                request.status = RequestStatus::Rejected;
                request.rejection_reason = Some(reason);
                request.review = Some(Review {
                    notes: non_blank(notes),
                    by: reviewer,
                    at: now,
                });
                Ok(true)
            },

            LifecycleAction::Complete { actor, .. } => {
                if request.kind == RequestKind::Enrollment {
                    return Err(PortalError::invalid(format!(
                        "enrollment {} is completed by assigning a section \
                         (PUT /api/enrollments/{}/section)",
                        request.id, request.id
                    )));
                }
                require_status(request, RequestStatus::Approved, "complete")?;
                complete_document(request, &actor, now)?;
                Ok(false)
            },

            LifecycleAction::AssignSection { section, actor, .. } => {
                if request.kind != RequestKind::Enrollment {
                    return Err(PortalError::invalid(
                        "only enrollment applications are assigned to sections",
                    ));
                }
                require_status(request, RequestStatus::Approved, "assign a section to")?;
                if request.grade_level.as_ref() != Some(&section.grade_level) {
                    return Err(PortalError::validation(format!(
                        "section {} is for {}, but the enrollment is for {}",
                        section.name,
                        section.grade_level,
                        request
                            .grade_level
                            .as_ref()
                            .map_or("no grade level", GradeLevel::as_str),
                    )));
                }
                tracing::debug!(
                    request_id = %request.id,
                    section = %section.name,
                    actor = %actor,
                    "Assigning section"
                );
                request.status = RequestStatus::Enrolled;
                request.section = Some(section.name);
                request.completed_at = Some(now);
                Ok(true)
            },

            LifecycleAction::RecordPickup {
                picked_up_by,
                actor,
                ..
            } => {
                if request.kind != RequestKind::Document {
                    return Err(PortalError::invalid(
                        "only document requests are picked up",
                    ));
                }
                require_status(request, RequestStatus::Approved, "hand over")?;
                let picked_up_by = non_blank(Some(picked_up_by)).ok_or_else(|| {
                    PortalError::validation("Name of the person picking up is required")
                })?;
                request.picked_up_by = Some(picked_up_by);
                complete_document(request, &actor, now)?;
                Ok(false)
            },

            LifecycleAction::Reply { message, actor } => {
                if request.kind != RequestKind::Inquiry {
                    return Err(PortalError::invalid("only inquiries are replied to"));
                }
                if request.is_archived() {
                    return Err(PortalError::invalid(format!(
                        "inquiry {} is archived; restore it before replying",
                        request.id
                    )));
                }
                let message = non_blank(Some(message))
                    .ok_or_else(|| PortalError::validation("Reply message is required"))?;
                request.replies.push(Reply {
                    message,
                    by: actor,
                    at: now,
                });
                Ok(false)
            },

            LifecycleAction::Archive { actor } => {
                archive_record(request, &actor, now)?;
                Ok(false)
            },

            LifecycleAction::Restore => {
                restore_record(request)?;
                Ok(false)
            },

            other @ (LifecycleAction::Submit { .. }
            | LifecycleAction::NotificationSent { .. }
            | LifecycleAction::NotificationFailed { .. }) => Err(PortalError::Internal(format!(
                "{} is not a lifecycle transition",
                other.name()
            ))),
        }
    }

    fn notify_effect(env: &LifecycleEnvironment, request: &Request) -> Effect<LifecycleAction> {
        let notifier = Arc::clone(&env.notifier);
        let request_id = request.id;
        let notice = StatusNotice {
            request_id,
            subject: request.subject.clone(),
            kind: request.kind,
            status: request.status,
            rejection_reason: request.rejection_reason.clone(),
            section: request.section.clone(),
        };

        Effect::future(async move {
            match notifier.notify(notice).await {
                Ok(()) => Some(LifecycleAction::NotificationSent { request_id }),
                Err(error) => Some(LifecycleAction::NotificationFailed {
                    request_id,
                    error: error.to_string(),
                }),
            }
        })
    }

    fn observe(action: &LifecycleAction) {
        match action {
            LifecycleAction::NotificationSent { request_id } => {
                tracing::debug!(request_id = %request_id, "Status notification delivered");
            },
            LifecycleAction::NotificationFailed { request_id, error } => {
                tracing::warn!(
                    request_id = %request_id,
                    error = %error,
                    "Status notification failed; transition stays committed"
                );
                metrics::counter!("portal.notifications.failed").increment(1);
            },
            _ => {},
        }
    }
}

impl Reducer for LifecycleReducer {
    type State = LifecycleState;
    type Action = LifecycleAction;
    type Environment = LifecycleEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if action.is_feedback() {
            Self::observe(&action);
            return smallvec![Effect::None];
        }

        state.last_error = None;
        let now = env.clock.now();

        let outcome = match action {
            LifecycleAction::Submit { id, new } => Self::submit(state, id, new, now).map(|()| false),
            command => Self::transition(state, command, now),
        };

        match (outcome, state.request.as_ref()) {
            (Ok(true), Some(request)) => smallvec![Self::notify_effect(env, request)],
            (Ok(_), _) => smallvec![Effect::None],
            (Err(error), _) => {
                state.last_error = Some(error);
                smallvec![Effect::None]
            },
        }
    }
}

/// `approved → completed`, archived by `actor` in the same mutation.
fn complete_document(request: &mut Request, actor: &ActorId, now: DateTime<Utc>) -> Result<()> {
    request.status = RequestStatus::Completed;
    request.completed_at = Some(now);
    archive_record(request, actor, now)
}

fn require_status(request: &Request, required: RequestStatus, verb: &str) -> Result<()> {
    if request.status == required {
        return Ok(());
    }
    Err(PortalError::invalid(format!(
        "cannot {verb} a {} {} (must be {required})",
        request.status, request.kind
    )))
}

/// Trim `value`, treating blank strings as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
