//! Lifecycle manager: load, reduce, persist, then run effects.
//!
//! The manager drives [`LifecycleReducer`] by hand for each operation. The
//! entity store is the only source of truth, so there is no long-lived state
//! to keep in a runtime `Store`: each call reads the record, reduces the
//! command against that snapshot and writes the result back with a version
//! check against the snapshot's version. Effects run only after the write
//! commits.

use super::actions::{LifecycleAction, LifecycleState};
use super::environment::LifecycleEnvironment;
use super::reducer::LifecycleReducer;
use crate::error::{PortalError, Result};
use crate::store::EntityStore;
use crate::types::{ActorId, NewRequest, Request, RequestFilter, RequestId};
use records_core::effect::Effect;
use records_core::environment::Clock;
use records_core::reducer::Reducer;
use records_core::version::Version;
use records_core::SmallVec;
use records_runtime::executor::spawn_detached;
use std::sync::Arc;

/// Effects produced by one reduction.
pub(crate) type LifecycleEffects = SmallVec<[Effect<LifecycleAction>; 4]>;

/// Entry point for request lifecycle operations.
#[derive(Clone)]
pub struct LifecycleManager {
    store: Arc<dyn EntityStore>,
    env: LifecycleEnvironment,
    reducer: LifecycleReducer,
}

impl LifecycleManager {
    /// Create a manager over `store`.
    pub fn new(store: Arc<dyn EntityStore>, env: LifecycleEnvironment) -> Self {
        Self {
            store,
            env,
            reducer: LifecycleReducer::new(),
        }
    }

    /// Submit a new request in `pending`.
    ///
    /// Enrollment grade levels are normalized here.
    ///
    /// # Errors
    ///
    /// [`PortalError::Validation`] for a missing student, document type,
    /// grade level or inquiry message; store failures.
    #[tracing::instrument(skip(self, new), fields(kind = %new.kind, subject = %new.subject))]
    pub async fn submit(&self, new: NewRequest) -> Result<Request> {
        let action = LifecycleAction::Submit {
            id: RequestId::new(),
            new,
        };
        let (request, effects) = self.plan(LifecycleState::empty(), action)?;

        self.store
            .insert_request(request.clone())
            .await
            .map_err(|e| refused("submit", e.into()))?;

        self.committed("submit", &request, effects);
        Ok(request)
    }

    /// `pending → approved`.
    ///
    /// # Errors
    ///
    /// [`PortalError::InvalidTransition`] unless pending,
    /// [`PortalError::VersionConflict`] if `expected_version` is stale.
    #[tracing::instrument(skip(self, notes))]
    pub async fn approve(
        &self,
        id: RequestId,
        expected_version: Version,
        reviewer: ActorId,
        notes: Option<String>,
    ) -> Result<Request> {
        self.execute(
            id,
            LifecycleAction::Approve {
                expected_version,
                notes,
                reviewer,
            },
        )
        .await
    }

    /// `pending → rejected` with a non-blank reason.
    ///
    /// # Errors
    ///
    /// [`PortalError::Validation`] for a blank reason,
    /// [`PortalError::InvalidTransition`] unless pending,
    /// [`PortalError::VersionConflict`] if `expected_version` is stale.
    #[tracing::instrument(skip(self, reason, notes))]
    pub async fn reject(
        &self,
        id: RequestId,
        expected_version: Version,
        reason: String,
        reviewer: ActorId,
        notes: Option<String>,
    ) -> Result<Request> {
        self.execute(
            id,
            LifecycleAction::Reject {
                expected_version,
                reason,
                notes,
                reviewer,
            },
        )
        .await
    }

    /// `approved → completed` for a document request or inquiry, archiving it
    /// in the same mutation.
    ///
    /// # Errors
    ///
    /// [`PortalError::InvalidTransition`] for enrollments (they complete
    /// through section assignment) and for records that are not approved;
    /// [`PortalError::VersionConflict`] if `expected_version` is stale.
    #[tracing::instrument(skip(self))]
    pub async fn complete(
        &self,
        id: RequestId,
        expected_version: Version,
        actor: ActorId,
    ) -> Result<Request> {
        self.execute(
            id,
            LifecycleAction::Complete {
                expected_version,
                actor,
            },
        )
        .await
    }

    /// Append a staff reply to an active inquiry.
    ///
    /// # Errors
    ///
    /// [`PortalError::Validation`] for a blank message,
    /// [`PortalError::InvalidTransition`] for other kinds and archived
    /// inquiries, [`PortalError::NotFound`].
    #[tracing::instrument(skip(self, message))]
    pub async fn reply(&self, id: RequestId, message: String, actor: ActorId) -> Result<Request> {
        self.execute(id, LifecycleAction::Reply { message, actor })
            .await
    }

    /// Load one request.
    ///
    /// # Errors
    ///
    /// [`PortalError::NotFound`] if it does not exist.
    pub async fn get(&self, id: RequestId) -> Result<Request> {
        self.store
            .get_request(id)
            .await?
            .ok_or_else(|| PortalError::request_not_found(id))
    }

    /// List requests in the filter's view order.
    ///
    /// # Errors
    ///
    /// Store failures only.
    pub async fn list(&self, filter: RequestFilter) -> Result<Vec<Request>> {
        Ok(self.store.list_requests(filter).await?)
    }

    pub(crate) fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.env.clock
    }

    /// Load, reduce and write back `action` with a plain version check.
    pub(crate) async fn execute(&self, id: RequestId, action: LifecycleAction) -> Result<Request> {
        let name = action.name();
        let current = self.get(id).await?;
        let expected = current.version;
        let (next, effects) = self.plan(LifecycleState::loaded(current), action)?;

        self.store
            .update_request(expected, next.clone())
            .await
            .map_err(|e| refused(name, e.into()))?;

        self.committed(name, &next, effects);
        Ok(next)
    }

    /// Reduce `action` against `state` without persisting anything.
    pub(crate) fn plan(
        &self,
        mut state: LifecycleState,
        action: LifecycleAction,
    ) -> Result<(Request, LifecycleEffects)> {
        let name = action.name();
        let effects = self.reducer.reduce(&mut state, action, &self.env);

        if let Some(error) = state.last_error {
            return Err(refused(name, error));
        }
        let request = state
            .request
            .ok_or_else(|| PortalError::Internal(format!("{name} produced no record")))?;
        Ok((request, effects))
    }

    /// Log and count a committed transition, then run its effects.
    pub(crate) fn committed(&self, action: &'static str, request: &Request, effects: LifecycleEffects) {
        tracing::info!(
            request_id = %request.id,
            action,
            status = %request.status,
            archived = request.is_archived(),
            version = %request.version,
            "Lifecycle transition committed"
        );
        metrics::counter!(
            "portal.lifecycle.transitions",
            "action" => action,
            "outcome" => "committed"
        )
        .increment(1);

        self.dispatch(effects);
    }

    fn dispatch(&self, effects: LifecycleEffects) {
        if effects.iter().all(Effect::is_noop) {
            return;
        }
        let env = self.env.clone();
        let reducer = self.reducer;
        let _notifications = spawn_detached(effects, move |feedback| {
            let mut scratch = LifecycleState::empty();
            let _ = reducer.reduce(&mut scratch, feedback, &env);
        });
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager").finish_non_exhaustive()
    }
}

/// Log and count a refused or failed operation, passing the error through.
pub(crate) fn refused(action: &'static str, error: PortalError) -> PortalError {
    let outcome = match &error {
        PortalError::VersionConflict { expected, actual } => {
            tracing::warn!(action, %expected, %actual, "Version conflict");
            "conflict"
        },
        PortalError::CapacityExceeded {
            section,
            capacity,
            enrolled,
        } => {
            tracing::warn!(action, section = %section, capacity, enrolled, "Section is full");
            "capacity_exceeded"
        },
        PortalError::StoreUnavailable(_) | PortalError::Internal(_) => {
            tracing::error!(action, error = %error, "Lifecycle operation failed");
            "failed"
        },
        _ => {
            tracing::debug!(action, error = %error, "Lifecycle command refused");
            "refused"
        },
    };
    metrics::counter!(
        "portal.lifecycle.transitions",
        "action" => action,
        "outcome" => outcome
    )
    .increment(1);
    error
}
