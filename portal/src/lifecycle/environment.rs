//! Collaborators injected into the lifecycle reducer.

use crate::notify::Notifier;
use records_core::environment::Clock;
use std::sync::Arc;

/// Environment for [`LifecycleReducer`](super::LifecycleReducer).
#[derive(Clone)]
pub struct LifecycleEnvironment {
    /// Source of `updated_at`, review and archive timestamps
    pub clock: Arc<dyn Clock>,
    /// Receives status notices after approve, reject and enroll
    pub notifier: Arc<dyn Notifier>,
}

impl LifecycleEnvironment {
    /// Creates a new lifecycle environment
    pub fn new(clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>) -> Self {
        Self { clock, notifier }
    }
}

impl std::fmt::Debug for LifecycleEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleEnvironment").finish_non_exhaustive()
    }
}
