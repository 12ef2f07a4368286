//! # Records Runtime
//!
//! Runtime that coordinates reducer execution and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: owns a state value, runs the reducer under a write lock and
//!   executes the returned effects with a feedback loop
//! - **Detached executor**: runs effects produced by a reducer that was driven
//!   outside a `Store` (see [`executor`])
//! - **Health types**: component health reporting for readiness probes
//!
//! ## Example
//!
//! ```ignore
//! use records_runtime::Store;
//!
//! let store = Store::new(CaptureState::default(), CaptureReducer, environment);
//!
//! store.send(CaptureAction::Start).await?;
//! let phase = store.state(|s| s.phase).await;
//! ```

use records_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

pub mod executor;

/// Prometheus metrics recorder
pub mod metrics;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for terminal action
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// a matching action is received.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Health check status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,

    /// Component is operational but experiencing issues (slow store lookups)
    Degraded,

    /// Component is not operational
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Check if status is unhealthy
    #[must_use]
    pub const fn is_unhealthy(self) -> bool {
        matches!(self, Self::Unhealthy)
    }

    /// Get the worst status between two statuses
    #[must_use]
    pub const fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unhealthy, _) | (_, Self::Unhealthy) => Self::Unhealthy,
            (Self::Degraded, _) | (_, Self::Degraded) => Self::Degraded,
            _ => Self::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check result for a component
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Name of the component being checked
    pub component: String,

    /// Current health status
    pub status: HealthStatus,

    /// Optional message providing details
    pub message: Option<String>,

    /// Optional metadata (latency, backend name)
    pub metadata: Vec<(String, String)>,
}

impl HealthCheck {
    /// Create a healthy check result
    #[must_use]
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Healthy,
            message: None,
            metadata: Vec::new(),
        }
    }

    /// Create a degraded check result
    #[must_use]
    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
            metadata: Vec::new(),
        }
    }

    /// Create an unhealthy check result
    #[must_use]
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            metadata: Vec::new(),
        }
    }

    /// Add metadata to the health check
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }
}

/// Aggregated health report
///
/// The overall status is the worst status of all checks.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Overall system status (worst of all checks)
    pub status: HealthStatus,

    /// Individual component checks
    pub checks: Vec<HealthCheck>,

    /// Timestamp when report was generated
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthReport {
    /// Create a new health report from checks
    #[must_use]
    pub fn new(checks: Vec<HealthCheck>) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .fold(HealthStatus::Healthy, HealthStatus::worst);

        Self {
            status,
            checks,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Check if overall system is healthy
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

const fn effect_kind<A>(effect: &Effect<A>) -> &'static str {
    match effect {
        Effect::None => "none",
        Effect::Future(_) => "future",
    }
}

/// Store module - the runtime for reducers
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, Duration, Effect, HealthCheck,
        Ordering, Reducer, RwLock, StoreError, effect_kind,
    };
    use tokio::sync::broadcast;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        /// Actions produced by effects are broadcast here once the reducer
        /// has applied them.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// The action broadcast channel holds 16 actions; use
        /// [`Store::with_broadcast_capacity`] for chattier reducers.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, environment, 16)
        }

        /// Create a new store with a custom action broadcast capacity
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                action_broadcast,
            }
        }

        /// Report the store's health from its pending effect count.
        #[must_use]
        pub fn health(&self) -> HealthCheck {
            let pending = self.pending_effects.load(Ordering::Acquire);
            let check = if self.shutdown.load(Ordering::Acquire) {
                HealthCheck::unhealthy("store", "Store is shutting down")
            } else {
                HealthCheck::healthy("store")
            };
            check.with_metadata("pending_effects", pending.to_string())
        }

        /// Number of effects currently executing.
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Initiate graceful shutdown of the store
        ///
        /// Sets the shutdown flag (rejecting new actions), then waits for
        /// pending effects to finish.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            self.shutdown.store(true, Ordering::Release);

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(20);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timeout");
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Spawns the returned effects
        ///
        /// `send()` returns once effects are started, not when they finish.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<(), StoreError>
        where
            R: Clone,
            E: Clone,
        {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.commands.total").increment(1);

            let effects = {
                let mut state = self.state.write().await;
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                tracing::trace!("Reducer completed, returned {} effects", effects.len());
                effects
            };

            for effect in effects {
                self.execute_effect(effect);
            }

            Ok(())
        }

        /// Send an action and wait for a matching result action
        ///
        /// Subscribes to the action broadcast before sending, then returns the
        /// first effect-produced action that matches `predicate`. The store's
        /// state already reflects that action when this returns.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: Timeout expired before matching action received
        /// - [`StoreError::ChannelClosed`]: Action broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: Store is shutting down
        ///
        /// # Example
        ///
        /// ```ignore
        /// let outcome = store.send_and_wait_for(
        ///     CaptureAction::Start,
        ///     |a| matches!(a, CaptureAction::Decoded { .. } | CaptureAction::DecodeFailed { .. }),
        ///     Duration::from_secs(5),
        /// ).await?;
        /// ```
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            R: Clone,
            E: Clone,
            F: Fn(&A) -> bool,
        {
            // Subscribe BEFORE sending to avoid race condition
            let mut rx = self.action_broadcast.subscribe();

            self.send(action).await?;

            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to all actions produced by effects
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let phase = store.state(|s| s.phase).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Spawn an effect, tracked for shutdown.
        fn execute_effect(&self, effect: Effect<A>)
        where
            R: Clone,
            E: Clone,
        {
            metrics::counter!("store.effects.executed", "type" => effect_kind(&effect))
                .increment(1);

            let Effect::Future(fut) = effect else {
                return;
            };

            self.pending_effects.fetch_add(1, Ordering::SeqCst);
            let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));
            let store = self.clone();

            tokio::spawn(async move {
                let _pending_guard = pending_guard;
                if let Some(action) = fut.await {
                    store.feed(action).await;
                }
            });
        }

        async fn feed(&self, action: A)
        where
            R: Clone,
            E: Clone,
        {
            if let Err(error) = self.send(action.clone()).await {
                tracing::debug!(%error, "Dropped effect feedback action");
            }
            // No subscribers is fine
            let _ = self.action_broadcast.send(action);
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

pub use store::Store;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use records_core::{SmallVec, smallvec};

    #[derive(Debug, Clone, Default)]
    struct TallyState {
        total: u32,
        echoes: u32,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum TallyAction {
        Add(u32),
        AddLater(u32),
        AddAfterPause(u32),
        Echoed(u32),
    }

    #[derive(Clone)]
    struct TallyReducer;

    impl Reducer for TallyReducer {
        type State = TallyState;
        type Action = TallyAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut TallyState,
            action: TallyAction,
            _env: &(),
        ) -> SmallVec<[Effect<TallyAction>; 4]> {
            match action {
                TallyAction::Add(n) => {
                    state.total += n;
                    smallvec![Effect::None]
                },
                TallyAction::AddLater(n) => {
                    smallvec![Effect::future(async move { Some(TallyAction::Echoed(n)) })]
                },
                TallyAction::AddAfterPause(n) => smallvec![
                    Effect::future(async move { Some(TallyAction::Add(n)) }),
                    Effect::future(async move {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Some(TallyAction::Echoed(n))
                    }),
                ],
                TallyAction::Echoed(n) => {
                    state.total += n;
                    state.echoes += 1;
                    smallvec![]
                },
            }
        }
    }

    #[tokio::test]
    async fn send_applies_reducer_synchronously() {
        let store = Store::new(TallyState::default(), TallyReducer, ());
        store.send(TallyAction::Add(3)).await.unwrap();
        assert_eq!(store.state(|s| s.total).await, 3);
    }

    #[tokio::test]
    async fn future_effect_feeds_action_back() {
        let store = Store::new(TallyState::default(), TallyReducer, ());

        let result = store
            .send_and_wait_for(
                TallyAction::AddLater(4),
                |a| matches!(a, TallyAction::Echoed(_)),
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert_eq!(result, TallyAction::Echoed(4));
        store.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.state(|s| (s.total, s.echoes)).await, (4, 1));
    }

    #[tokio::test]
    async fn every_effect_of_one_action_runs() {
        let store = Store::new(TallyState::default(), TallyReducer, ());
        store
            .send_and_wait_for(
                TallyAction::AddAfterPause(2),
                |a| matches!(a, TallyAction::Echoed(_)),
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        store.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.state(|s| s.total).await, 4);
    }

    #[tokio::test]
    async fn wait_times_out_without_matching_action() {
        let store = Store::new(TallyState::default(), TallyReducer, ());
        let result = store
            .send_and_wait_for(
                TallyAction::Add(1),
                |a| matches!(a, TallyAction::Echoed(_)),
                Duration::from_millis(20),
            )
            .await;
        assert!(matches!(result, Err(StoreError::Timeout)));
    }

    #[tokio::test]
    async fn rejects_actions_after_shutdown() {
        let store = Store::new(TallyState::default(), TallyReducer, ());
        store.shutdown(Duration::from_millis(50)).await.unwrap();

        let result = store.send(TallyAction::Add(1)).await;
        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
        assert!(store.health().status.is_unhealthy());
    }

    #[test]
    fn report_takes_worst_status() {
        let report = HealthReport::new(vec![
            HealthCheck::healthy("http"),
            HealthCheck::degraded("entity_store", "slow"),
        ]);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(!report.is_healthy());
    }
}
