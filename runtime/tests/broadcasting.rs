//! Integration tests for Store action broadcasting
//!
//! Effect-produced actions are reduced before they are broadcast, so an
//! observer that wakes on an action always sees the state it produced. A job
//! reports progress through a chain of effects, each spawned by the reduction
//! of the previous one.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use records_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use records_runtime::{Store, StoreError};
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Stage {
    #[default]
    Idle,
    Working,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
enum JobAction {
    Start { succeed: bool },
    Progress(u8),
    Finished,
    Crashed,
}

#[derive(Debug, Clone, Default)]
struct JobState {
    stage: Stage,
    succeed: bool,
    progress: Vec<u8>,
}

#[derive(Clone)]
struct JobReducer;

impl Reducer for JobReducer {
    type State = JobState;
    type Action = JobAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut JobState,
        action: JobAction,
        _env: &(),
    ) -> SmallVec<[Effect<JobAction>; 4]> {
        match action {
            JobAction::Start { succeed } => {
                state.stage = Stage::Working;
                state.succeed = succeed;
                smallvec![Effect::future(async { Some(JobAction::Progress(50)) })]
            },
            JobAction::Progress(p) => {
                state.progress.push(p);
                if state.stage != Stage::Working {
                    return smallvec![];
                }
                if p < 100 {
                    return smallvec![Effect::future(async move {
                        Some(JobAction::Progress(p + 50))
                    })];
                }
                let last = if state.succeed {
                    JobAction::Finished
                } else {
                    JobAction::Crashed
                };
                smallvec![Effect::future(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Some(last)
                })]
            },
            JobAction::Finished => {
                state.stage = Stage::Done;
                smallvec![]
            },
            JobAction::Crashed => {
                state.stage = Stage::Failed;
                smallvec![]
            },
        }
    }
}

fn is_terminal(action: &JobAction) -> bool {
    matches!(action, JobAction::Finished | JobAction::Crashed)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn state_reflects_the_awaited_action() {
    let store = Store::new(JobState::default(), JobReducer, ());

    let outcome = store
        .send_and_wait_for(
            JobAction::Start { succeed: true },
            is_terminal,
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(outcome, JobAction::Finished);
    assert_eq!(store.state(|s| s.stage).await, Stage::Done);
    assert_eq!(store.state(|s| s.progress.clone()).await, vec![50, 100]);
}

#[tokio::test]
async fn failure_outcome_is_observed_the_same_way() {
    let store = Store::new(JobState::default(), JobReducer, ());

    let outcome = store
        .send_and_wait_for(
            JobAction::Start { succeed: false },
            is_terminal,
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(outcome, JobAction::Crashed);
    assert_eq!(store.state(|s| s.stage).await, Stage::Failed);
}

#[tokio::test]
async fn every_subscriber_sees_effect_actions_in_order() {
    let store = Store::new(JobState::default(), JobReducer, ());
    let mut first = store.subscribe_actions();
    let mut second = store.subscribe_actions();

    store.send(JobAction::Start { succeed: true }).await.unwrap();

    for rx in [&mut first, &mut second] {
        let mut seen = Vec::new();
        while seen.last().is_none_or(|a| !is_terminal(a)) {
            let action = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("action within a second")
                .unwrap();
            seen.push(action);
        }
        assert_eq!(
            seen,
            vec![
                JobAction::Progress(50),
                JobAction::Progress(100),
                JobAction::Finished
            ]
        );
    }
}

#[tokio::test]
async fn actions_sent_directly_are_not_broadcast() {
    let store = Store::new(JobState::default(), JobReducer, ());

    let result = store
        .send_and_wait_for(
            JobAction::Progress(10),
            |a| matches!(a, JobAction::Progress(10)),
            Duration::from_millis(50),
        )
        .await;

    assert!(matches!(result, Err(StoreError::Timeout)));
    assert_eq!(store.state(|s| s.progress.clone()).await, vec![10]);
}

#[tokio::test]
async fn shutdown_drains_effects_and_drops_their_feedback() {
    let store = Store::new(JobState::default(), JobReducer, ());
    store.send(JobAction::Start { succeed: true }).await.unwrap();

    store.shutdown(Duration::from_secs(1)).await.unwrap();

    assert_eq!(store.pending_effects(), 0);
    assert_eq!(store.state(|s| s.stage).await, Stage::Working);
    assert!(store.state(|s| s.progress.is_empty()).await);
    assert!(matches!(
        store.send(JobAction::Start { succeed: true }).await,
        Err(StoreError::ShutdownInProgress)
    ));
}
