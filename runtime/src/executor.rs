//! Detached effect execution.
//!
//! Some services drive a reducer by hand: they load state from a database,
//! reduce, persist, and only then run the effects. There is no long-lived
//! [`Store`](crate::Store) to feed actions back into, so produced actions are
//! handed to a callback instead.

use futures::future::join_all;
use records_core::effect::Effect;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Spawn `effects` onto the Tokio runtime.
///
/// Every action an effect produces is passed to `on_action`. The returned
/// handle completes when all effects have finished; callers that don't care
/// may drop it.
pub fn spawn_detached<A, I, F>(effects: I, on_action: F) -> JoinHandle<()>
where
    A: Send + 'static,
    I: IntoIterator<Item = Effect<A>>,
    F: Fn(A) + Send + Sync + 'static,
{
    let futures: Vec<_> = effects
        .into_iter()
        .filter_map(|effect| match effect {
            Effect::None => None,
            Effect::Future(fut) => Some(fut),
        })
        .collect();
    let sink = Arc::new(on_action);

    tokio::spawn(async move {
        let runs = futures.into_iter().map(|fut| {
            let sink = Arc::clone(&sink);
            async move {
                if let Some(action) = fut.await {
                    sink(action);
                }
            }
        });
        join_all(runs).await;
    })
}
