//! Request lifecycle: the status state machine and the manager that persists
//! its transitions.

pub mod actions;
pub mod environment;
pub mod manager;
pub mod reducer;


pub use actions::{LifecycleAction, LifecycleState};
pub use environment::LifecycleEnvironment;
pub use manager::LifecycleManager;
pub(crate) use manager::refused;
pub use reducer::LifecycleReducer;
