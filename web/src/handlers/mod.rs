//! HTTP request handlers shared by every portal router.

pub mod health;

pub use health::{health_check, readiness};
