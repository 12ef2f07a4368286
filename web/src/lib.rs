//! Axum integration for the school records portal.
//!
//! The portal's services form the functional core; this crate holds the
//! pieces of the imperative shell that are not specific to any one route:
//!
//! - [`AppError`]: maps domain failures to `{code, message}` JSON responses
//! - [`middleware`]: correlation-id tracking and request timing
//! - [`extractors`]: correlation id and acting staff member from headers
//! - [`handlers::health`]: liveness and readiness endpoints
//!
//! # Request Flow
//!
//! 1. **HTTP Request** passes through the correlation-id layer
//! 2. **Extract** path, query, JSON body and acting staff member
//! 3. **Call** the portal service, which validates and commits
//! 4. **Map** the typed result (or `AppError`) to an HTTP response

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{ACTOR_HEADER, Actor, CorrelationId};
pub use middleware::{CORRELATION_ID_HEADER, CorrelationIdExt, correlation_id_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
