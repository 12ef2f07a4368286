//! School records portal core.
//!
//! Staff review document requests and enrollments, place enrolled students in
//! capacity-bounded sections, archive finished records and hand documents
//! over against signed QR pickup tokens.
//!
//! # Architecture
//!
//! ```text
//!   HTTP (api, server)
//!          │
//!          ▼
//! ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────┐
//! │    Lifecycle     │◀─│     Section      │  │  QR Verification │
//! │     Manager      │  │    Assignment    │  │  (tokens, images │
//! │ (reducer + CAS)  │◀─┼──────────────────┤  │   capture flow)  │
//! └──────────────────┘  │ Archive Manager  │  └──────────────────┘
//!          │            └──────────────────┘           │
//!          ▼                                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │             Entity Store (in-memory | PostgreSQL)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Rules
//!
//! ## 1. Versioned writes
//!
//! Every record carries a version. Commands name the version they were based
//! on; a stale version fails with `VERSION_CONFLICT` and nothing is written.
//! A committed command bumps the version by exactly one.
//!
//! ## 2. Section capacity
//!
//! The enrolled count of a section is recounted inside the same atomic step
//! that writes the enrollment, so concurrent assignments can never overfill a
//! section:
//!
//! ```text
//! if enrolled >= capacity {
//!     return CapacityExceeded // the enrollment is left untouched
//! }
//! ```
//!
//! ## 3. Pickup verification
//!
//! Tokens are checked structurally and by checksum first. The entity store is
//! consulted under a bounded timeout; when it cannot be reached the token is
//! accepted offline and the result says so.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod app;
pub mod archive;
pub mod assignment;
pub mod config;
pub mod error;
pub mod grade;
pub mod lifecycle;
pub mod metrics;
pub mod notify;
pub mod qr;
pub mod server;
pub mod store;
pub mod types;

pub use app::PortalServices;
pub use archive::{ArchiveManager, ArchiveSweeper};
pub use assignment::SectionAssignmentService;
pub use config::Config;
pub use error::{PortalError, Result};
pub use grade::GradeLevel;
pub use lifecycle::LifecycleManager;
pub use qr::{QrVerificationService, TokenSigner};
pub use server::{AppState, build_router};
pub use store::{EntityStore, EntityStoreError, InMemoryEntityStore};
pub use types::*;
