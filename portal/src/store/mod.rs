//! Entity store: the single source of truth for requests, sections and
//! pickup tokens.
//!
//! Writes are version-checked. [`EntityStore::update_request`] only succeeds
//! when the stored record is still at the caller's expected version, and
//! [`EntityStore::assign_section`] additionally re-counts the section's
//! enrolled students inside the same serialization point, so two concurrent
//! assignments can never both take the last seat.
//!
//! Methods return boxed futures so the trait stays dyn-compatible and can be
//! shared as `Arc<dyn EntityStore>`.

use crate::types::{
    ActorId, PickupTokenRecord, Request, RequestFilter, RequestId, Section, SectionId,
};
use chrono::{DateTime, Utc};
use records_core::version::Version;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryEntityStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEntityStore;

/// Boxed future returned by [`EntityStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EntityStoreError>> + Send + 'a>>;

/// Errors raised by entity store backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityStoreError {
    /// The entity does not exist
    #[error("{resource} {id} not found")]
    NotFound {
        /// Entity kind
        resource: &'static str,
        /// Identifier
        id: String,
    },

    /// The stored version differs from the expected one
    #[error("Version conflict: expected {expected}, found {actual}")]
    VersionConflict {
        /// Version the writer read
        expected: Version,
        /// Version currently stored
        actual: Version,
    },

    /// The section is full
    #[error("Section {section} is full ({enrolled}/{capacity})")]
    CapacityExceeded {
        /// Section name
        section: String,
        /// Section capacity
        capacity: u32,
        /// Enrolled count observed under the section lock
        enrolled: u32,
    },

    /// The pickup token was already verified
    #[error("Pickup token for request {0} already verified")]
    AlreadyUsed(RequestId),

    /// The presented token is not the one recorded for the request
    #[error("Pickup token for request {0} does not match the recorded token")]
    TokenMismatch(RequestId),

    /// A uniqueness constraint was violated
    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// The backend could not be reached (connection refused, pool timeout)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected the operation
    #[error("Database error: {0}")]
    Database(String),

    /// A stored value could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EntityStoreError {
    pub(crate) fn request_not_found(id: RequestId) -> Self {
        Self::NotFound {
            resource: "Request",
            id: id.to_string(),
        }
    }

    pub(crate) fn section_not_found(id: SectionId) -> Self {
        Self::NotFound {
            resource: "Section",
            id: id.to_string(),
        }
    }
}

/// Persistent storage for portal entities.
pub trait EntityStore: Send + Sync {
    /// Insert a newly submitted request.
    ///
    /// # Errors
    ///
    /// [`EntityStoreError::Duplicate`] if the id is taken.
    fn insert_request(&self, request: Request) -> StoreFuture<'_, ()>;

    /// Load a request by id.
    ///
    /// # Errors
    ///
    /// Backend failures only; a missing request is `Ok(None)`.
    fn get_request(&self, id: RequestId) -> StoreFuture<'_, Option<Request>>;

    /// Replace a request if it is still at `expected`.
    ///
    /// `request.version` must already be the bumped version.
    ///
    /// # Errors
    ///
    /// [`EntityStoreError::VersionConflict`] if the stored version moved on,
    /// [`EntityStoreError::NotFound`] if the request does not exist.
    fn update_request(&self, expected: Version, request: Request) -> StoreFuture<'_, ()>;

    /// List requests matching `filter`, in the view's order.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn list_requests(&self, filter: RequestFilter) -> StoreFuture<'_, Vec<Request>>;

    /// Insert a new section.
    ///
    /// # Errors
    ///
    /// [`EntityStoreError::Duplicate`] if a section with the same name and
    /// grade level exists.
    fn insert_section(&self, section: Section) -> StoreFuture<'_, ()>;

    /// Load a section by id.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn get_section(&self, id: SectionId) -> StoreFuture<'_, Option<Section>>;

    /// All sections, ordered by grade level then name.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn list_sections(&self) -> StoreFuture<'_, Vec<Section>>;

    /// Number of enrolled, non-archived requests in the section right now.
    ///
    /// # Errors
    ///
    /// [`EntityStoreError::NotFound`] if the section does not exist.
    fn enrolled_count(&self, section_id: SectionId) -> StoreFuture<'_, u32>;

    /// Enrolled, non-archived requests in the section.
    ///
    /// # Errors
    ///
    /// [`EntityStoreError::NotFound`] if the section does not exist.
    fn section_roster(&self, section_id: SectionId) -> StoreFuture<'_, Vec<Request>>;

    /// Atomically check capacity and write an enrolled `request` that takes a
    /// seat in the section: a new assignment or a restored enrollment.
    ///
    /// Under a lock scoped to the section: recount, fail with
    /// [`EntityStoreError::CapacityExceeded`] when `count >= capacity`, then
    /// write `request` with the same version check as `update_request`.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded`, `VersionConflict` or `NotFound`.
    fn assign_section(
        &self,
        expected: Version,
        request: Request,
        section_id: SectionId,
    ) -> StoreFuture<'_, ()>;

    /// Record a newly issued token, replacing an unverified one.
    ///
    /// # Errors
    ///
    /// [`EntityStoreError::AlreadyUsed`] if the request's token was already
    /// verified.
    fn save_pickup_token(&self, record: PickupTokenRecord) -> StoreFuture<'_, ()>;

    /// Load the token record for a request.
    ///
    /// # Errors
    ///
    /// Backend failures only.
    fn get_pickup_token(&self, request_id: RequestId) -> StoreFuture<'_, Option<PickupTokenRecord>>;

    /// Mark the request's token verified if `checksum` is the current one.
    ///
    /// Exactly one concurrent caller succeeds.
    ///
    /// # Errors
    ///
    /// `NotFound` without a record, `TokenMismatch` for another checksum,
    /// `AlreadyUsed` if verified before.
    fn mark_token_verified(
        &self,
        request_id: RequestId,
        checksum: String,
        at: DateTime<Utc>,
        by: ActorId,
    ) -> StoreFuture<'_, PickupTokenRecord>;

    /// Cheap reachability check for readiness probes.
    ///
    /// # Errors
    ///
    /// [`EntityStoreError::Unavailable`] when the backend cannot be reached.
    fn ping(&self) -> StoreFuture<'_, ()>;
}
