//! Error taxonomy for the portal services.
//!
//! Every failure is recoverable by the caller and surfaced as-is; the only
//! automatic recovery in the portal is the online → offline fallback of QR
//! verification, which is driven by [`PortalError::StoreUnavailable`].

use crate::store::EntityStoreError;
use chrono::{DateTime, Utc};
use records_core::version::Version;
use thiserror::Error;

use crate::types::RequestId;

/// Errors returned by the portal services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortalError {
    /// The requested transition is not allowed from the current state.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The caller's version is stale.
    #[error("Version conflict: expected {expected}, found {actual}")]
    VersionConflict {
        /// Version the caller read
        expected: Version,
        /// Version currently stored
        actual: Version,
    },

    /// The section has no free seat.
    #[error("Section {section} is full ({enrolled}/{capacity})")]
    CapacityExceeded {
        /// Section name
        section: String,
        /// Section capacity
        capacity: u32,
        /// Enrolled count at assignment time
        enrolled: u32,
    },

    /// Restore was called on a record that is not archived.
    #[error("Request {0} is not archived")]
    NotArchived(RequestId),

    /// The pickup payload could not be decoded.
    #[error("Malformed pickup token: {0}")]
    MalformedToken(String),

    /// The pickup token failed its integrity check.
    #[error("Pickup token integrity check failed: {0}")]
    IntegrityError(String),

    /// No QR code could be decoded from the image.
    #[error("No QR code found in image")]
    NoCodeFound,

    /// The pickup token was already verified.
    #[error("Pickup token for request {0} was already used")]
    AlreadyUsed(RequestId),

    /// The pickup token is older than its validity window.
    #[error("Pickup token issued at {issued_at} has expired")]
    Expired {
        /// When the token was issued
        issued_at: DateTime<Utc>,
    },

    /// The referenced entity does not exist.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Entity kind ("Request", "Section")
        resource: &'static str,
        /// Identifier as given
        id: String,
    },

    /// The entity store could not be reached.
    #[error("Entity store unavailable: {0}")]
    StoreUnavailable(String),

    /// Unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PortalError {
    /// Stable machine-readable code surfaced to HTTP clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::NotArchived(_) => "NOT_ARCHIVED",
            Self::MalformedToken(_) => "MALFORMED_TOKEN",
            Self::IntegrityError(_) => "INTEGRITY_ERROR",
            Self::NoCodeFound => "NO_CODE_FOUND",
            Self::AlreadyUsed(_) => "ALREADY_USED",
            Self::Expired { .. } => "EXPIRED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::StoreUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Shorthand for a missing request.
    #[must_use]
    pub fn request_not_found(id: RequestId) -> Self {
        Self::NotFound {
            resource: "Request",
            id: id.to_string(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidTransition(message.into())
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<EntityStoreError> for PortalError {
    fn from(error: EntityStoreError) -> Self {
        match error {
            EntityStoreError::NotFound { resource, id } => Self::NotFound { resource, id },
            EntityStoreError::VersionConflict { expected, actual } => {
                Self::VersionConflict { expected, actual }
            },
            EntityStoreError::CapacityExceeded {
                section,
                capacity,
                enrolled,
            } => Self::CapacityExceeded {
                section,
                capacity,
                enrolled,
            },
            EntityStoreError::AlreadyUsed(id) => Self::AlreadyUsed(id),
            EntityStoreError::TokenMismatch(id) => Self::IntegrityError(format!(
                "token is not the current pickup token for request {id}"
            )),
            EntityStoreError::Duplicate(message) => Self::Validation(message),
            EntityStoreError::Unavailable(message) => Self::StoreUnavailable(message),
            EntityStoreError::Database(message) | EntityStoreError::Serialization(message) => {
                Self::Internal(message)
            },
        }
    }
}

/// Result alias used throughout the portal.
pub type Result<T> = std::result::Result<T, PortalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(PortalError::invalid("x").code(), "INVALID_TRANSITION");
        assert_eq!(PortalError::NoCodeFound.code(), "NO_CODE_FOUND");
        assert_eq!(
            PortalError::request_not_found(RequestId::new()).code(),
            "NOT_FOUND"
        );
    }

    #[test]
    fn store_errors_map_onto_domain_errors() {
        let id = RequestId::new();
        assert_eq!(
            PortalError::from(EntityStoreError::AlreadyUsed(id)),
            PortalError::AlreadyUsed(id)
        );
        assert!(matches!(
            PortalError::from(EntityStoreError::Unavailable("pool timed out".into())),
            PortalError::StoreUnavailable(_)
        ));
        assert!(matches!(
            PortalError::from(EntityStoreError::TokenMismatch(id)),
            PortalError::IntegrityError(_)
        ));
        assert!(matches!(
            PortalError::from(EntityStoreError::Duplicate("dup".into())),
            PortalError::Validation(_)
        ));
    }
}
