//! HTTP API handlers.
//!
//! Handlers are thin: they extract the path, body and acting staff member,
//! call one portal service and map the result. Every [`PortalError`] becomes
//! an [`AppError`] whose `code` is the error's stable code:
//!
//! | status | codes |
//! |--------|-------|
//! | 400 | `INVALID_TRANSITION`, `VALIDATION_ERROR`, `NOT_ARCHIVED`, `MALFORMED_TOKEN`, `INTEGRITY_ERROR`, `NO_CODE_FOUND`, `EXPIRED` |
//! | 404 | `NOT_FOUND` |
//! | 409 | `VERSION_CONFLICT`, `CAPACITY_EXCEEDED`, `ALREADY_USED` |
//! | 500 | `INTERNAL_SERVER_ERROR` |
//! | 503 | `SERVICE_UNAVAILABLE` |

pub mod dto;
pub mod enrollments;
pub mod inquiries;
pub mod qr;
pub mod requests;
pub mod sections;

mod records;

use crate::error::PortalError;
use axum::http::StatusCode;
use records_web::AppError;

impl From<PortalError> for AppError {
    fn from(error: PortalError) -> Self {
        let code = error.code();
        match error {
            PortalError::InvalidTransition(_)
            | PortalError::Validation(_)
            | PortalError::NotArchived(_)
            | PortalError::MalformedToken(_)
            | PortalError::IntegrityError(_)
            | PortalError::NoCodeFound
            | PortalError::Expired { .. } => {
                Self::with_code(StatusCode::BAD_REQUEST, code, error.to_string())
            },
            PortalError::VersionConflict { .. }
            | PortalError::CapacityExceeded { .. }
            | PortalError::AlreadyUsed(_) => {
                Self::with_code(StatusCode::CONFLICT, code, error.to_string())
            },
            PortalError::NotFound { .. } => {
                Self::with_code(StatusCode::NOT_FOUND, code, error.to_string())
            },
            PortalError::StoreUnavailable(_) => {
                Self::unavailable("The records store is temporarily unavailable")
                    .with_source(anyhow::Error::new(error))
            },
            PortalError::Internal(_) => {
                Self::internal("An internal error occurred").with_source(anyhow::Error::new(error))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequestId;
    use records_core::version::Version;

    #[test]
    fn client_errors_keep_their_code_and_message() {
        let err = AppError::from(PortalError::validation("Rejection reason is required"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(err.message().contains("Rejection reason is required"));
    }

    #[test]
    fn conflicts_are_409() {
        for error in [
            PortalError::VersionConflict {
                expected: Version::new(1),
                actual: Version::new(2),
            },
            PortalError::CapacityExceeded {
                section: "Rizal".to_string(),
                capacity: 40,
                enrolled: 40,
            },
            PortalError::AlreadyUsed(RequestId::new()),
        ] {
            let code = error.code();
            let err = AppError::from(error);
            assert_eq!(err.status(), StatusCode::CONFLICT);
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn server_errors_hide_details() {
        let err = AppError::from(PortalError::Internal("pool exhausted".to_string()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message().contains("pool"));

        let err = AppError::from(PortalError::StoreUnavailable("refused".to_string()));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");
    }

    #[test]
    fn not_found_is_404() {
        let err = AppError::from(PortalError::request_not_found(RequestId::new()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
