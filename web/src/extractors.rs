//! Custom Axum extractors.
//!
//! - [`CorrelationId`]: the request's correlation ID
//! - [`Actor`]: the staff member performing the request
//!
//! Authentication lives outside the portal core; an upstream gateway is
//! expected to set the `X-Actor-Id` header after it has authenticated the
//! caller.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::middleware::CORRELATION_ID_HEADER;

/// Header carrying the acting staff member's identifier.
pub const ACTOR_HEADER: &str = "X-Actor-Id";

/// Actor recorded when no `X-Actor-Id` header is present.
pub const DEFAULT_ACTOR: &str = "Admin";

/// Correlation ID for request tracing.
///
/// Prefers the ID stored by the correlation-id middleware, then the
/// `X-Correlation-ID` header, and generates a new UUID v4 otherwise.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Uuid>() {
            return Ok(Self(*id));
        }

        let correlation_id = parts
            .headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

/// Staff member performing the request.
///
/// Read from the `X-Actor-Id` header; blank or missing values fall back to
/// [`DEFAULT_ACTOR`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_ACTOR)
            .to_string();

        Ok(Self(actor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn correlation_id_from_header() {
        let uuid = Uuid::new_v4();
        let req = Request::builder()
            .header(CORRELATION_ID_HEADER, uuid.to_string())
            .body(())
            .expect("Valid request");

        let (mut parts, ()) = req.into_parts();
        let correlation_id = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(correlation_id.0, uuid);
    }

    #[tokio::test]
    async fn correlation_id_prefers_extension() {
        let from_middleware = Uuid::new_v4();
        let mut req = Request::builder()
            .header(CORRELATION_ID_HEADER, Uuid::new_v4().to_string())
            .body(())
            .expect("Valid request");
        req.extensions_mut().insert(from_middleware);

        let (mut parts, ()) = req.into_parts();
        let correlation_id = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(correlation_id.0, from_middleware);
    }

    #[tokio::test]
    async fn actor_from_header_is_trimmed() {
        let req = Request::builder()
            .header(ACTOR_HEADER, "  registrar@school.test ")
            .body(())
            .expect("Valid request");

        let (mut parts, ()) = req.into_parts();
        let actor = Actor::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(actor.0, "registrar@school.test");
    }

    #[tokio::test]
    async fn actor_falls_back_to_default() {
        let req = Request::builder()
            .header(ACTOR_HEADER, "   ")
            .body(())
            .expect("Valid request");

        let (mut parts, ()) = req.into_parts();
        let actor = Actor::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(actor, Actor(DEFAULT_ACTOR.to_string()));
    }
}
