//! Pickup token issuance and verification.
//!
//! ```text
//! issued ──verify (online)──▶ verified ──confirm_pickup──▶ request completed + archived
//!    └──verify fails──▶ rejected (nothing is written)
//! ```
//!
//! Verification checks structure and checksum locally first. Only then does
//! it read the request and its current token from the entity store, under a
//! bounded timeout. When those reads cannot complete the token is accepted on
//! its checksum alone and the result is flagged `is_offline`; an offline
//! verification never marks the token used and never enables
//! [`QrVerificationService::confirm_pickup`]. Marking the token used happens
//! after the timeout window and its failures are returned as errors.

use super::image::render_data_url;
use super::token::{PickupToken, TokenSigner};
use crate::error::{PortalError, Result};
use crate::lifecycle::{LifecycleAction, LifecycleManager};
use crate::store::EntityStore;
use crate::types::{
    ActorId, PickupTokenRecord, Request, RequestId, RequestKind, RequestStatus,
};
use records_core::environment::Clock;
use records_core::version::Version;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// A freshly issued pickup token.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    /// Payload text encoded in the QR code
    pub payload: String,
    /// PNG QR code as a `data:` URL
    pub qr_image: String,
    /// The decoded token
    #[serde(skip)]
    pub token: PickupToken,
}

/// Outcome of a successful verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verification {
    /// `true` when only structure and checksum were checked
    pub is_offline: bool,
    /// The request, when verified online
    pub request: Option<Request>,
    /// The verified token
    pub token: PickupToken,
}

/// Issues, verifies and redeems pickup tokens.
#[derive(Clone, Debug)]
pub struct QrVerificationService {
    lifecycle: LifecycleManager,
    signer: TokenSigner,
    lookup_timeout: Duration,
    token_ttl: chrono::Duration,
}

impl QrVerificationService {
    /// Create the service.
    ///
    /// `lookup_timeout` bounds the online store lookup; `token_ttl` is how
    /// long an issued token stays valid.
    #[must_use]
    pub const fn new(
        lifecycle: LifecycleManager,
        signer: TokenSigner,
        lookup_timeout: Duration,
        token_ttl: chrono::Duration,
    ) -> Self {
        Self {
            lifecycle,
            signer,
            lookup_timeout,
            token_ttl,
        }
    }

    fn store(&self) -> &Arc<dyn EntityStore> {
        self.lifecycle.store()
    }

    /// Issue a pickup token for an approved, active document request.
    ///
    /// Re-issuing replaces an unverified token; the previous one stops
    /// verifying online.
    ///
    /// # Errors
    ///
    /// - [`PortalError::InvalidTransition`] unless the request is an approved,
    ///   non-archived document request
    /// - [`PortalError::AlreadyUsed`] if the request's token was already verified
    /// - [`PortalError::NotFound`]
    #[tracing::instrument(skip(self))]
    pub async fn issue(&self, request_id: RequestId) -> Result<IssuedToken> {
        let request = self.lifecycle.get(request_id).await?;
        ensure_pickup_eligible(&request)?;
        let document_type = request.document_type.clone().ok_or_else(|| {
            PortalError::Internal(format!("document request {request_id} has no document type"))
        })?;

        let token = self.signer.issue(
            request_id,
            request.subject.clone(),
            document_type,
            self.lifecycle.clock().now(),
        );
        self.store()
            .save_pickup_token(PickupTokenRecord {
                request_id,
                checksum: token.checksum.clone(),
                issued_at: token.issued_at,
                verified_at: None,
                verified_by: None,
            })
            .await?;

        let payload = token.encode()?;
        let qr_image = render_data_url(&payload)?;

        tracing::info!(request_id = %request_id, issued_at = %token.issued_at, "Pickup token issued");
        metrics::counter!("portal.qr.issued").increment(1);

        Ok(IssuedToken {
            payload,
            qr_image,
            token,
        })
    }

    /// Verify a scanned payload.
    ///
    /// # Errors
    ///
    /// - [`PortalError::MalformedToken`] if the payload is not a pickup token
    /// - [`PortalError::IntegrityError`] on checksum mismatch, or online when
    ///   the token is not the one currently issued for the request
    /// - [`PortalError::Expired`] if older than the validity window
    /// - [`PortalError::AlreadyUsed`] if verified before
    /// - [`PortalError::NotFound`] / [`PortalError::InvalidTransition`] online,
    ///   for unknown or no longer eligible requests
    /// - [`PortalError::StoreUnavailable`] if the store fails while marking
    ///   the token used; the token may or may not be marked
    #[tracing::instrument(skip(self, payload))]
    pub async fn verify(&self, payload: &str, verifier: ActorId) -> Result<Verification> {
        let outcome = self.verify_inner(payload, verifier).await;

        let label = match &outcome {
            Ok(verification) if verification.is_offline => "offline",
            Ok(_) => "verified",
            Err(error) => error.code(),
        };
        metrics::counter!("portal.qr.verifications", "outcome" => label).increment(1);
        outcome
    }

    async fn verify_inner(&self, payload: &str, verifier: ActorId) -> Result<Verification> {
        let token = PickupToken::decode(payload)?;
        self.signer.verify(&token)?;

        let now = self.lifecycle.clock().now();
        if now.signed_duration_since(token.issued_at) > self.token_ttl {
            return Err(PortalError::Expired {
                issued_at: token.issued_at,
            });
        }

        let looked_up =
            tokio::time::timeout(self.lookup_timeout, self.look_up(token.request_id)).await;
        let (request, record) = match looked_up {
            Ok(Ok(found)) => found,
            Ok(Err(PortalError::StoreUnavailable(reason))) => return Ok(self.offline(token, &reason)),
            Ok(Err(error)) => return Err(refused_token(&token, error)),
            Err(_elapsed) => return Ok(self.offline(token, "lookup timed out")),
        };
        check_against_store(&token, &request, record.as_ref())
            .map_err(|error| refused_token(&token, error))?;

        // Unbounded: a mark that may have committed is never reported offline.
        self.store()
            .mark_token_verified(
                token.request_id,
                token.checksum.clone(),
                self.lifecycle.clock().now(),
                verifier,
            )
            .await
            .map_err(|error| refused_token(&token, error.into()))?;

        tracing::info!(request_id = %request.id, "Pickup token verified");
        Ok(Verification {
            is_offline: false,
            request: Some(request),
            token,
        })
    }

    async fn look_up(&self, request_id: RequestId) -> Result<(Request, Option<PickupTokenRecord>)> {
        let request = self
            .store()
            .get_request(request_id)
            .await?
            .ok_or_else(|| PortalError::request_not_found(request_id))?;
        let record = self.store().get_pickup_token(request_id).await?;
        Ok((request, record))
    }

    fn offline(&self, token: PickupToken, reason: &str) -> Verification {
        tracing::warn!(
            request_id = %token.request_id,
            reason,
            timeout_ms = u64::try_from(self.lookup_timeout.as_millis()).unwrap_or(u64::MAX),
            "Entity store unreachable; pickup token verified offline"
        );
        Verification {
            is_offline: true,
            request: None,
            token,
        }
    }

    /// Record who collected the document and complete the request.
    ///
    /// Requires an online verification of the request's current token.
    ///
    /// # Errors
    ///
    /// - [`PortalError::InvalidTransition`] without an online verification,
    ///   or if the request is no longer approved
    /// - [`PortalError::Validation`] for a blank `picked_up_by`
    /// - [`PortalError::VersionConflict`] if `expected_version` is stale
    #[tracing::instrument(skip(self))]
    pub async fn confirm_pickup(
        &self,
        request_id: RequestId,
        picked_up_by: String,
        expected_version: Version,
        actor: ActorId,
    ) -> Result<Request> {
        let verified = self
            .store()
            .get_pickup_token(request_id)
            .await?
            .is_some_and(|record| record.is_verified());
        if !verified {
            return Err(PortalError::invalid(format!(
                "pickup for request {request_id} requires an online verification of its pickup token"
            )));
        }

        self.lifecycle
            .execute(
                request_id,
                LifecycleAction::RecordPickup {
                    expected_version,
                    picked_up_by,
                    actor,
                },
            )
            .await
    }
}

fn refused_token(token: &PickupToken, error: PortalError) -> PortalError {
    tracing::debug!(request_id = %token.request_id, error = %error, "Pickup token refused");
    error
}

/// Online checks of `token` against the stored request and its current token.
fn check_against_store(
    token: &PickupToken,
    request: &Request,
    record: Option<&PickupTokenRecord>,
) -> Result<()> {
    if record.is_some_and(|r| r.is_verified() && is_current(r, token)) {
        return Err(PortalError::AlreadyUsed(token.request_id));
    }

    ensure_pickup_eligible(request)?;

    if token.subject_id != request.subject
        || request.document_type.as_deref() != Some(token.document_type.as_str())
    {
        return Err(PortalError::IntegrityError(format!(
            "token does not describe request {}",
            request.id
        )));
    }
    match record {
        None => Err(PortalError::IntegrityError(format!(
            "no pickup token has been issued for request {}",
            request.id
        ))),
        Some(current) if !is_current(current, token) => Err(PortalError::IntegrityError(format!(
            "token has been superseded for request {}",
            request.id
        ))),
        Some(_) => Ok(()),
    }
}

fn is_current(record: &PickupTokenRecord, token: &PickupToken) -> bool {
    constant_time_eq::constant_time_eq(record.checksum.as_bytes(), token.checksum.as_bytes())
}

fn ensure_pickup_eligible(request: &Request) -> Result<()> {
    if request.kind != RequestKind::Document {
        return Err(PortalError::invalid(format!(
            "request {} is an {}; only documents are picked up",
            request.id, request.kind
        )));
    }
    if request.is_archived() {
        return Err(PortalError::invalid(format!(
            "request {} is archived",
            request.id
        )));
    }
    if request.status != RequestStatus::Approved {
        return Err(PortalError::invalid(format!(
            "request {} is {}; only approved documents are picked up",
            request.id, request.status
        )));
    }
    Ok(())
}
