//! Pickup token payload and checksum.
//!
//! The payload is the JSON text encoded in the QR code:
//!
//! ```json
//! {
//!   "type": "pickup_verification",
//!   "requestId": "6f1c…",
//!   "subjectId": "2024-0001",
//!   "documentType": "Form 137",
//!   "issuedAt": "2025-01-01T00:00:00Z",
//!   "checksum": "Yx3…"
//! }
//! ```
//!
//! The checksum is the first 16 bytes of a SHA-256 digest over a server-side
//! secret and every other field, joined with the ASCII unit separator (0x1F),
//! encoded as base64url without padding.

use crate::error::{PortalError, Result};
use crate::types::{RequestId, SubjectId};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, SecondsFormat, SubsecRound, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Value of the payload's `type` field.
pub const TOKEN_TYPE: &str = "pickup_verification";

const SEPARATOR: [u8; 1] = [0x1F];
const CHECKSUM_BYTES: usize = 16;

/// Machine-readable pickup credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupToken {
    /// Always [`TOKEN_TYPE`]
    #[serde(rename = "type")]
    pub token_type: String,
    /// Document request the token is for
    pub request_id: RequestId,
    /// Student the document belongs to
    pub subject_id: SubjectId,
    /// Requested document
    pub document_type: String,
    /// Issue time, whole seconds
    pub issued_at: DateTime<Utc>,
    /// Integrity checksum over the other fields
    pub checksum: String,
}

impl PickupToken {
    /// Parse payload text.
    ///
    /// Only the structure is checked here; the checksum is checked by
    /// [`TokenSigner::verify`].
    ///
    /// # Errors
    ///
    /// [`PortalError::MalformedToken`] if the text is not a pickup token.
    pub fn decode(payload: &str) -> Result<Self> {
        let token: Self = serde_json::from_str(payload.trim())
            .map_err(|e| PortalError::MalformedToken(e.to_string()))?;

        if token.token_type != TOKEN_TYPE {
            return Err(PortalError::MalformedToken(format!(
                "unexpected token type '{}'",
                token.token_type
            )));
        }
        if token.checksum.is_empty() || token.document_type.trim().is_empty() {
            return Err(PortalError::MalformedToken(
                "checksum and documentType are required".to_string(),
            ));
        }
        if token.issued_at.nanosecond() != 0 {
            return Err(PortalError::MalformedToken(
                "issuedAt must be whole seconds".to_string(),
            ));
        }
        Ok(token)
    }

    /// Serialize to payload text.
    ///
    /// # Errors
    ///
    /// [`PortalError::Internal`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| PortalError::Internal(e.to_string()))
    }
}

/// Computes and checks pickup token checksums.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Arc<[u8]>,
}

impl TokenSigner {
    /// Create a signer for `secret`.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: Arc::from(secret.as_ref()),
        }
    }

    /// Build a signed token. `issued_at` is truncated to whole seconds.
    #[must_use]
    pub fn issue(
        &self,
        request_id: RequestId,
        subject_id: SubjectId,
        document_type: String,
        issued_at: DateTime<Utc>,
    ) -> PickupToken {
        let mut token = PickupToken {
            token_type: TOKEN_TYPE.to_string(),
            request_id,
            subject_id,
            document_type,
            issued_at: issued_at.trunc_subsecs(0),
            checksum: String::new(),
        };
        token.checksum = self.checksum(&token);
        token
    }

    /// Checksum over every field of `token` except `checksum`.
    #[must_use]
    pub fn checksum(&self, token: &PickupToken) -> String {
        let request_id = token.request_id.to_string();
        let issued_at = token.issued_at.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        for field in [
            token.token_type.as_str(),
            request_id.as_str(),
            token.subject_id.as_str(),
            token.document_type.as_str(),
            issued_at.as_str(),
        ] {
            hasher.update(SEPARATOR);
            hasher.update(field.as_bytes());
        }
        let digest = hasher.finalize();

        URL_SAFE_NO_PAD.encode(&digest[..CHECKSUM_BYTES])
    }

    /// Recompute the checksum and compare in constant time.
    ///
    /// # Errors
    ///
    /// [`PortalError::IntegrityError`] on mismatch.
    pub fn verify(&self, token: &PickupToken) -> Result<()> {
        let expected = self.checksum(token);
        if constant_time_eq::constant_time_eq(expected.as_bytes(), token.checksum.as_bytes()) {
            Ok(())
        } else {
            Err(PortalError::IntegrityError(format!(
                "checksum does not match pickup token for request {}",
                token.request_id
            )))
        }
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"<redacted>")
            .finish()
    }
}
