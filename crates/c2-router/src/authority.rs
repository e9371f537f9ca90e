//! Inbound request authentication
//!
//! Every privileged request passes through the same gates, in order:
//!
//! 1. **Signature header**: present and valid base64, else `Unauthenticated`
//! 2. **Body**: read completely into memory, else `BadRequest`
//! 3. **Trust**: the signature must verify under some trusted key, else
//!    `Unauthenticated`. Which key matched is not recorded.
//! 4. **Decode**: the verified bytes must decode into the expected action
//! 5. **Timestamp**: present and RFC 3339
//! 6. **Freshness**: within the replay window of the receiver's clock
//!
//! Only an [`Authorized`] value, which nothing but the authenticator can
//! construct, is handed to an action handler. All `Unauthenticated` outcomes
//! look the same to the caller.

#![warn(missing_docs)]

use crate::command_types::{Action, Envelope, EnvelopeError};
use crate::replay_protection::{FreshnessWindow, ReplayError};
use chrono::{DateTime, Utc};
use cloudcontrol_crypto::decode_signature;
use cloudcontrol_identity::TrustedKeySet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// How a rejection is reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Signature missing, malformed or not from a trusted key (HTTP 401)
    Unauthenticated,
    /// Authentic but unusable request (HTTP 400)
    BadRequest,
}

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// No signature header
    #[error("missing signature header")]
    MissingSignature,

    /// Signature header is not base64 text
    #[error("invalid signature encoding")]
    InvalidSignatureEncoding,

    /// No trusted key verifies the signature
    #[error("signature does not match any trusted key")]
    SignatureMismatch,

    /// Request body could not be read
    #[error("cannot read request body: {0}")]
    BodyUnreadable(String),

    /// Verified body is not the expected action
    #[error("cannot JSON decode action: {0}")]
    MalformedEnvelope(String),

    /// Issue time missing or malformed
    #[error("cannot parse current time: {0}")]
    Timestamp(#[from] EnvelopeError),

    /// Issue time outside the freshness window
    #[error(transparent)]
    ReplayOrClockSkew(#[from] ReplayError),
}

impl AuthError {
    /// Caller-visible class of this error.
    pub fn rejection(&self) -> Rejection {
        match self {
            AuthError::MissingSignature
            | AuthError::InvalidSignatureEncoding
            | AuthError::SignatureMismatch => Rejection::Unauthenticated,
            AuthError::BodyUnreadable(_)
            | AuthError::MalformedEnvelope(_)
            | AuthError::Timestamp(_)
            | AuthError::ReplayOrClockSkew(_) => Rejection::BadRequest,
        }
    }

    /// Response body for the caller.
    ///
    /// Authentication failures all share one message; details are only
    /// given once the signature has been accepted.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::MissingSignature
            | AuthError::InvalidSignatureEncoding
            | AuthError::SignatureMismatch => "Unauthorized".to_string(),
            AuthError::BodyUnreadable(_) => "Bad request".to_string(),
            other => other.to_string(),
        }
    }
}

/// A request that passed every gate.
#[derive(Debug, Clone)]
pub struct Authorized<A> {
    envelope: Envelope<A>,
    issued_at: DateTime<Utc>,
    raw_body: Vec<u8>,
}

impl<A: Action> Authorized<A> {
    /// The decoded action.
    pub fn action(&self) -> &A {
        self.envelope.action()
    }

    /// When the sender issued the request.
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Exact bytes that were signed.
    pub fn raw_body(&self) -> &[u8] {
        &self.raw_body
    }

    /// Consume and return the action.
    pub fn into_action(self) -> A {
        self.envelope.into_action()
    }
}

/// Gatekeeper for every privileged inbound operation.
#[derive(Debug, Clone)]
pub struct InboundAuthenticator {
    trusted_keys: Arc<TrustedKeySet>,
    freshness: FreshnessWindow,
}

impl InboundAuthenticator {
    /// Authenticator over a shared, read-only trusted key set.
    pub fn new(trusted_keys: Arc<TrustedKeySet>, freshness: FreshnessWindow) -> Self {
        Self {
            trusted_keys,
            freshness,
        }
    }

    /// The trusted key set requests are checked against.
    pub fn trusted_keys(&self) -> &TrustedKeySet {
        &self.trusted_keys
    }

    /// Run all gates against a received request.
    ///
    /// `signature_header` is the raw value of the signature header, `body` the
    /// complete request body, and `now` the receiver's clock.
    pub fn authenticate<A: Action>(
        &self,
        signature_header: Option<&[u8]>,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Authorized<A>, AuthError> {
        let result = self.run_gates(signature_header, body, now);
        match &result {
            Ok(authorized) => debug!(
                endpoint = A::ENDPOINT,
                issued_at = %authorized.issued_at,
                "Request authorized"
            ),
            Err(e) => audit_log("AUTH_FAILED", A::ENDPOINT, &e.to_string()),
        }
        result
    }

    /// Run only the header gate, so a bad header is rejected before the body
    /// is read.
    pub fn check_header<A: Action>(&self, signature_header: Option<&[u8]>) -> Result<(), AuthError> {
        decode_signature_header(signature_header)
            .map(|_| ())
            .map_err(|e| {
                audit_log("AUTH_FAILED", A::ENDPOINT, &e.to_string());
                e
            })
    }

    fn run_gates<A: Action>(
        &self,
        signature_header: Option<&[u8]>,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Authorized<A>, AuthError> {
        // Step 1: Signature header
        let signature = decode_signature_header(signature_header)?;

        // Step 2: Membership in the trusted set, over the exact received bytes
        if !self.trusted_keys.verify_any(body, &signature) {
            return Err(AuthError::SignatureMismatch);
        }

        // Step 3: Decode only what was verified
        let envelope: Envelope<A> = serde_json::from_slice(body)
            .map_err(|e| AuthError::MalformedEnvelope(e.to_string()))?;

        // Step 4: Timestamp and freshness
        let issued_at = envelope.parse_timestamp()?;
        self.freshness.check(issued_at, now)?;

        Ok(Authorized {
            envelope,
            issued_at,
            raw_body: body.to_vec(),
        })
    }
}

/// Decode the raw signature header value.
pub fn decode_signature_header(signature_header: Option<&[u8]>) -> Result<Vec<u8>, AuthError> {
    let header = signature_header.ok_or(AuthError::MissingSignature)?;
    let header = std::str::from_utf8(header).map_err(|_| AuthError::InvalidSignatureEncoding)?;
    if header.is_empty() {
        return Err(AuthError::MissingSignature);
    }
    decode_signature(header).map_err(|_| AuthError::InvalidSignatureEncoding)
}

/// Audit log helper - structured logging for security decisions
fn audit_log(action: &str, target: &str, result: &str) {
    info!(
        "[AUDIT] Action={} Target={} Result={}",
        action, target, result
    );
}
