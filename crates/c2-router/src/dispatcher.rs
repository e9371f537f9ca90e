//! Outbound command dispatch
//!
//! Stamps an action with the current time, signs the exact serialized bytes
//! with the local key and POSTs them to a peer. There are no retries; a peer
//! that cannot be reached is reported as [`DispatchError::PeerUnreachable`].

#![warn(missing_docs)]

use crate::command_types::{
    Action, Envelope, HealthProbe, HealthStatus, PoweroffCommand, SIGNATURE_HEADER,
};
use async_trait::async_trait;
use chrono::Utc;
use cloudcontrol_core::PeerRecord;
use cloudcontrol_crypto::{encode_signature, sign, SigningError, SigningKey};
use cloudcontrol_identity::LocalKeypair;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// A non-200 body containing this text means the peer was already shutting
/// down when it answered.
pub const TERMINATED_BY_SIGNAL_MARKER: &str = "signal: terminated";

/// Dispatcher errors
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Local signing failed; nothing was sent
    #[error("cannot sign request message: {0}")]
    Signing(#[from] SigningError),

    /// Envelope could not be serialized
    #[error("cannot JSON marshal request body: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client could not be constructed
    #[error("cannot create HTTP client: {0}")]
    ClientSetup(String),

    /// Connection refused, DNS failure or timeout
    #[error("peer '{host}' unreachable: {reason}")]
    PeerUnreachable {
        /// Peer host
        host: String,
        /// Transport message
        reason: String,
    },

    /// Peer answered with a non-200 status
    #[error("remote returned error: {body}")]
    RemoteRejected {
        /// Peer host
        host: String,
        /// HTTP status code
        status: u16,
        /// Response body text
        body: String,
    },

    /// Peer answered 200 with a body that could not be read or decoded
    #[error("invalid response from '{host}': {reason}")]
    InvalidResponse {
        /// Peer host
        host: String,
        /// Decoder message
        reason: String,
    },
}

impl DispatchError {
    /// Whether the peer could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, DispatchError::PeerUnreachable { .. })
    }
}

/// Serialized envelope plus its encoded signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    /// Exact bytes that were signed
    pub body: Vec<u8>,
    /// Base64 signature for the signature header
    pub signature: String,
}

/// Serialize `envelope` and sign the resulting bytes.
pub fn sign_envelope<A: Action>(
    envelope: &Envelope<A>,
    signing_key: &SigningKey,
) -> Result<SignedRequest, DispatchError> {
    let body = envelope.to_bytes()?;
    let signature = encode_signature(&sign(&body, signing_key)?);
    Ok(SignedRequest { body, signature })
}

/// What a peer answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerResponse {
    /// HTTP status code
    pub status: u16,
    /// Complete response body
    pub body: Vec<u8>,
}

impl PeerResponse {
    /// Status 200.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Body as text, lossily.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Delivery of a signed request to a peer endpoint.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// POST `request` to `path` on `host`.
    async fn post(
        &self,
        host: &str,
        path: &str,
        request: SignedRequest,
    ) -> Result<PeerResponse, DispatchError>;
}

/// Plain HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    port: u16,
}

impl HttpTransport {
    /// Transport for peers listening on `port`, giving up on a request after
    /// `timeout`.
    pub fn new(port: u16, timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::ClientSetup(e.to_string()))?;
        Ok(Self { client, port })
    }

    /// URL of `path` on `host`.
    pub fn url(&self, host: &str, path: &str) -> String {
        format!("http://{}{}", authority(host, self.port), path)
    }
}

/// `host:port`, unless `host` already names a port.
fn authority(host: &str, port: u16) -> String {
    if let Some(rest) = host.strip_prefix('[') {
        return if rest.contains("]:") {
            host.to_string()
        } else {
            format!("{host}:{port}")
        };
    }
    match host.matches(':').count() {
        0 => format!("{host}:{port}"),
        1 => match host.rsplit_once(':') {
            Some((_, p)) if p.parse::<u16>().is_ok() => host.to_string(),
            _ => format!("{host}:{port}"),
        },
        // Bare IPv6 literal
        _ => format!("[{host}]:{port}"),
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn post(
        &self,
        host: &str,
        path: &str,
        request: SignedRequest,
    ) -> Result<PeerResponse, DispatchError> {
        let url = self.url(host, path);
        debug!(%url, "Sending signed request");

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, request.signature)
            .body(request.body)
            .send()
            .await
            .map_err(|e| DispatchError::PeerUnreachable {
                host: host.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| DispatchError::InvalidResponse {
                host: host.to_string(),
                reason: format!("cannot read response: {e}"),
            })?;

        Ok(PeerResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Result of a successful remote power-off request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoweroffOutcome {
    /// Peer answered 200
    Acknowledged,
    /// Peer was killed by the shutdown it started before it could answer
    TerminatedBySignal,
}

/// Signs and sends actions to peers on behalf of this node.
#[derive(Clone)]
pub struct CommandClient {
    keypair: Arc<LocalKeypair>,
    transport: Arc<dyn PeerTransport>,
}

impl CommandClient {
    /// Client signing with `keypair` and delivering over `transport`.
    pub fn new(keypair: Arc<LocalKeypair>, transport: Arc<dyn PeerTransport>) -> Self {
        Self { keypair, transport }
    }

    /// Stamp, sign and deliver `action` to `host`.
    pub async fn send<A: Action>(
        &self,
        host: &str,
        action: A,
    ) -> Result<PeerResponse, DispatchError> {
        let envelope = Envelope::stamp(action, Utc::now());
        let request = sign_envelope(&envelope, self.keypair.signing_key())?;
        self.transport.post(host, A::ENDPOINT, request).await
    }

    /// Ask `peer` to power off with its configured mode and delay.
    pub async fn poweroff_remote(
        &self,
        peer: &PeerRecord,
    ) -> Result<PoweroffOutcome, DispatchError> {
        let command = PoweroffCommand {
            async_poweroff: peer.async_poweroff,
            poweroff_delay_msec: peer.poweroff_delay_msec,
        };
        let response = self.send(&peer.host, command).await?;
        if response.is_ok() {
            return Ok(PoweroffOutcome::Acknowledged);
        }

        let body = response.body_text();
        if body.contains(TERMINATED_BY_SIGNAL_MARKER) {
            debug!(host = %peer.host, "Peer terminated while answering");
            return Ok(PoweroffOutcome::TerminatedBySignal);
        }
        Err(DispatchError::RemoteRejected {
            host: peer.host.clone(),
            status: response.status,
            body,
        })
    }

    /// Ask `peer` for its health status.
    pub async fn fetch_remote_health(
        &self,
        peer: &PeerRecord,
    ) -> Result<HealthStatus, DispatchError> {
        let response = self.send(&peer.host, HealthProbe {}).await?;
        if !response.is_ok() {
            let err = DispatchError::RemoteRejected {
                host: peer.host.clone(),
                status: response.status,
                body: response.body_text(),
            };
            warn!(host = %peer.host, error = %err, "Health request rejected");
            return Err(err);
        }
        serde_json::from_slice(&response.body).map_err(|e| DispatchError::InvalidResponse {
            host: peer.host.clone(),
            reason: format!("cannot decode JSON response: {e}"),
        })
    }
}
