//! C2 Router - signed command routing between CloudControl nodes
//!
//! This crate carries every privileged exchange between nodes:
//! - Action envelope definitions (power-off, health)
//! - Inbound authentication against the trusted key set
//! - Timestamp freshness as the replay defense
//! - Outbound signing and delivery to peers
//! - Local power-off execution, foreground or detached
//! - Fan-out over all configured peers
//!
//! # Architecture
//!
//! An inbound request flows through:
//! 1. Signature header decoded and checked by `InboundAuthenticator`
//! 2. Verified body decoded into an `Envelope`
//! 3. Issue time checked by `FreshnessWindow`
//! 4. The resulting `Authorized` action handed to the node's handler
//!
//! An outbound command flows through `CommandClient`: stamp, sign the exact
//! bytes, POST with the signature header.
//!
//! # Examples
//!
//! ```no_run
//! use cloudcontrol_c2_router::{CommandClient, HttpTransport};
//! use cloudcontrol_core::{PeerRecord, DEFAULT_NODE_PORT};
//! use cloudcontrol_crypto::generate_signing_key;
//! use cloudcontrol_identity::LocalKeypair;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let keypair = Arc::new(LocalKeypair::from_signing_key(generate_signing_key()?));
//! let transport = Arc::new(HttpTransport::new(DEFAULT_NODE_PORT, Duration::from_secs(5))?);
//! let client = CommandClient::new(keypair, transport);
//!
//! let health = client.fetch_remote_health(&PeerRecord::new("10.0.0.2")).await?;
//! println!("{}", health.status);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod authority;
pub mod command_types;
pub mod dispatcher;
pub mod executor;
pub mod fanout;
pub mod liveness;
pub mod replay_protection;

// Re-export commonly used types
pub use authority::{
    decode_signature_header, AuthError, Authorized, InboundAuthenticator, Rejection,
};
pub use command_types::{
    Action, Envelope, EnvelopeError, HealthProbe, HealthStatus, PoweroffCommand,
    HEALTH_STATUS_ONLINE, SIGNATURE_HEADER,
};
pub use dispatcher::{
    sign_envelope, CommandClient, DispatchError, HttpTransport, PeerResponse, PeerTransport,
    PoweroffOutcome, SignedRequest, TERMINATED_BY_SIGNAL_MARKER,
};
pub use executor::{
    spawn_failure_sink, ExecuteError, PowerController, PowerExecutor, SystemPowerController,
};
pub use fanout::{FanoutError, Orchestrator, PeerStatus, HEALTH_STATUS_OFFLINE};
pub use liveness::{LivenessProbe, PingProbe, PingStatus, ProbeError};
pub use replay_protection::{FreshnessWindow, ReplayError, FRESHNESS_WINDOW};
