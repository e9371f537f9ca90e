//! Fan-out over the configured peers
//!
//! Peers are always visited one at a time, in configuration order.

#![warn(missing_docs)]

use crate::dispatcher::{CommandClient, DispatchError, PoweroffOutcome};
use crate::executor::{ExecuteError, PowerExecutor};
use crate::liveness::LivenessProbe;
use cloudcontrol_core::PeerRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Health status reported for a peer that cannot be reached.
pub const HEALTH_STATUS_OFFLINE: &str = "offline";

/// Fan-out errors
#[derive(Debug, Error)]
pub enum FanoutError {
    /// A peer failed; later peers were not contacted
    #[error("cannot poweroff remote '{host}': {source}")]
    Peer {
        /// Peer that failed
        host: String,
        /// Underlying dispatch error
        #[source]
        source: DispatchError,
    },

    /// All peers were handled but this node could not power off
    #[error("cannot poweroff self: {0}")]
    LocalPoweroff(#[from] ExecuteError),
}

/// Observed state of one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PeerStatus {
    /// Peer host
    pub host: String,
    /// `online`, `offline` or the probe error
    pub ping_status: String,
    /// Status the peer reported, `offline`, or the error
    pub health_status: String,
}

/// Runs operations across every configured peer.
#[derive(Clone)]
pub struct Orchestrator {
    peers: Arc<Vec<PeerRecord>>,
    client: CommandClient,
    probe: Arc<dyn LivenessProbe>,
    executor: PowerExecutor,
}

impl Orchestrator {
    /// Orchestrator over `peers`.
    pub fn new(
        peers: Vec<PeerRecord>,
        client: CommandClient,
        probe: Arc<dyn LivenessProbe>,
        executor: PowerExecutor,
    ) -> Self {
        Self {
            peers: Arc::new(peers),
            client,
            probe,
            executor,
        }
    }

    /// Configured peers, in order.
    pub fn peers(&self) -> &[PeerRecord] {
        &self.peers
    }

    /// Probe and health-check every peer. Never fails; per-peer errors become
    /// status text.
    pub async fn aggregate_status(&self) -> Vec<PeerStatus> {
        let mut statuses = Vec::with_capacity(self.peers.len());

        for peer in self.peers.iter() {
            let ping_status = match self.probe.probe(&peer.host).await {
                Ok(status) => status.as_str().to_string(),
                Err(e) => {
                    warn!(host = %peer.host, error = %e, "Ping failed");
                    e.to_string()
                }
            };

            let health_status = match self.client.fetch_remote_health(peer).await {
                Ok(health) => health.status,
                Err(e) if e.is_unreachable() => {
                    warn!(host = %peer.host, error = %e, "Cannot fetch remote health");
                    HEALTH_STATUS_OFFLINE.to_string()
                }
                Err(e) => {
                    warn!(host = %peer.host, error = %e, "Cannot fetch remote health");
                    e.to_string()
                }
            };

            statuses.push(PeerStatus {
                host: peer.host.clone(),
                ping_status,
                health_status,
            });
        }

        statuses
    }

    /// Power off every peer, then this node.
    ///
    /// The first peer error aborts the run before anything else is contacted,
    /// and this node stays up.
    pub async fn poweroff_all_and_self(&self) -> Result<(), FanoutError> {
        for peer in self.peers.iter() {
            match self.client.poweroff_remote(peer).await {
                Ok(PoweroffOutcome::Acknowledged) => {
                    info!(host = %peer.host, "Remote acknowledged poweroff");
                }
                Ok(PoweroffOutcome::TerminatedBySignal) => {
                    info!(host = %peer.host, "Remote terminated while powering off");
                }
                Err(source) => {
                    error!(host = %peer.host, error = %source, "Cannot poweroff remote");
                    return Err(FanoutError::Peer {
                        host: peer.host.clone(),
                        source,
                    });
                }
            }
        }

        info!(peers = self.peers.len(), "All remotes handled, powering off self");
        self.executor.run(Duration::ZERO).await?;
        Ok(())
    }
}
