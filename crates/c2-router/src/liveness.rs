//! Network liveness of peers, independent of the signed protocol.

#![warn(missing_docs)]

use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Upper bound on a single ping run; `ping -w 1` normally finishes well inside it.
pub const PING_GUARD_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether a peer answered the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingStatus {
    /// Peer answered
    Online,
    /// No answer
    Offline,
}

impl PingStatus {
    /// Status string shown to operators.
    pub fn as_str(&self) -> &'static str {
        match self {
            PingStatus::Online => "online",
            PingStatus::Offline => "offline",
        }
    }
}

/// The probe itself failed, so nothing is known about the peer.
#[derive(Debug, Error)]
#[error("cannot ping remote: {reason}")]
pub struct ProbeError {
    /// What went wrong
    pub reason: String,
}

impl ProbeError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Reachability check for a peer host.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Probe `host` once.
    async fn probe(&self, host: &str) -> Result<PingStatus, ProbeError>;
}

/// ICMP probe through the system `ping` binary.
#[derive(Debug, Clone)]
pub struct PingProbe {
    program: String,
    guard: Duration,
}

impl PingProbe {
    /// Probe with the system `ping`.
    pub fn new() -> Self {
        Self::with_program("ping")
    }

    /// Probe with another program taking the same arguments.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            guard: PING_GUARD_TIMEOUT,
        }
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LivenessProbe for PingProbe {
    async fn probe(&self, host: &str) -> Result<PingStatus, ProbeError> {
        let child = Command::new(&self.program)
            .args([host, "-c", "1", "-w", "1", "-q"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProbeError::new(e.to_string()))?;

        let output = tokio::time::timeout(self.guard, child.wait_with_output())
            .await
            .map_err(|_| ProbeError::new(format!("timed out after {:?}", self.guard)))?
            .map_err(|e| ProbeError::new(e.to_string()))?;

        classify_exit(output.status, &output.stderr)
    }
}

fn classify_exit(status: ExitStatus, stderr: &[u8]) -> Result<PingStatus, ProbeError> {
    match status.code() {
        Some(0) => Ok(PingStatus::Online),
        Some(1) => Ok(PingStatus::Offline),
        _ => {
            let stderr = String::from_utf8_lossy(stderr);
            let stderr = stderr.trim();
            if stderr.is_empty() {
                Err(ProbeError::new(status.to_string()))
            } else {
                Err(ProbeError::new(format!("{status}: {stderr}")))
            }
        }
    }
}
