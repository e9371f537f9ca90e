//! Command envelope definitions
//!
//! Every privileged request between nodes is a JSON object holding the issue
//! time (`CurrentTime`) next to the action's own fields:
//!
//! ```json
//! {"CurrentTime":"2024-05-01T12:00:00Z","Async":true,"PoweroffDelayMsec":0}
//! ```
//!
//! The sender stamps the envelope immediately before signing it; the receiver
//! consumes it once and never stores it.

#![warn(missing_docs)]

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Header carrying the base64 signature of the request body.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Status reported by a healthy node.
pub const HEALTH_STATUS_ONLINE: &str = "online";

/// Envelope decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// No issue time in the envelope
    #[error("no current time set")]
    TimestampMissing,

    /// Issue time is not RFC 3339
    #[error("invalid current time '{value}': {reason}")]
    TimestampFormatInvalid {
        /// Raw timestamp text
        value: String,
        /// Parser message
        reason: String,
    },
}

/// A command or probe that can travel in an [`Envelope`].
pub trait Action: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Path of the node endpoint that accepts this action.
    const ENDPOINT: &'static str;
}

/// Power the receiving node off.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoweroffCommand {
    /// Acknowledge immediately and power off in the background
    #[serde(rename = "Async", default)]
    pub async_poweroff: bool,
    /// Wait this long before powering off
    #[serde(rename = "PoweroffDelayMsec", default)]
    pub poweroff_delay_msec: u64,
}

impl PoweroffCommand {
    /// Delay before the power-off as a [`Duration`].
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.poweroff_delay_msec)
    }
}

impl Action for PoweroffCommand {
    const ENDPOINT: &'static str = "/node/execute/poweroff";
}

/// Ask the receiving node whether it is up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthProbe {}

impl Action for HealthProbe {
    const ENDPOINT: &'static str = "/node/health";
}

/// Response body of the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `online` for a healthy node
    #[serde(rename = "Status")]
    pub status: String,
}

impl HealthStatus {
    /// The status a node reports about itself.
    pub fn online() -> Self {
        Self {
            status: HEALTH_STATUS_ONLINE.to_string(),
        }
    }
}

/// An action plus the time it was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<A> {
    #[serde(rename = "CurrentTime", default)]
    current_time: String,
    #[serde(flatten)]
    action: A,
}

impl<A: Action> Envelope<A> {
    /// Envelope with no issue time yet.
    pub fn new(action: A) -> Self {
        Self {
            current_time: String::new(),
            action,
        }
    }

    /// Envelope issued at `now`.
    pub fn stamp(action: A, now: DateTime<Utc>) -> Self {
        let mut envelope = Self::new(action);
        envelope.set_current_time(now);
        envelope
    }

    /// Set the issue time. Second precision is all the freshness check needs.
    pub fn set_current_time(&mut self, now: DateTime<Utc>) {
        self.current_time = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    }

    /// Raw issue time as transmitted.
    pub fn current_time(&self) -> &str {
        &self.current_time
    }

    /// Parse the issue time.
    pub fn parse_timestamp(&self) -> Result<DateTime<Utc>, EnvelopeError> {
        if self.current_time.is_empty() {
            return Err(EnvelopeError::TimestampMissing);
        }
        DateTime::parse_from_rfc3339(&self.current_time)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| EnvelopeError::TimestampFormatInvalid {
                value: self.current_time.clone(),
                reason: e.to_string(),
            })
    }

    /// The carried action.
    pub fn action(&self) -> &A {
        &self.action
    }

    /// Consume the envelope and return the action.
    pub fn into_action(self) -> A {
        self.action
    }

    /// Canonical bytes of this envelope; these are the bytes that get signed.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
