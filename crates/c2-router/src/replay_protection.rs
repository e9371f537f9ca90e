//! Replay protection for inbound commands
//!
//! The only replay defense is a freshness window on the envelope's issue
//! time: the receiver rejects any envelope whose timestamp is 60 seconds or
//! more away from its own clock, in either direction. There is no nonce or
//! sequence tracking, so an identical request is accepted again for as long
//! as it stays inside the window.

#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Maximum clock difference between sender and receiver (exclusive).
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(60);

/// Replay protection error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplayError {
    /// Envelope is too old, too far in the future, or the clocks disagree
    #[error("current time deviates too far: {skew_secs} seconds (max: {max_secs} seconds)")]
    ReplayOrClockSkew {
        /// Absolute difference in whole seconds
        skew_secs: u64,
        /// Configured window in whole seconds
        max_secs: u64,
    },
}

/// Stateless timestamp freshness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessWindow {
    max_skew: Duration,
}

impl FreshnessWindow {
    /// Window of `max_skew`; envelopes at or beyond it are rejected.
    pub fn new(max_skew: Duration) -> Self {
        Self { max_skew }
    }

    /// The configured window.
    pub fn max_skew(&self) -> Duration {
        self.max_skew
    }

    /// Accept `issued_at` only if `|now - issued_at| < window`.
    pub fn check(&self, issued_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), ReplayError> {
        let skew = if now >= issued_at {
            now - issued_at
        } else {
            issued_at - now
        };
        let skew = skew.to_std().unwrap_or(Duration::MAX);

        if skew >= self.max_skew {
            return Err(ReplayError::ReplayOrClockSkew {
                skew_secs: skew.as_secs(),
                max_secs: self.max_skew.as_secs(),
            });
        }
        Ok(())
    }
}

impl Default for FreshnessWindow {
    fn default() -> Self {
        Self::new(FRESHNESS_WINDOW)
    }
}
