//! End-to-end tests over real sockets
//!
//! This test suite validates:
//! - Signed commands between separately configured nodes
//! - Fan-out power-off ordering and abort behavior
//! - Status aggregation against live, unreachable and distrustful peers
//! - Replay acceptance inside the freshness window and rejection outside it
//! - Draining and cutting off requests when a node stops

pub mod test_utils;

#[cfg(test)]
mod fanout_tests;

#[cfg(test)]
mod replay_tests;

#[cfg(test)]
mod shutdown_tests;
