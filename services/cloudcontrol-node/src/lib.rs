//! CloudControl node: the HTTP surface of a node.
//!
//! Serves the signed node endpoints (`/node/execute/poweroff`,
//! `/node/health`) and, when enabled, the operator webadmin.

pub mod cli;
pub mod error;
pub mod handlers;
pub mod server;
pub mod state;
pub mod webadmin;

pub use error::{NodeError, NodeResult};
pub use server::{router, serve};
pub use state::{NodeState, NodeStateBuilder};
