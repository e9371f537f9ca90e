//! Core functionality for the CloudControl node system.
//!
//! This crate provides the configuration model, the on-disk layout of a node
//! directory, and logging initialization shared by every other crate in the
//! workspace. Configuration is always an explicit value: it is loaded once at
//! startup and handed to the components that need it.

pub mod config;
pub mod logging;

pub use config::{
    Config, ConfigError, NodePaths, NodeSettings, PeerRecord, WebAdminConfig, DEFAULT_NODE_PORT,
};
