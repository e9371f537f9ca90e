use cloudcontrol_c2_router::DispatchError;
use cloudcontrol_core::ConfigError;
use cloudcontrol_identity::IdentityError;
use std::net::SocketAddr;
use thiserror::Error;

/// Node startup and serving errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

pub type NodeResult<T> = Result<T, NodeError>;
