use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::listener::ListenerState;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("listener is {actual:?}, this requires {expected:?}")]
    InvalidState { expected: ListenerState, actual: ListenerState },

    #[error("listener was shut down before it started")]
    Cancelled,
}

impl ServerError {
    pub fn bind(address: SocketAddr, source: io::Error) -> Self {
        Self::Bind { address, source }
    }

    pub fn invalid_state(expected: ListenerState, actual: ListenerState) -> Self {
        Self::InvalidState { expected, actual }
    }
}

#[derive(Debug, Error)]
pub enum ServerBuildError {
    #[error("processor must be set")]
    MissingProcessor,
    #[error("pool size must be at least 1")]
    EmptyPool,
}
