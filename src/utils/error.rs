//! Error types for `relaysub`.
//!
//! Only `Startup` and `Config` are fatal; they surface from
//! `ProxyService::start` and `load_config`. Everything else is scoped to a
//! single connection or frame and is logged by the transport, never
//! propagated past it.

use std::io;

use thiserror::Error;

use crate::connection::ConnectionId;
use crate::transport::frame::FrameError;

pub type Result<T> = std::result::Result<T, ProxyError>;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to bind {endpoint} endpoint on {addr}: {source}")]
    Startup {
        endpoint: &'static str,
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("transport failure on {id}: {source}")]
    Transport {
        id: ConnectionId,
        #[source]
        source: tungstenite::Error,
    },

    #[error("malformed frame: {0}")]
    Protocol(#[from] FrameError),

    #[error("{0} evicted: outbound queue stayed above its high-water mark")]
    SlowConsumer(ConnectionId),

    #[error("connection limit of {0} reached")]
    ConnectionLimit(usize),

    #[error("proxy is draining and no longer accepts connections")]
    Draining,
}

impl ProxyError {
    /// Whether the error should abort the whole proxy rather than a single
    /// connection or frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProxyError::Startup { .. } | ProxyError::Config(_))
    }
}
