//! Error types for busrpc.

use thiserror::Error;

/// Main error type for all busrpc operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error surfaced by a broker client.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON envelope encode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack envelope encode error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack envelope decode error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Inbound payload did not parse as a request envelope.
    #[error("invalid envelope: {0}")]
    Envelope(String),

    /// Registration rejected: the name is already bound and the registry
    /// policy is [`Reject`](crate::registry::DuplicatePolicy::Reject).
    #[error("method already registered: {0}")]
    DuplicateMethod(String),

    /// Handler-originated failure. The message travels back to the
    /// caller as a `HandlerError` fault.
    #[error("{0}")]
    Handler(String),

    /// Broker-side publish failure.
    #[error("broker error: {0}")]
    Broker(String),

    /// Broker connection or delivery channel closed.
    #[error("connection closed")]
    ConnectionClosed,
}

impl RpcError {
    /// Shorthand for a handler-originated failure.
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;
