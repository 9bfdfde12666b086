//! Request and response envelopes.
//!
//! [`RpcRequest`] is produced by the inbound decoder and consumed
//! exactly once by the dispatcher; [`RpcResponse`] is produced by the
//! dispatcher and consumed by the outbound encoder. Both are plain
//! value objects - no component keeps them past its own stage.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// One inbound RPC request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RpcRequest {
    /// Method name to resolve.
    pub method: String,
    /// Ordered, untyped arguments.
    #[serde(default)]
    pub params: Vec<Value>,
    /// Correlation id, opaque to this layer.
    pub id: String,
    /// Optional reply destination carried in the envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Vec<Value>, id: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params,
            id: id.into(),
            reply_to: None,
        }
    }

    /// Set the envelope-level reply destination.
    #[must_use]
    pub fn with_reply_to(mut self, destination: impl Into<String>) -> Self {
        self.reply_to = Some(destination.into());
        self
    }
}

/// Error kinds reported back to callers.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    /// No handler bound to the requested method name.
    MethodNotFound,
    /// Declared arity did not match the argument count.
    InvalidArguments,
    /// The handler failed during execution.
    HandlerError,
    /// The handler exceeded the configured deadline.
    Timeout,
    /// Broker-level delivery failure, surfaced by the hosting system.
    /// Not produced by the dispatcher itself.
    Transport,
}

/// Structured error descriptor carried in an error response.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(FaultKind::MethodNotFound, method)
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new(FaultKind::InvalidArguments, message)
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self::new(FaultKind::HandlerError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Timeout, message)
    }

    /// Broker-level delivery failure, synthesized by the hosting system
    /// (e.g. a caller-side client giving up on a lost connection).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Transport, message)
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// One outbound RPC response: the request's correlation id plus either
/// a success payload or a fault, never both.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RpcResponse {
    /// Correlation id copied from the originating request.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Fault>,
}

impl RpcResponse {
    /// Success response.
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Error response.
    pub fn fault(id: impl Into<String>, fault: Fault) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(fault),
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Unpack into the caller-facing result shape.
    pub fn into_result(self) -> std::result::Result<Value, Fault> {
        match self.error {
            Some(fault) => Err(fault),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}
