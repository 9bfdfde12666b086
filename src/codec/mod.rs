//! Codec module - envelope serialization at the broker boundary.
//!
//! The broker delivers and accepts opaque byte payloads; which encoding
//! those bytes carry is part of the broker-integration contract, not of
//! the dispatch core. Two envelope codecs are provided:
//!
//! - [`JsonCodec`] - UTF-8 JSON envelopes
//! - [`MsgPackCodec`] - MessagePack (struct-as-map encoding)
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait
//! objects; [`WireFormat`] selects one at host-configuration time.
//!
//! # Example
//!
//! ```
//! use busrpc::{RpcRequest, Value, WireFormat};
//!
//! let wire = WireFormat::Json;
//! let request = RpcRequest::new("echo", vec![Value::from("hi")], "1");
//!
//! let payload = wire.encode_request(&request).unwrap();
//! let decoded = wire.decode_request(&payload).unwrap();
//! assert_eq!(decoded, request);
//! ```

mod json;
mod msgpack;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

use crate::error::{Result, RpcError};
use crate::message::{RpcRequest, RpcResponse};

/// Envelope encoding used by a host and its callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// UTF-8 JSON envelopes.
    #[default]
    Json,
    /// MessagePack envelopes.
    MsgPack,
}

impl WireFormat {
    /// Decode an inbound payload into a request envelope.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Envelope`] when the payload does not parse
    /// as a request in this format.
    pub fn decode_request(&self, payload: &[u8]) -> Result<RpcRequest> {
        let decoded = match self {
            Self::Json => JsonCodec::decode(payload),
            Self::MsgPack => MsgPackCodec::decode(payload),
        };
        decoded.map_err(|err| RpcError::Envelope(err.to_string()))
    }

    /// Encode a request envelope (caller side).
    pub fn encode_request(&self, request: &RpcRequest) -> Result<Vec<u8>> {
        match self {
            Self::Json => JsonCodec::encode(request),
            Self::MsgPack => MsgPackCodec::encode(request),
        }
    }

    /// Decode an inbound payload into a response envelope (caller side).
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Envelope`] when the payload does not parse
    /// as a response in this format.
    pub fn decode_response(&self, payload: &[u8]) -> Result<RpcResponse> {
        let decoded = match self {
            Self::Json => JsonCodec::decode(payload),
            Self::MsgPack => MsgPackCodec::decode(payload),
        };
        decoded.map_err(|err| RpcError::Envelope(err.to_string()))
    }

    /// Encode a response envelope.
    pub fn encode_response(&self, response: &RpcResponse) -> Result<Vec<u8>> {
        match self {
            Self::Json => JsonCodec::encode(response),
            Self::MsgPack => MsgPackCodec::encode(response),
        }
    }
}
