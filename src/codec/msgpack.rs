//! MsgPack codec using `rmp-serde`.
//!
//! Always encodes with `to_vec_named` so envelope structs travel as
//! maps keyed by field name. Positional (array) encoding would break
//! any peer that decodes envelopes by key, and silently ties the wire
//! layout to Rust field order.
//!
//! # Example
//!
//! ```
//! use busrpc::codec::MsgPackCodec;
//! use busrpc::{RpcRequest, Value};
//!
//! let request = RpcRequest::new("echo", vec![Value::from("hi")], "1");
//! let encoded = MsgPackCodec::encode(&request).unwrap();
//! let decoded: RpcRequest = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, request);
//! ```

use crate::error::Result;

/// MessagePack codec for envelope payloads.
///
/// Uses `rmp_serde::to_vec_named` for struct-as-map format.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{RpcRequest, RpcResponse};
    use crate::value::Value;

    #[test]
    fn test_encode_decode_request() {
        let request = RpcRequest::new(
            "save",
            vec![Value::from("user-1"), Value::bytes(vec![1, 2, 3])],
            "4",
        );

        let encoded = MsgPackCodec::encode(&request).unwrap();
        let decoded: RpcRequest = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_struct_as_map_format() {
        // Envelopes must travel as maps (0x8X), not positional arrays.
        let encoded = MsgPackCodec::encode(&RpcResponse::ok("1", Value::Null)).unwrap();
        assert_eq!(
            encoded[0] & 0xF0,
            0x80,
            "expected map format (0x8X), got {:02X}",
            encoded[0]
        );
    }

    #[test]
    fn test_binary_value_uses_bin_format() {
        let encoded = MsgPackCodec::encode(&Value::bytes(vec![5u8; 4])).unwrap();
        // bin8 marker, not an array of integers
        assert_eq!(encoded[0], 0xc4);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<RpcRequest> = MsgPackCodec::decode(b"not valid msgpack");
        assert!(result.is_err());
    }
}
