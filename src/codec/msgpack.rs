//! MsgPack codec using `rmp-serde`.
//!
//! Structs are written with `to_vec_named` so that peers decoding the
//! invocation spec see field names instead of positions. Map-typed fields
//! such as the transient map are `BTreeMap`s, which keeps the output stable
//! across calls with the same request.

use crate::error::Result;

/// MessagePack codec for structured payloads.
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
    use bytes::Bytes;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Invocation {
        chaincode_id: String,
        fcn: String,
        args: Vec<Bytes>,
    }

    #[test]
    fn test_encode_decode_struct() {
        let original = Invocation {
            chaincode_id: "testCC".to_string(),
            fcn: "invoke".to_string(),
            args: vec![Bytes::from_static(b"query"), Bytes::from_static(b"b")],
        };

        let encoded = MsgPackCodec::encode(&original).unwrap();
        let decoded: Invocation = MsgPackCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_to_vec_named_produces_map_format() {
        let inv = Invocation {
            chaincode_id: "cc".to_string(),
            fcn: "f".to_string(),
            args: vec![],
        };

        let encoded = MsgPackCodec::encode(&inv).unwrap();

        // fixmap with 3 entries, not fixarray
        assert_eq!(encoded[0], 0x83, "Expected map format, got {:02X}", encoded[0]);
    }

    #[test]
    fn test_bytes_encode_as_binary() {
        let encoded = MsgPackCodec::encode(&Bytes::from_static(&[1, 2, 3])).unwrap();
        assert_eq!(encoded[0], 0xc4, "Expected bin8 format");
    }

    #[test]
    fn test_encoding_is_stable_for_equal_maps() {
        let mut first = BTreeMap::new();
        first.insert("b".to_string(), Bytes::from_static(b"2"));
        first.insert("a".to_string(), Bytes::from_static(b"1"));

        let mut second = BTreeMap::new();
        second.insert("a".to_string(), Bytes::from_static(b"1"));
        second.insert("b".to_string(), Bytes::from_static(b"2"));

        assert_eq!(
            MsgPackCodec::encode(&first).unwrap(),
            MsgPackCodec::encode(&second).unwrap()
        );
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let invalid = b"not valid msgpack";
        let result: Result<Invocation> = MsgPackCodec::decode(invalid);
        assert!(result.is_err());
    }
}
