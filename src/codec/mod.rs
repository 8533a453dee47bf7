//! Codec module - encoding of proposal payloads.
//!
//! Proposal payloads are built from a [`ChaincodeInvocationSpec`](crate::fab::ChaincodeInvocationSpec)
//! and the same bytes go to every endorser. The client compares the endorsers'
//! responses byte-for-byte, so the encoding has to be deterministic for a given
//! request.
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (named struct fields)
//!
//! # Example
//!
//! ```
//! use fabric_channel_client::codec::MsgPackCodec;
//!
//! let encoded = MsgPackCodec::encode(&"invoke").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "invoke");
//! ```

mod msgpack;

pub use msgpack::MsgPackCodec;
