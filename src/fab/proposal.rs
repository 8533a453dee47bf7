//! Transaction proposals and the responses endorsers return for them.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::MsgPackCodec;
use crate::error::{ChannelError, Result};

/// Lowest chaincode status treated as success.
pub const STATUS_SUCCESS: i32 = 200;

/// First chaincode status treated as failure.
pub const STATUS_BAD_REQUEST: i32 = 400;

/// Identifier of a transaction proposal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Wrap an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the placeholder used when no transaction exists.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TransactionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Transaction metadata produced by the transactor before a proposal is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionHeader {
    /// Transaction identifier, derived from nonce and creator by the transactor.
    pub tx_id: TransactionId,
    /// Serialized identity of the submitting client.
    pub creator: Bytes,
    /// Random nonce.
    pub nonce: Bytes,
    /// Channel the transaction targets.
    pub channel_id: String,
}

/// Chaincode call encoded into the proposal payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeInvocationSpec {
    pub channel_id: String,
    pub tx_id: TransactionId,
    pub chaincode_id: String,
    pub fcn: String,
    pub args: Vec<Bytes>,
    pub transient_map: BTreeMap<String, Bytes>,
}

/// Unsigned proposal ready to be signed and sent to endorsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionProposal {
    pub tx_id: TransactionId,
    pub header: TransactionHeader,
    /// MsgPack-encoded [`ChaincodeInvocationSpec`].
    pub payload: Bytes,
}

impl TransactionProposal {
    /// Build a proposal for a chaincode call under the given header.
    pub fn new(
        header: TransactionHeader,
        chaincode_id: &str,
        fcn: &str,
        args: &[Bytes],
        transient_map: &HashMap<String, Bytes>,
    ) -> Result<Self> {
        if chaincode_id.is_empty() {
            return Err(ChannelError::InvalidRequest(
                "chaincode id is required".to_string(),
            ));
        }
        if fcn.is_empty() {
            return Err(ChannelError::InvalidRequest(
                "function name is required".to_string(),
            ));
        }

        let spec = ChaincodeInvocationSpec {
            channel_id: header.channel_id.clone(),
            tx_id: header.tx_id.clone(),
            chaincode_id: chaincode_id.to_string(),
            fcn: fcn.to_string(),
            args: args.to_vec(),
            transient_map: transient_map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        let payload = Bytes::from(MsgPackCodec::encode(&spec)?);

        Ok(Self {
            tx_id: header.tx_id.clone(),
            header,
            payload,
        })
    }

    /// Decode the invocation spec carried in the payload.
    pub fn invocation_spec(&self) -> Result<ChaincodeInvocationSpec> {
        MsgPackCodec::decode(&self.payload)
    }
}

/// Proposal bytes with the client's signature over them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedProposal {
    pub proposal_bytes: Bytes,
    pub signature: Bytes,
}

/// Request handed to a single proposal processor.
#[derive(Debug, Clone)]
pub struct ProcessProposalRequest {
    pub signed_proposal: SignedProposal,
}

/// Chaincode-level result inside a proposal response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChaincodeResponse {
    pub status: i32,
    pub message: String,
    pub payload: Bytes,
}

/// Endorser signature over the response payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endorsement {
    pub endorser: Bytes,
    pub signature: Bytes,
}

/// One peer's simulation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionProposalResponse {
    /// Endorsing peer identity (usually its URL).
    pub endorser: String,
    /// Status reported by the peer.
    pub status: i32,
    /// Simulation result. Compared byte-for-byte across endorsers.
    pub payload: Bytes,
    /// Chaincode response carried inside the simulation result.
    pub response: ChaincodeResponse,
    pub endorsement: Endorsement,
}

impl TransactionProposalResponse {
    /// True when the chaincode status is in the success range.
    #[inline]
    pub fn is_success(&self) -> bool {
        (STATUS_SUCCESS..STATUS_BAD_REQUEST).contains(&self.response.status)
    }
}
