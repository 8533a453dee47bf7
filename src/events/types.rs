//! Ledger event value types.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::fab::TransactionId;

/// Post-ordering verdict on a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum TxValidationCode {
    Valid = 0,
    NilEnvelope = 1,
    BadPayload = 2,
    BadCommonHeader = 3,
    BadCreatorSignature = 4,
    InvalidEndorserTransaction = 5,
    InvalidConfigTransaction = 6,
    UnsupportedTxPayload = 7,
    BadProposalTxId = 8,
    DuplicateTxId = 9,
    EndorsementPolicyFailure = 10,
    MvccReadConflict = 11,
    PhantomReadConflict = 12,
    UnknownTxType = 13,
    TargetChainNotFound = 14,
    MarshalTxError = 15,
    NilTxAction = 16,
    ExpiredChaincode = 17,
    ChaincodeVersionConflict = 18,
    BadHeaderExtension = 19,
    BadChannelHeader = 20,
    BadResponsePayload = 21,
    BadRwset = 22,
    IllegalWriteset = 23,
    InvalidWriteset = 24,
    NotValidated = 254,
    InvalidOtherReason = 255,
}

impl TxValidationCode {
    /// Map a wire value to a code. Unknown values become `InvalidOtherReason`.
    pub fn from_i32(value: i32) -> Self {
        use TxValidationCode::*;
        match value {
            0 => Valid,
            1 => NilEnvelope,
            2 => BadPayload,
            3 => BadCommonHeader,
            4 => BadCreatorSignature,
            5 => InvalidEndorserTransaction,
            6 => InvalidConfigTransaction,
            7 => UnsupportedTxPayload,
            8 => BadProposalTxId,
            9 => DuplicateTxId,
            10 => EndorsementPolicyFailure,
            11 => MvccReadConflict,
            12 => PhantomReadConflict,
            13 => UnknownTxType,
            14 => TargetChainNotFound,
            15 => MarshalTxError,
            16 => NilTxAction,
            17 => ExpiredChaincode,
            18 => ChaincodeVersionConflict,
            19 => BadHeaderExtension,
            20 => BadChannelHeader,
            21 => BadResponsePayload,
            22 => BadRwset,
            23 => IllegalWriteset,
            24 => InvalidWriteset,
            254 => NotValidated,
            _ => InvalidOtherReason,
        }
    }

    #[inline]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self == TxValidationCode::Valid
    }

    /// Name as used by the ledger (`MVCC_READ_CONFLICT`, ...).
    pub fn as_str(self) -> &'static str {
        use TxValidationCode::*;
        match self {
            Valid => "VALID",
            NilEnvelope => "NIL_ENVELOPE",
            BadPayload => "BAD_PAYLOAD",
            BadCommonHeader => "BAD_COMMON_HEADER",
            BadCreatorSignature => "BAD_CREATOR_SIGNATURE",
            InvalidEndorserTransaction => "INVALID_ENDORSER_TRANSACTION",
            InvalidConfigTransaction => "INVALID_CONFIG_TRANSACTION",
            UnsupportedTxPayload => "UNSUPPORTED_TX_PAYLOAD",
            BadProposalTxId => "BAD_PROPOSAL_TXID",
            DuplicateTxId => "DUPLICATE_TXID",
            EndorsementPolicyFailure => "ENDORSEMENT_POLICY_FAILURE",
            MvccReadConflict => "MVCC_READ_CONFLICT",
            PhantomReadConflict => "PHANTOM_READ_CONFLICT",
            UnknownTxType => "UNKNOWN_TX_TYPE",
            TargetChainNotFound => "TARGET_CHAIN_NOT_FOUND",
            MarshalTxError => "MARSHAL_TX_ERROR",
            NilTxAction => "NIL_TXACTION",
            ExpiredChaincode => "EXPIRED_CHAINCODE",
            ChaincodeVersionConflict => "CHAINCODE_VERSION_CONFLICT",
            BadHeaderExtension => "BAD_HEADER_EXTENSION",
            BadChannelHeader => "BAD_CHANNEL_HEADER",
            BadResponsePayload => "BAD_RESPONSE_PAYLOAD",
            BadRwset => "BAD_RWSET",
            IllegalWriteset => "ILLEGAL_WRITESET",
            InvalidWriteset => "INVALID_WRITESET",
            NotValidated => "NOT_VALIDATED",
            InvalidOtherReason => "INVALID_OTHER_REASON",
        }
    }
}

impl fmt::Display for TxValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.as_i32())
    }
}

/// Event emitted by chaincode during a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeEvent {
    pub chaincode_id: String,
    pub event_name: String,
    pub tx_id: TransactionId,
    pub payload: Bytes,
    pub block_number: u64,
}

impl ChaincodeEvent {
    pub fn new(
        chaincode_id: impl Into<String>,
        event_name: impl Into<String>,
        tx_id: impl Into<TransactionId>,
    ) -> Self {
        Self {
            chaincode_id: chaincode_id.into(),
            event_name: event_name.into(),
            tx_id: tx_id.into(),
            payload: Bytes::new(),
            block_number: 0,
        }
    }
}

/// Commit status of one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStatusEvent {
    pub tx_id: TransactionId,
    pub validation_code: TxValidationCode,
    pub block_number: u64,
}

impl TxStatusEvent {
    pub fn new(tx_id: impl Into<TransactionId>, validation_code: TxValidationCode) -> Self {
        Self {
            tx_id: tx_id.into(),
            validation_code,
            block_number: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub previous_hash: Bytes,
    pub data_hash: Bytes,
}

/// A transaction as carried in a full block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTransaction {
    pub tx_id: TransactionId,
    pub validation_code: TxValidationCode,
    pub envelope: Bytes,
    pub chaincode_events: Vec<ChaincodeEvent>,
}

/// Full block as delivered by the event producer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub channel_id: String,
    pub header: BlockHeader,
    pub transactions: Vec<BlockTransaction>,
}

impl Block {
    #[inline]
    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Strip envelopes and payloads, keeping ids, codes and event names.
    pub fn to_filtered(&self) -> FilteredBlock {
        FilteredBlock {
            channel_id: self.channel_id.clone(),
            number: self.number(),
            transactions: self
                .transactions
                .iter()
                .map(|tx| FilteredTransaction {
                    tx_id: tx.tx_id.clone(),
                    validation_code: tx.validation_code,
                    chaincode_events: tx
                        .chaincode_events
                        .iter()
                        .map(|ev| ChaincodeEvent {
                            payload: Bytes::new(),
                            ..ev.clone()
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredTransaction {
    pub tx_id: TransactionId,
    pub validation_code: TxValidationCode,
    pub chaincode_events: Vec<ChaincodeEvent>,
}

/// Block reduced to transaction ids, validation codes and chaincode event names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredBlock {
    pub channel_id: String,
    pub number: u64,
    pub transactions: Vec<FilteredTransaction>,
}

/// Predicate selecting the blocks a block registration receives.
pub type BlockFilter = Arc<dyn Fn(&Block) -> bool + Send + Sync>;
