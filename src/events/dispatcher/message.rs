//! Messages accepted by the dispatcher and the registrations it stores.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tokio::sync::{mpsc, oneshot};

use super::delivery::DeliveryStats;
use super::DispatcherStats;
use crate::error::Result;
use crate::events::{
    Block, BlockFilter, ChaincodeEvent, FilteredBlock, Registration, RegistrationId,
    TxStatusEvent,
};
use crate::fab::TransactionId;

/// Reply channel of a registration request. Answered exactly once.
pub type RegistrationReply = oneshot::Sender<Result<Registration>>;

/// Message sent to the dispatcher.
///
/// Registration lifecycle requests and producer deliveries share one channel,
/// so the dispatcher sees them in a single total order.
pub enum Event {
    RegisterBlock {
        filter: Option<BlockFilter>,
        eventch: mpsc::Sender<Arc<Block>>,
        reply: RegistrationReply,
    },
    RegisterFilteredBlock {
        eventch: mpsc::Sender<Arc<FilteredBlock>>,
        reply: RegistrationReply,
    },
    RegisterChaincode {
        chaincode_id: String,
        event_filter: String,
        eventch: mpsc::Sender<ChaincodeEvent>,
        reply: RegistrationReply,
    },
    RegisterTxStatus {
        tx_id: TransactionId,
        eventch: mpsc::Sender<TxStatusEvent>,
        reply: RegistrationReply,
    },
    Unregister(Registration),
    /// Tear down every registration and end the loop.
    Stop {
        reply: oneshot::Sender<()>,
    },
    /// Snapshot of the subscription tables.
    Stats {
        reply: oneshot::Sender<DispatcherStats>,
    },
    Block(Arc<Block>),
    FilteredBlock(Arc<FilteredBlock>),
    Chaincode(ChaincodeEvent),
    TxStatus(TxStatusEvent),
}

impl Event {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Event::RegisterBlock { .. } => "register-block",
            Event::RegisterFilteredBlock { .. } => "register-filtered-block",
            Event::RegisterChaincode { .. } => "register-chaincode",
            Event::RegisterTxStatus { .. } => "register-tx-status",
            Event::Unregister(_) => "unregister",
            Event::Stop { .. } => "stop",
            Event::Stats { .. } => "stats",
            Event::Block(_) => "block",
            Event::FilteredBlock(_) => "filtered-block",
            Event::Chaincode(_) => "chaincode",
            Event::TxStatus(_) => "tx-status",
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) struct BlockReg {
    pub filter: Option<BlockFilter>,
    pub eventch: mpsc::Sender<Arc<Block>>,
    pub stats: Arc<DeliveryStats>,
}

impl BlockReg {
    pub fn accepts(&self, block: &Block) -> bool {
        self.filter.as_ref().map_or(true, |f| f(block))
    }
}

pub(crate) struct FilteredBlockReg {
    pub eventch: mpsc::Sender<Arc<FilteredBlock>>,
    pub stats: Arc<DeliveryStats>,
}

pub(crate) struct ChaincodeReg {
    pub id: RegistrationId,
    pub event_filter: Regex,
    pub eventch: mpsc::Sender<ChaincodeEvent>,
    pub stats: Arc<DeliveryStats>,
}

pub(crate) struct TxStatusReg {
    pub id: RegistrationId,
    pub eventch: mpsc::Sender<TxStatusEvent>,
    pub stats: Arc<DeliveryStats>,
}
