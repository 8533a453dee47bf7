//! Event module - ledger events and subscription handling.
//!
//! Provides:
//! - event value types ([`Block`], [`FilteredBlock`], [`ChaincodeEvent`], [`TxStatusEvent`])
//! - [`Registration`] - handle identifying a live subscription
//! - [`EventService`] - registration contract used by the execution pipeline
//! - [`dispatcher`] - the actor that owns every subscription
//!
//! # Example
//!
//! ```ignore
//! use fabric_channel_client::events::{spawn_dispatcher_default, EventService};
//!
//! let (events, _task) = spawn_dispatcher_default();
//! let (reg, mut rx) = events.register_tx_status_event(&tx_id).await?;
//! if let Some(status) = rx.recv().await {
//!     println!("{} committed with {}", status.tx_id, status.validation_code);
//! }
//! events.unregister(&reg);
//! ```

pub mod dispatcher;
mod types;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::fab::TransactionId;

pub use dispatcher::{
    spawn_dispatcher, spawn_dispatcher_default, DeliveryStats, DispatcherConfig,
    DispatcherHandle, DispatcherStats, Event, DEFAULT_EVENT_BUFFER_SIZE,
    DEFAULT_REGISTRATION_TIMEOUT,
};
pub use types::{
    Block, BlockFilter, BlockHeader, BlockTransaction, ChaincodeEvent, FilteredBlock,
    FilteredTransaction, TxStatusEvent, TxValidationCode,
};

/// Receiving side of a block registration.
pub type BlockEventReceiver = mpsc::Receiver<Arc<Block>>;
/// Receiving side of a filtered-block registration.
pub type FilteredBlockEventReceiver = mpsc::Receiver<Arc<FilteredBlock>>;
/// Receiving side of a chaincode registration.
pub type ChaincodeEventReceiver = mpsc::Receiver<ChaincodeEvent>;
/// Receiving side of a tx-status registration.
pub type TxStatusEventReceiver = mpsc::Receiver<TxStatusEvent>;

/// Identity of a registration, unique per dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(pub(crate) u64);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reg-{}", self.0)
    }
}

/// What a registration listens to, including its table key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationKind {
    Block,
    FilteredBlock,
    Chaincode {
        chaincode_id: String,
        event_filter: String,
    },
    TxStatus {
        tx_id: TransactionId,
    },
}

/// Handle to a live subscription.
///
/// Returned by every `register_*` call together with the receiving end of its
/// delivery channel. Pass it back to [`EventService::unregister`] to end the
/// subscription.
#[derive(Clone)]
pub struct Registration {
    id: RegistrationId,
    kind: RegistrationKind,
    stats: Arc<DeliveryStats>,
}

impl Registration {
    pub(crate) fn new(id: RegistrationId, kind: RegistrationKind, stats: Arc<DeliveryStats>) -> Self {
        Self { id, kind, stats }
    }

    #[inline]
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> &RegistrationKind {
        &self.kind
    }

    /// Events handed to this registration's channel so far.
    pub fn delivered(&self) -> u64 {
        self.stats.delivered()
    }

    /// Events dropped because this registration's channel was full.
    pub fn dropped(&self) -> u64 {
        self.stats.dropped()
    }
}

impl PartialEq for Registration {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Registration {}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Subscription contract used by the pipeline.
#[async_trait]
pub trait EventService: Send + Sync {
    /// Register for full blocks, optionally narrowed by a filter.
    async fn register_block_event(
        &self,
        filter: Option<BlockFilter>,
    ) -> Result<(Registration, BlockEventReceiver)>;

    async fn register_filtered_block_event(
        &self,
    ) -> Result<(Registration, FilteredBlockEventReceiver)>;

    /// Register for chaincode events of `chaincode_id` whose name matches the
    /// regular expression `event_filter`.
    async fn register_chaincode_event(
        &self,
        chaincode_id: &str,
        event_filter: &str,
    ) -> Result<(Registration, ChaincodeEventReceiver)>;

    /// Register for the commit status of one transaction.
    async fn register_tx_status_event(
        &self,
        tx_id: &TransactionId,
    ) -> Result<(Registration, TxStatusEventReceiver)>;

    /// End a subscription. Unknown or already removed registrations are ignored.
    ///
    /// Never blocks, so it is safe to call from `Drop`.
    fn unregister(&self, registration: &Registration);
}
