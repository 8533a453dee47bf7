//! Event dispatcher - single task owning every event subscription.
//!
//! Registration requests, unregistrations and events coming from the event
//! producer all travel over one channel to one task. That task is the only
//! code that reads or writes the subscription tables, so the tables need no
//! lock and every message is applied in arrival order: an event is never
//! matched against a registration whose request was queued after it.
//!
//! # Architecture
//!
//! ```text
//! register_*/unregister ─┐
//! producer events ───────┼─► mpsc::UnboundedSender<Event> ─► Dispatcher task
//! stats/stop ────────────┘                                        │
//!                                     bounded channel per registration ◄─┘
//! ```
//!
//! The control channel is unbounded so that [`EventService::unregister`] can
//! be called from `Drop` without blocking. Delivery channels are bounded; see
//! [`delivery`] for the policy applied when a subscriber falls behind.

mod delivery;
mod message;

use std::collections::{BTreeMap, HashMap};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{ChannelError, Result};
use crate::events::{
    Block, BlockEventReceiver, BlockFilter, ChaincodeEvent, ChaincodeEventReceiver,
    EventService, FilteredBlock, FilteredBlockEventReceiver, Registration, RegistrationId,
    RegistrationKind, TxStatusEvent, TxStatusEventReceiver, TxValidationCode,
};
use crate::fab::TransactionId;

use delivery::{deliver, DeliveryOutcome};
pub use delivery::{DeliveryStats, DEFAULT_EVENT_BUFFER_SIZE};
use message::{BlockReg, ChaincodeReg, FilteredBlockReg, TxStatusReg};
pub use message::{Event, RegistrationReply};

/// Default time to wait for the dispatcher to answer a request.
pub const DEFAULT_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the dispatcher task.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Capacity of each registration's delivery channel.
    pub event_buffer_size: usize,
    /// How long `register_*`, `stats` and `stop` wait for the dispatcher.
    pub registration_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            registration_timeout: DEFAULT_REGISTRATION_TIMEOUT,
        }
    }
}

/// Snapshot of the dispatcher's subscription tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    pub block_registrations: usize,
    pub filtered_block_registrations: usize,
    pub chaincode_registrations: usize,
    pub tx_status_registrations: usize,
    /// Transactions with a live tx-status registration, sorted.
    pub pending_tx_ids: Vec<TransactionId>,
}

impl DispatcherStats {
    pub fn total(&self) -> usize {
        self.block_registrations
            + self.filtered_block_registrations
            + self.chaincode_registrations
            + self.tx_status_registrations
    }

    pub fn is_tx_registered(&self, tx_id: &TransactionId) -> bool {
        self.pending_tx_ids.binary_search(tx_id).is_ok()
    }
}

/// Handle for talking to the dispatcher task.
///
/// Cheaply cloneable. Implements [`EventService`] for the pipeline and offers
/// `publish_*` methods for the event producer.
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::UnboundedSender<Event>,
    event_buffer_size: usize,
    timeout: Duration,
}

impl DispatcherHandle {
    fn send(&self, event: Event) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| ChannelError::DispatcherStopped)
    }

    /// Wait for the dispatcher's answer to a request.
    async fn await_reply<T>(&self, reply: oneshot::Receiver<T>, what: &'static str) -> Result<T> {
        match tokio::time::timeout(self.timeout, reply).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(ChannelError::DispatcherStopped),
            Err(_) => Err(ChannelError::Timeout(self.timeout, what)),
        }
    }

    async fn register(&self, request: impl FnOnce(RegistrationReply) -> Event) -> Result<Registration> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(request(reply_tx))?;
        self.await_reply(reply_rx, "event registration").await?
    }

    fn delivery_channel<T>(&self) -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
        mpsc::channel(self.event_buffer_size.max(1))
    }

    /// Hand a full block to the dispatcher.
    pub fn publish_block(&self, block: Block) -> Result<()> {
        self.send(Event::Block(Arc::new(block)))
    }

    pub fn publish_filtered_block(&self, block: FilteredBlock) -> Result<()> {
        self.send(Event::FilteredBlock(Arc::new(block)))
    }

    pub fn publish_chaincode_event(&self, event: ChaincodeEvent) -> Result<()> {
        self.send(Event::Chaincode(event))
    }

    pub fn publish_tx_status(&self, event: TxStatusEvent) -> Result<()> {
        self.send(Event::TxStatus(event))
    }

    /// Snapshot of the subscription tables.
    ///
    /// Answered after every message sent before it, which makes it usable
    /// as a barrier.
    pub async fn stats(&self) -> Result<DispatcherStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Event::Stats { reply: reply_tx })?;
        self.await_reply(reply_rx, "dispatcher stats").await
    }

    /// Stop the dispatcher, closing every delivery channel.
    ///
    /// Every later call on any handle fails with
    /// [`ChannelError::DispatcherStopped`].
    pub async fn stop(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Event::Stop { reply: reply_tx })?;
        self.await_reply(reply_rx, "dispatcher stop").await
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait]
impl EventService for DispatcherHandle {
    async fn register_block_event(
        &self,
        filter: Option<BlockFilter>,
    ) -> Result<(Registration, BlockEventReceiver)> {
        let (eventch, rx) = self.delivery_channel();
        let reg = self
            .register(|reply| Event::RegisterBlock {
                filter,
                eventch,
                reply,
            })
            .await?;
        Ok((reg, rx))
    }

    async fn register_filtered_block_event(
        &self,
    ) -> Result<(Registration, FilteredBlockEventReceiver)> {
        let (eventch, rx) = self.delivery_channel();
        let reg = self
            .register(|reply| Event::RegisterFilteredBlock { eventch, reply })
            .await?;
        Ok((reg, rx))
    }

    async fn register_chaincode_event(
        &self,
        chaincode_id: &str,
        event_filter: &str,
    ) -> Result<(Registration, ChaincodeEventReceiver)> {
        let (eventch, rx) = self.delivery_channel();
        let reg = self
            .register(|reply| Event::RegisterChaincode {
                chaincode_id: chaincode_id.to_string(),
                event_filter: event_filter.to_string(),
                eventch,
                reply,
            })
            .await?;
        Ok((reg, rx))
    }

    async fn register_tx_status_event(
        &self,
        tx_id: &TransactionId,
    ) -> Result<(Registration, TxStatusEventReceiver)> {
        let (eventch, rx) = self.delivery_channel();
        let reg = self
            .register(|reply| Event::RegisterTxStatus {
                tx_id: tx_id.clone(),
                eventch,
                reply,
            })
            .await?;
        Ok((reg, rx))
    }

    fn unregister(&self, registration: &Registration) {
        // After stop there is nothing left to remove.
        let _ = self.send(Event::Unregister(registration.clone()));
    }
}

/// Spawn the dispatcher task and return a handle for talking to it.
///
/// The task ends on [`DispatcherHandle::stop`] or once every handle is dropped.
pub fn spawn_dispatcher(config: DispatcherConfig) -> (DispatcherHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();

    let handle = DispatcherHandle {
        tx,
        event_buffer_size: config.event_buffer_size,
        timeout: config.registration_timeout,
    };

    let task = tokio::spawn(dispatcher_loop(rx, Dispatcher::new()));

    (handle, task)
}

/// Spawn the dispatcher task with default configuration.
pub fn spawn_dispatcher_default() -> (DispatcherHandle, JoinHandle<()>) {
    spawn_dispatcher(DispatcherConfig::default())
}

async fn dispatcher_loop(mut rx: mpsc::UnboundedReceiver<Event>, mut dispatcher: Dispatcher) {
    debug!("event dispatcher started");

    while let Some(event) = rx.recv().await {
        trace!(event = event.name(), "dispatching");
        if dispatcher.handle_event(event).is_break() {
            break;
        }
    }

    // Refuse new messages; queued ones are dropped with the receiver and
    // their reply channels close.
    rx.close();
    debug!("event dispatcher stopped");
}

/// Subscription tables. Owned by the dispatcher task only.
#[derive(Default)]
struct Dispatcher {
    next_id: u64,
    block_regs: BTreeMap<RegistrationId, BlockReg>,
    filtered_block_regs: BTreeMap<RegistrationId, FilteredBlockReg>,
    chaincode_regs: HashMap<String, Vec<ChaincodeReg>>,
    tx_status_regs: HashMap<TransactionId, TxStatusReg>,
}

impl Dispatcher {
    fn new() -> Self {
        Self::default()
    }

    fn handle_event(&mut self, event: Event) -> ControlFlow<()> {
        match event {
            Event::RegisterBlock {
                filter,
                eventch,
                reply,
            } => {
                let stats = Arc::new(DeliveryStats::new());
                let reg = self.new_registration(RegistrationKind::Block, stats.clone());
                self.block_regs.insert(
                    reg.id(),
                    BlockReg {
                        filter,
                        eventch,
                        stats,
                    },
                );
                self.reply(reply, Ok(reg));
            }
            Event::RegisterFilteredBlock { eventch, reply } => {
                let stats = Arc::new(DeliveryStats::new());
                let reg = self.new_registration(RegistrationKind::FilteredBlock, stats.clone());
                self.filtered_block_regs
                    .insert(reg.id(), FilteredBlockReg { eventch, stats });
                self.reply(reply, Ok(reg));
            }
            Event::RegisterChaincode {
                chaincode_id,
                event_filter,
                eventch,
                reply,
            } => {
                let result = self.register_chaincode(chaincode_id, event_filter, eventch);
                self.reply(reply, result);
            }
            Event::RegisterTxStatus {
                tx_id,
                eventch,
                reply,
            } => {
                let result = self.register_tx_status(tx_id, eventch);
                self.reply(reply, result);
            }
            Event::Unregister(reg) => self.unregister(&reg),
            Event::Stop { reply } => {
                self.clear();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
            Event::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            Event::Block(block) => self.handle_block(block),
            Event::FilteredBlock(block) => self.handle_filtered_block(block),
            Event::Chaincode(event) => self.handle_chaincode_event(event),
            Event::TxStatus(event) => self.handle_tx_status_event(event),
        }
        ControlFlow::Continue(())
    }

    fn new_registration(&mut self, kind: RegistrationKind, stats: Arc<DeliveryStats>) -> Registration {
        self.next_id += 1;
        Registration::new(RegistrationId(self.next_id), kind, stats)
    }

    /// Answer a registration request exactly once.
    fn reply(&mut self, reply: RegistrationReply, result: Result<Registration>) {
        if let Err(e) = &result {
            debug!(error = %e, "registration rejected");
        }
        // The requester stopped waiting, so nobody can ever unregister this.
        if let Err(Ok(orphan)) = reply.send(result) {
            debug!(registration = %orphan.id(), "registration reply dropped, removing");
            self.unregister(&orphan);
        }
    }

    fn register_chaincode(
        &mut self,
        chaincode_id: String,
        event_filter: String,
        eventch: mpsc::Sender<ChaincodeEvent>,
    ) -> Result<Registration> {
        if chaincode_id.is_empty() || event_filter.is_empty() {
            return Err(ChannelError::Registration(
                "chaincode ID and event filter are required".to_string(),
            ));
        }
        let regex = Regex::new(&event_filter).map_err(|source| ChannelError::InvalidEventFilter {
            chaincode_id: chaincode_id.clone(),
            filter: event_filter.clone(),
            source,
        })?;

        let stats = Arc::new(DeliveryStats::new());
        let reg = self.new_registration(
            RegistrationKind::Chaincode {
                chaincode_id: chaincode_id.clone(),
                event_filter,
            },
            stats.clone(),
        );
        self.chaincode_regs
            .entry(chaincode_id)
            .or_default()
            .push(ChaincodeReg {
                id: reg.id(),
                event_filter: regex,
                eventch,
                stats,
            });
        Ok(reg)
    }

    fn register_tx_status(
        &mut self,
        tx_id: TransactionId,
        eventch: mpsc::Sender<TxStatusEvent>,
    ) -> Result<Registration> {
        if tx_id.is_empty() {
            return Err(ChannelError::Registration(
                "transaction ID is required".to_string(),
            ));
        }
        if self.tx_status_regs.contains_key(&tx_id) {
            return Err(ChannelError::DuplicateRegistration(tx_id));
        }

        let stats = Arc::new(DeliveryStats::new());
        let reg = self.new_registration(
            RegistrationKind::TxStatus {
                tx_id: tx_id.clone(),
            },
            stats.clone(),
        );
        self.tx_status_regs.insert(
            tx_id,
            TxStatusReg {
                id: reg.id(),
                eventch,
                stats,
            },
        );
        Ok(reg)
    }

    fn unregister(&mut self, reg: &Registration) {
        let id = reg.id();
        let removed = match reg.kind() {
            RegistrationKind::Block => self.block_regs.remove(&id).is_some(),
            RegistrationKind::FilteredBlock => self.filtered_block_regs.remove(&id).is_some(),
            RegistrationKind::Chaincode { chaincode_id, .. } => {
                let mut removed = false;
                let mut now_empty = false;
                if let Some(regs) = self.chaincode_regs.get_mut(chaincode_id) {
                    let before = regs.len();
                    regs.retain(|r| r.id != id);
                    removed = regs.len() != before;
                    now_empty = regs.is_empty();
                }
                if now_empty {
                    self.chaincode_regs.remove(chaincode_id);
                }
                removed
            }
            // A newer registration for the same transaction must survive a
            // stale unregister.
            RegistrationKind::TxStatus { tx_id } => match self.tx_status_regs.get(tx_id) {
                Some(current) if current.id == id => self.tx_status_regs.remove(tx_id).is_some(),
                _ => false,
            },
        };

        if removed {
            debug!(registration = %id, kind = ?reg.kind(), "unregistered");
        } else {
            trace!(registration = %id, "unregister ignored, no such registration");
        }
    }

    fn clear(&mut self) {
        let stats = self.stats();
        if stats.total() > 0 {
            debug!(live = stats.total(), "closing live registrations");
        }
        self.block_regs.clear();
        self.filtered_block_regs.clear();
        self.chaincode_regs.clear();
        self.tx_status_regs.clear();
    }

    fn stats(&self) -> DispatcherStats {
        let mut pending_tx_ids: Vec<TransactionId> = self.tx_status_regs.keys().cloned().collect();
        pending_tx_ids.sort();
        DispatcherStats {
            block_registrations: self.block_regs.len(),
            filtered_block_registrations: self.filtered_block_regs.len(),
            chaincode_registrations: self.chaincode_regs.values().map(Vec::len).sum(),
            tx_status_registrations: self.tx_status_regs.len(),
            pending_tx_ids,
        }
    }

    fn handle_block(&self, block: Arc<Block>) {
        trace!(block = block.number(), "block event");
        for (id, reg) in &self.block_regs {
            if reg.accepts(&block) {
                note(*id, "block", deliver(&reg.eventch, block.clone(), &reg.stats));
            }
        }

        if !self.filtered_block_regs.is_empty() {
            self.deliver_filtered_block(&Arc::new(block.to_filtered()));
        }

        // Derived events come from the full block so chaincode payloads survive.
        for tx in &block.transactions {
            self.handle_committed_tx(&tx.tx_id, tx.validation_code, &tx.chaincode_events, block.number());
        }
    }

    fn handle_filtered_block(&self, block: Arc<FilteredBlock>) {
        trace!(block = block.number, txs = block.transactions.len(), "filtered block event");
        self.deliver_filtered_block(&block);
        for tx in &block.transactions {
            self.handle_committed_tx(&tx.tx_id, tx.validation_code, &tx.chaincode_events, block.number);
        }
    }

    fn deliver_filtered_block(&self, block: &Arc<FilteredBlock>) {
        for (id, reg) in &self.filtered_block_regs {
            note(*id, "filtered-block", deliver(&reg.eventch, block.clone(), &reg.stats));
        }
    }

    /// Publish the tx-status event of a committed transaction and, when it is
    /// valid, its chaincode events.
    fn handle_committed_tx(
        &self,
        tx_id: &TransactionId,
        validation_code: TxValidationCode,
        chaincode_events: &[ChaincodeEvent],
        block_number: u64,
    ) {
        self.handle_tx_status_event(TxStatusEvent {
            tx_id: tx_id.clone(),
            validation_code,
            block_number,
        });

        if validation_code.is_valid() {
            for event in chaincode_events {
                self.handle_chaincode_event(ChaincodeEvent {
                    block_number,
                    ..event.clone()
                });
            }
        }
    }

    fn handle_chaincode_event(&self, event: ChaincodeEvent) {
        let Some(regs) = self.chaincode_regs.get(&event.chaincode_id) else {
            return;
        };
        for reg in regs {
            if reg.event_filter.is_match(&event.event_name) {
                note(reg.id, "chaincode", deliver(&reg.eventch, event.clone(), &reg.stats));
            }
        }
    }

    fn handle_tx_status_event(&self, event: TxStatusEvent) {
        if let Some(reg) = self.tx_status_regs.get(&event.tx_id) {
            debug!(tx_id = %event.tx_id, code = %event.validation_code, "tx status event");
            note(reg.id, "tx-status", deliver(&reg.eventch, event, &reg.stats));
        }
    }
}

fn note(id: RegistrationId, kind: &'static str, outcome: DeliveryOutcome) {
    match outcome {
        DeliveryOutcome::Delivered => {}
        DeliveryOutcome::Dropped => {
            warn!(registration = %id, kind, "subscriber buffer full, event dropped");
        }
        DeliveryOutcome::Closed => {
            trace!(registration = %id, kind, "subscriber receiver closed");
        }
    }
}
