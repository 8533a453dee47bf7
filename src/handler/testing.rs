//! In-memory collaborators for handler unit tests.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::ClientContext;
use crate::error::{ChannelError, Result};
use crate::events::{spawn_dispatcher_default, DispatcherHandle, TxStatusEvent, TxValidationCode};
use crate::fab::{
    send_to_processors, ChaincodeResponse, DiscoveryService, Endorsement, Peer,
    ProcessProposalRequest, ProposalProcessor, ProposalResult, ProposalSender, SelectionService,
    Sender, SignedProposal, Transaction, TransactionHeader, TransactionId, TransactionProposal,
    TransactionProposalResponse, TransactionRequest, TransactionResponse,
};

pub const CHANNEL_ID: &str = "testChannel";

pub struct MockPeer {
    name: String,
    status: i32,
    payload: Bytes,
    error: Option<String>,
    delay: Duration,
}

impl MockPeer {
    pub fn ok(name: &str, payload: &'static str) -> Peer {
        Self::with_status(name, 200, payload)
    }

    pub fn with_status(name: &str, status: i32, payload: &'static str) -> Peer {
        Arc::new(Self {
            name: name.to_string(),
            status,
            payload: Bytes::from_static(payload.as_bytes()),
            error: None,
            delay: Duration::ZERO,
        })
    }

    /// Agreeing peer that answers after `delay`.
    pub fn slow(name: &str, payload: &'static str, delay: Duration) -> Peer {
        Arc::new(Self {
            name: name.to_string(),
            status: 200,
            payload: Bytes::from_static(payload.as_bytes()),
            error: None,
            delay,
        })
    }

    pub fn failing(name: &str, message: &str) -> Peer {
        Arc::new(Self {
            name: name.to_string(),
            status: 0,
            payload: Bytes::new(),
            error: Some(message.to_string()),
            delay: Duration::ZERO,
        })
    }
}

#[async_trait]
impl ProposalProcessor for MockPeer {
    fn endorser(&self) -> &str {
        &self.name
    }

    async fn process_transaction_proposal(
        &self,
        _request: ProcessProposalRequest,
    ) -> Result<TransactionProposalResponse> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = &self.error {
            return Err(ChannelError::Peer {
                endorser: self.name.clone(),
                message: message.clone(),
            });
        }
        Ok(TransactionProposalResponse {
            endorser: self.name.clone(),
            status: 200,
            payload: self.payload.clone(),
            response: ChaincodeResponse {
                status: self.status,
                message: String::new(),
                payload: self.payload.clone(),
            },
            endorsement: Endorsement::default(),
        })
    }
}

pub struct MockDiscovery {
    peers: Vec<Peer>,
    error: Option<String>,
}

impl MockDiscovery {
    pub fn with_peers(peers: Vec<Peer>) -> Arc<Self> {
        Arc::new(Self { peers, error: None })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            peers: Vec::new(),
            error: Some(message.to_string()),
        })
    }
}

#[async_trait]
impl DiscoveryService for MockDiscovery {
    async fn get_peers(&self) -> Result<Vec<Peer>> {
        match &self.error {
            Some(message) => Err(ChannelError::service(message.clone())),
            None => Ok(self.peers.clone()),
        }
    }
}

/// Picks the first `limit` candidates.
pub struct MockSelection {
    limit: usize,
    error: Option<String>,
    pub calls: AtomicUsize,
}

impl MockSelection {
    pub fn first(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            limit,
            error: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            limit: 0,
            error: Some(message.to_string()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SelectionService for MockSelection {
    async fn get_endorsers_for_chaincode(
        &self,
        candidates: &[Peer],
        _chaincode_id: &str,
    ) -> Result<Vec<Peer>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.error {
            Some(message) => Err(ChannelError::service(message.clone())),
            None => Ok(candidates.iter().take(self.limit).cloned().collect()),
        }
    }
}

/// Transactor that optionally reports a commit status on submission.
#[derive(Default)]
pub struct MockTransactor {
    next_tx: AtomicU64,
    commit: Option<(DispatcherHandle, TxValidationCode)>,
    commit_delay: Duration,
    order_error: Option<String>,
    pub submitted: Mutex<Vec<TransactionId>>,
}

impl MockTransactor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn committing(events: DispatcherHandle, code: TxValidationCode) -> Arc<Self> {
        Arc::new(Self {
            commit: Some((events, code)),
            ..Default::default()
        })
    }

    /// Reports the commit status `delay` after the transaction is sent.
    pub fn committing_after(events: DispatcherHandle, code: TxValidationCode, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            commit: Some((events, code)),
            commit_delay: delay,
            ..Default::default()
        })
    }

    pub fn failing_order(message: &str) -> Arc<Self> {
        Arc::new(Self {
            order_error: Some(message.to_string()),
            ..Default::default()
        })
    }
}

#[async_trait]
impl ProposalSender for MockTransactor {
    async fn create_transaction_header(&self) -> Result<TransactionHeader> {
        let n = self.next_tx.fetch_add(1, Ordering::SeqCst);
        Ok(TransactionHeader {
            tx_id: TransactionId::new(format!("txid-{}", n)),
            creator: Bytes::from_static(b"creator"),
            nonce: Bytes::copy_from_slice(&n.to_be_bytes()),
            channel_id: CHANNEL_ID.to_string(),
        })
    }

    async fn send_transaction_proposal(
        &self,
        proposal: &TransactionProposal,
        targets: &[Peer],
    ) -> Result<Vec<ProposalResult>> {
        let signed = SignedProposal {
            proposal_bytes: proposal.payload.clone(),
            signature: Bytes::from_static(b"signature"),
        };
        Ok(send_to_processors(signed, targets).await)
    }
}

#[async_trait]
impl Sender for MockTransactor {
    async fn create_transaction(&self, request: TransactionRequest) -> Result<Transaction> {
        Ok(Transaction {
            tx_id: request.proposal.tx_id.clone(),
            envelope: request.proposal.payload.clone(),
        })
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<TransactionResponse> {
        if let Some(message) = &self.order_error {
            return Err(ChannelError::service(message.clone()));
        }
        self.submitted.lock().unwrap().push(transaction.tx_id.clone());
        if let Some((events, code)) = &self.commit {
            let status = TxStatusEvent::new(transaction.tx_id.clone(), *code);
            if self.commit_delay.is_zero() {
                events.publish_tx_status(status)?;
            } else {
                let events = events.clone();
                let delay = self.commit_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.publish_tx_status(status);
                });
            }
        }
        Ok(TransactionResponse {
            orderer: "orderer.example.com".to_string(),
        })
    }
}

/// Context with two agreeing peers and a fresh dispatcher.
pub fn client_context() -> ClientContext {
    client_context_with(
        MockDiscovery::with_peers(vec![MockPeer::ok("peer1", "value"), MockPeer::ok("peer2", "value")]),
        MockSelection::first(usize::MAX),
    )
}

pub fn client_context_with(discovery: Arc<MockDiscovery>, selection: Arc<MockSelection>) -> ClientContext {
    let (events, _task) = spawn_dispatcher_default();
    ClientContext::new(CHANNEL_ID, discovery, selection, MockTransactor::new(), Arc::new(events))
}

/// Context for commit tests, sharing `events` with the transactor.
pub fn commit_context(transactor: Arc<MockTransactor>, events: DispatcherHandle) -> ClientContext {
    commit_context_with_peers(vec![MockPeer::ok("peer1", "value")], transactor, events)
}

pub fn commit_context_with_peers(
    peers: Vec<Peer>,
    transactor: Arc<MockTransactor>,
    events: DispatcherHandle,
) -> ClientContext {
    ClientContext::new(
        CHANNEL_ID,
        MockDiscovery::with_peers(peers),
        MockSelection::first(usize::MAX),
        transactor,
        Arc::new(events),
    )
}
