//! Collaborator contracts consumed by the execution pipeline.
//!
//! Transport, signing, discovery and selection policy live outside this crate.
//! The pipeline only sees these traits, all of which are object safe so that a
//! [`ClientContext`](crate::handler::ClientContext) can hold them as `Arc<dyn _>`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;

use super::proposal::{
    ProcessProposalRequest, SignedProposal, TransactionHeader, TransactionProposal,
    TransactionProposalResponse,
};
use super::TransactionId;
use crate::error::Result;

/// A node able to simulate a transaction proposal.
#[async_trait]
pub trait ProposalProcessor: Send + Sync {
    /// Identity reported as the endorser of this processor's responses.
    fn endorser(&self) -> &str;

    /// Simulate the proposal and return the endorsement.
    async fn process_transaction_proposal(
        &self,
        request: ProcessProposalRequest,
    ) -> Result<TransactionProposalResponse>;
}

impl fmt::Debug for dyn ProposalProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProposalProcessor").field(&self.endorser()).finish()
    }
}

/// Peer type handed out by discovery and selection.
pub type Peer = Arc<dyn ProposalProcessor>;

/// Supplies the candidate peers of a channel.
#[async_trait]
pub trait DiscoveryService: Send + Sync {
    async fn get_peers(&self) -> Result<Vec<Peer>>;
}

/// Picks the endorsing subset for a chaincode out of the candidate peers.
#[async_trait]
pub trait SelectionService: Send + Sync {
    async fn get_endorsers_for_chaincode(
        &self,
        candidates: &[Peer],
        chaincode_id: &str,
    ) -> Result<Vec<Peer>>;
}

/// Outcome of sending a proposal to one processor.
pub type ProposalResult = Result<TransactionProposalResponse>;

/// Creates and sends transaction proposals.
#[async_trait]
pub trait ProposalSender: Send + Sync {
    async fn create_transaction_header(&self) -> Result<TransactionHeader>;

    /// Send the proposal to every target.
    ///
    /// One entry is returned per target. A transport failure for one target
    /// is reported in its entry; the outer error is reserved for failures
    /// that prevent sending at all (for example signing).
    async fn send_transaction_proposal(
        &self,
        proposal: &TransactionProposal,
        targets: &[Peer],
    ) -> Result<Vec<ProposalResult>>;
}

/// Input for building a transaction envelope.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub proposal: TransactionProposal,
    pub responses: Vec<TransactionProposalResponse>,
}

/// Signed envelope ready for the ordering service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub tx_id: TransactionId,
    pub envelope: Bytes,
}

/// Ordering service acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResponse {
    pub orderer: String,
}

/// Builds envelopes and submits them for ordering.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn create_transaction(&self, request: TransactionRequest) -> Result<Transaction>;

    async fn send_transaction(&self, transaction: &Transaction) -> Result<TransactionResponse>;
}

/// Full transactor used by the pipeline.
pub trait Transactor: ProposalSender + Sender {}

impl<T: ProposalSender + Sender> Transactor for T {}

/// Fan a signed proposal out to all processors concurrently.
///
/// Results keep the order of `targets`. Building block for
/// [`ProposalSender::send_transaction_proposal`] implementations.
pub async fn send_to_processors(
    signed_proposal: SignedProposal,
    targets: &[Peer],
) -> Vec<ProposalResult> {
    let calls = targets.iter().map(|target| {
        let request = ProcessProposalRequest {
            signed_proposal: signed_proposal.clone(),
        };
        async move {
            let result = target.process_transaction_proposal(request).await;
            if let Err(e) = &result {
                tracing::debug!(endorser = target.endorser(), error = %e, "proposal processing failed");
            }
            result
        }
    });
    join_all(calls).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use crate::fab::ChaincodeResponse;

    struct EchoPeer {
        name: String,
        fail: bool,
    }

    #[async_trait]
    impl ProposalProcessor for EchoPeer {
        fn endorser(&self) -> &str {
            &self.name
        }

        async fn process_transaction_proposal(
            &self,
            request: ProcessProposalRequest,
        ) -> Result<TransactionProposalResponse> {
            if self.fail {
                return Err(ChannelError::Peer {
                    endorser: self.name.clone(),
                    message: "connection refused".into(),
                });
            }
            Ok(TransactionProposalResponse {
                endorser: self.name.clone(),
                status: 200,
                payload: request.signed_proposal.proposal_bytes.clone(),
                response: ChaincodeResponse {
                    status: 200,
                    ..Default::default()
                },
                endorsement: Default::default(),
            })
        }
    }

    fn peer(name: &str, fail: bool) -> Peer {
        Arc::new(EchoPeer {
            name: name.to_string(),
            fail,
        })
    }

    #[tokio::test]
    async fn test_send_to_processors_keeps_order_and_failures() {
        let signed = SignedProposal {
            proposal_bytes: Bytes::from_static(b"proposal"),
            signature: Bytes::from_static(b"sig"),
        };
        let targets = vec![peer("p1", false), peer("p2", true), peer("p3", false)];

        let results = send_to_processors(signed, &targets).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().endorser, "p1");
        assert!(matches!(results[1], Err(ChannelError::Peer { .. })));
        assert_eq!(results[2].as_ref().unwrap().payload, Bytes::from_static(b"proposal"));
    }

    #[tokio::test]
    async fn test_send_to_no_processors() {
        let signed = SignedProposal {
            proposal_bytes: Bytes::new(),
            signature: Bytes::new(),
        };
        assert!(send_to_processors(signed, &[]).await.is_empty());
    }

    #[test]
    fn test_peer_debug_shows_endorser() {
        let p = peer("peer0.org1", false);
        assert_eq!(format!("{:?}", p), "ProposalProcessor(\"peer0.org1\")");
    }
}
