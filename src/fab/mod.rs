//! Ledger-facing data model and collaborator traits.
//!
//! Provides:
//! - proposal and endorsement types ([`TransactionProposal`], [`TransactionProposalResponse`])
//! - the collaborator contracts the pipeline calls ([`Transactor`], [`SelectionService`],
//!   [`DiscoveryService`], [`ProposalProcessor`])

mod proposal;
mod services;

pub use proposal::{
    ChaincodeInvocationSpec, ChaincodeResponse, Endorsement, ProcessProposalRequest,
    SignedProposal, TransactionHeader, TransactionId, TransactionProposal,
    TransactionProposalResponse, STATUS_BAD_REQUEST, STATUS_SUCCESS,
};
pub use services::{
    send_to_processors, DiscoveryService, Peer, ProposalProcessor, ProposalResult,
    ProposalSender, SelectionService, Sender, Transaction, TransactionRequest,
    TransactionResponse, Transactor,
};
