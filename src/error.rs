//! Error types for the channel client.

use std::time::Duration;

use thiserror::Error;

use crate::events::TxValidationCode;
use crate::fab::TransactionId;

/// Main error type for all channel client operations.
///
/// Messages keep the text of the underlying collaborator error so callers can
/// match on known failure categories by substring.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Discovery service could not produce the candidate peer set.
    #[error("failed to get peers from discovery service: {source}")]
    Discovery {
        #[source]
        source: Box<ChannelError>,
    },

    /// Selection service could not produce the endorsing peers.
    #[error("failed to get endorsing peers from selection service: {source}")]
    Selection {
        #[source]
        source: Box<ChannelError>,
    },

    /// No processor returned a usable proposal response.
    #[error("transaction proposal failed, no successful responses: [{}]", .failures.join("; "))]
    ProposalFailed { failures: Vec<String> },

    /// An endorser answered with a non-success chaincode status.
    #[error("proposal response from {endorser} was not successful, status {status}: {message}")]
    EndorsementStatus {
        endorser: String,
        status: i32,
        message: String,
    },

    /// Simulation payloads differ between endorsers.
    #[error("ProposalResponsePayloads do not match: endorsement mismatch between {first} and {other}")]
    EndorsementMismatch { first: String, other: String },

    /// The transaction could not be created or submitted for ordering.
    #[error("ordering submission failed: {source}")]
    Ordering {
        #[source]
        source: Box<ChannelError>,
    },

    /// The transaction was ordered but rejected by validation.
    #[error("transaction {tx_id} failed validation with code {code}")]
    TxValidation {
        tx_id: TransactionId,
        code: TxValidationCode,
    },

    /// No result was observed within the deadline.
    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, &'static str),

    /// An event registration could not be created.
    #[error("event registration failed: {0}")]
    Registration(String),

    /// A tx-status registration already exists for this transaction.
    #[error("registration already exists for transaction {0}")]
    DuplicateRegistration(TransactionId),

    /// The chaincode event-name filter is not a valid regular expression.
    #[error("invalid event filter [{filter}] for chaincode [{chaincode_id}]: {source}")]
    InvalidEventFilter {
        chaincode_id: String,
        filter: String,
        #[source]
        source: regex::Error,
    },

    /// The event dispatcher has stopped.
    #[error("event dispatcher stopped")]
    DispatcherStopped,

    /// Transport-level failure reported for a single peer.
    #[error("peer {endorser}: {message}")]
    Peer { endorser: String, message: String },

    /// MsgPack encode error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack decode error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Error reported by an external collaborator (transactor, services).
    #[error("{0}")]
    Service(String),

    /// The request cannot be executed as given.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ChannelError {
    /// Shorthand for a collaborator error carrying only a message.
    pub fn service(message: impl Into<String>) -> Self {
        ChannelError::Service(message.into())
    }

    /// Returns true for the timeout category.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ChannelError::Timeout(..))
    }
}

/// Result type alias using ChannelError.
pub type Result<T> = std::result::Result<T, ChannelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_errors_keep_source_text() {
        let err = ChannelError::Selection {
            source: Box::new(ChannelError::service("Selection service error")),
        };
        assert!(err.to_string().contains("Selection service error"));

        let err = ChannelError::Discovery {
            source: Box::new(ChannelError::service("Discovery service error")),
        };
        assert!(err.to_string().contains("Discovery service error"));
    }

    #[test]
    fn test_mismatch_names_both_endorsers() {
        let err = ChannelError::EndorsementMismatch {
            first: "peer1".into(),
            other: "peer2".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ProposalResponsePayloads do not match"));
        assert!(msg.contains("peer1"));
        assert!(msg.contains("peer2"));
    }

    #[test]
    fn test_proposal_failed_lists_failures() {
        let err = ChannelError::ProposalFailed {
            failures: vec!["peer p1: refused".into(), "peer p2: reset".into()],
        };
        assert_eq!(
            err.to_string(),
            "transaction proposal failed, no successful responses: [peer p1: refused; peer p2: reset]"
        );
    }

    #[test]
    fn test_is_timeout() {
        assert!(ChannelError::Timeout(Duration::from_secs(1), "commit").is_timeout());
        assert!(!ChannelError::DispatcherStopped.is_timeout());
    }
}
