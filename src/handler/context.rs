//! Per-call request state and the shared collaborator bundle.
//!
//! A [`RequestContext`] is created for every `query`/`execute` call and is
//! owned by that call only. Handlers read the [`Request`] and [`Opts`], fill in
//! the [`Response`] and record at most one error. The [`ClientContext`] holds
//! the channel's collaborators and is shared read-only between calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::error::{ChannelError, Result};
use crate::events::{EventService, TxValidationCode};
use crate::fab::{
    DiscoveryService, Peer, SelectionService, TransactionId, TransactionProposal,
    TransactionProposalResponse, Transactor,
};

/// A chaincode call. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub chaincode_id: String,
    pub fcn: String,
    pub args: Vec<Bytes>,
    pub transient_map: HashMap<String, Bytes>,
}

impl Request {
    pub fn new(chaincode_id: impl Into<String>, fcn: impl Into<String>) -> Self {
        Self {
            chaincode_id: chaincode_id.into(),
            fcn: fcn.into(),
            ..Default::default()
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<Bytes>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Replace all arguments.
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add private data passed to the chaincode but kept out of the ledger.
    pub fn transient(mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.transient_map.insert(key.into(), value.into());
        self
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct Opts {
    /// Explicit endorsing peers. Empty means ask discovery and selection.
    pub targets: Vec<Peer>,
    /// Overall deadline for the call. `None` or zero means use the default.
    pub timeout: Option<Duration>,
}

impl Opts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send the proposal to these peers only.
    pub fn with_targets(mut self, targets: Vec<Peer>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_target(mut self, target: Peer) -> Self {
        self.targets.push(target);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The configured timeout, or `default` when unset or zero.
    pub fn resolved_timeout(&self, default: Duration) -> Duration {
        match self.timeout {
            Some(t) if !t.is_zero() => t,
            _ => default,
        }
    }
}

/// Result of a call, filled in stage by stage.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub transaction_id: TransactionId,
    pub proposal: Option<TransactionProposal>,
    pub responses: Vec<TransactionProposalResponse>,
    /// Chaincode response payload agreed on by every endorser.
    pub payload: Bytes,
    /// Set once an execute call has been committed.
    pub validation_code: Option<TxValidationCode>,
}

/// Mutable state of one pipeline call.
#[derive(Debug)]
pub struct RequestContext {
    pub request: Request,
    pub opts: Opts,
    pub response: Response,
    deadline: Option<Instant>,
    error: Option<ChannelError>,
}

impl RequestContext {
    pub fn new(request: Request, opts: Opts) -> Self {
        Self {
            request,
            opts,
            response: Response::default(),
            deadline: None,
            error: None,
        }
    }

    /// Record a terminal error. Only the first one is kept.
    pub fn set_error(&mut self, err: ChannelError) {
        if self.error.is_none() {
            self.error = Some(err);
        } else {
            tracing::debug!(error = %err, "ignoring error after first failure");
        }
    }

    #[inline]
    pub fn error(&self) -> Option<&ChannelError> {
        self.error.as_ref()
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Timeout for this call, falling back to `default`.
    pub fn timeout(&self, default: Duration) -> Duration {
        self.opts.resolved_timeout(default)
    }

    /// Deadline of the whole call.
    ///
    /// Fixed the first time it is asked for; later stages share it instead of
    /// starting a new timeout.
    pub fn deadline(&mut self, default: Duration) -> Instant {
        let timeout = self.timeout(default);
        *self.deadline.get_or_insert_with(|| Instant::now() + timeout)
    }

    /// The response, or the recorded error.
    pub fn into_result(self) -> Result<Response> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.response),
        }
    }
}

/// Collaborators of one channel. Cheap to clone and never mutated by handlers.
#[derive(Clone)]
pub struct ClientContext {
    pub channel_id: String,
    pub discovery: Arc<dyn DiscoveryService>,
    pub selection: Arc<dyn SelectionService>,
    pub transactor: Arc<dyn Transactor>,
    pub event_service: Arc<dyn EventService>,
}

impl ClientContext {
    pub fn new(
        channel_id: impl Into<String>,
        discovery: Arc<dyn DiscoveryService>,
        selection: Arc<dyn SelectionService>,
        transactor: Arc<dyn Transactor>,
        event_service: Arc<dyn EventService>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            discovery,
            selection,
            transactor,
            event_service,
        }
    }
}

impl fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext")
            .field("channel_id", &self.channel_id)
            .finish_non_exhaustive()
    }
}
