//! Resolves the endorsing peers of a call.

use async_trait::async_trait;
use tracing::debug;

use super::{ClientContext, Handler, RequestContext};
use crate::error::{ChannelError, Result};
use crate::fab::Peer;

/// First stage: decides which peers endorse the proposal.
///
/// Explicit `Opts::targets` are used as given. Otherwise the channel's
/// discovery service supplies the candidates and the selection service picks
/// the endorsers for the chaincode. The outcome replaces `Opts::targets`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProposalProcessorHandler;

impl ProposalProcessorHandler {
    pub fn new() -> Self {
        Self
    }

    async fn select_endorsers(chaincode_id: &str, client_ctx: &ClientContext) -> Result<Vec<Peer>> {
        let candidates = client_ctx
            .discovery
            .get_peers()
            .await
            .map_err(|e| ChannelError::Discovery { source: Box::new(e) })?;

        client_ctx
            .selection
            .get_endorsers_for_chaincode(&candidates, chaincode_id)
            .await
            .map_err(|e| ChannelError::Selection { source: Box::new(e) })
    }
}

#[async_trait]
impl Handler for ProposalProcessorHandler {
    async fn handle(&self, request_ctx: &mut RequestContext, client_ctx: &ClientContext) {
        if request_ctx.is_failed() {
            return;
        }
        if !request_ctx.opts.targets.is_empty() {
            debug!(targets = request_ctx.opts.targets.len(), "using explicit targets");
            return;
        }

        let chaincode_id = request_ctx.request.chaincode_id.as_str();
        match Self::select_endorsers(chaincode_id, client_ctx).await {
            Ok(endorsers) => {
                debug!(chaincode_id, endorsers = endorsers.len(), "selected endorsers");
                request_ctx.opts.targets = endorsers;
            }
            Err(e) => request_ctx.set_error(e),
        }
    }
}
