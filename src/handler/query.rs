//! Terminal stage of read-only calls.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{ClientContext, EndorsementHandler, Handler, HandlerChain, ProposalProcessorHandler, RequestContext};
use crate::error::ChannelError;

/// Default deadline of a query call.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Returns the agreed endorsement payload without ordering the transaction.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryResultHandler;

impl QueryResultHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for QueryResultHandler {
    async fn handle(&self, request_ctx: &mut RequestContext, _client_ctx: &ClientContext) {
        if request_ctx.is_failed() {
            return;
        }
        let response = &request_ctx.response;
        if response.responses.is_empty() {
            request_ctx.set_error(ChannelError::InvalidRequest(
                "query has no endorsed responses".to_string(),
            ));
            return;
        }
        debug!(
            tx_id = %response.transaction_id,
            bytes = response.payload.len(),
            "query completed"
        );
    }
}

/// Selection, endorsement and result extraction.
pub fn new_query_handler() -> HandlerChain {
    HandlerChain::new()
        .then(ProposalProcessorHandler::new())
        .then(EndorsementHandler::with_default_timeout(DEFAULT_QUERY_TIMEOUT))
        .then(QueryResultHandler::new())
}
