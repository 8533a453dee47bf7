//! Sends the proposal to the endorsers and reconciles their answers.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use super::{ClientContext, Handler, RequestContext, DEFAULT_QUERY_TIMEOUT};
use crate::error::{ChannelError, Result};
use crate::fab::{ProposalResult, TransactionProposal, TransactionProposalResponse};

/// Second stage: collects endorsements.
///
/// Builds the proposal under a fresh transaction header, sends it to
/// `Opts::targets` and accepts the outcome only when every successful
/// response carries a success status and an identical payload.
#[derive(Debug, Clone, Copy)]
pub struct EndorsementHandler {
    default_timeout: Duration,
}

impl EndorsementHandler {
    pub fn new() -> Self {
        Self::with_default_timeout(DEFAULT_QUERY_TIMEOUT)
    }

    /// Timeout applied when the call's options do not set one.
    pub fn with_default_timeout(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    async fn endorse(
        &self,
        request_ctx: &RequestContext,
        deadline: Instant,
        client_ctx: &ClientContext,
    ) -> Result<(TransactionProposal, Vec<TransactionProposalResponse>)> {
        let targets = &request_ctx.opts.targets;
        if targets.is_empty() {
            return Err(ChannelError::InvalidRequest(
                "no endorsing peers for proposal".to_string(),
            ));
        }

        let request = &request_ctx.request;
        let header = client_ctx.transactor.create_transaction_header().await?;
        let proposal = TransactionProposal::new(
            header,
            &request.chaincode_id,
            &request.fcn,
            &request.args,
            &request.transient_map,
        )?;

        let timeout = request_ctx.timeout(self.default_timeout);
        let results = timeout_at(
            deadline,
            client_ctx
                .transactor
                .send_transaction_proposal(&proposal, targets),
        )
        .await
        .map_err(|_| ChannelError::Timeout(timeout, "proposal responses"))??;

        let responses = successful_responses(results)?;
        check_endorsements(&responses)?;
        Ok((proposal, responses))
    }
}

impl Default for EndorsementHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for EndorsementHandler {
    async fn handle(&self, request_ctx: &mut RequestContext, client_ctx: &ClientContext) {
        if request_ctx.is_failed() {
            return;
        }
        let deadline = request_ctx.deadline(self.default_timeout);
        match self.endorse(request_ctx, deadline, client_ctx).await {
            Ok((proposal, responses)) => {
                debug!(
                    tx_id = %proposal.tx_id,
                    endorsements = responses.len(),
                    "proposal endorsed"
                );
                let response = &mut request_ctx.response;
                response.transaction_id = proposal.tx_id.clone();
                response.payload = responses[0].response.payload.clone();
                response.proposal = Some(proposal);
                response.responses = responses;
            }
            Err(e) => request_ctx.set_error(e),
        }
    }
}

/// Keep the successful responses, failing only when there are none.
fn successful_responses(results: Vec<ProposalResult>) -> Result<Vec<TransactionProposalResponse>> {
    let mut responses = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(response) => responses.push(response),
            Err(e) => failures.push(e.to_string()),
        }
    }

    if responses.is_empty() {
        return Err(ChannelError::ProposalFailed { failures });
    }
    if !failures.is_empty() {
        warn!(failed = failures.len(), succeeded = responses.len(), "some endorsers failed");
    }
    Ok(responses)
}

/// Every response must succeed and agree byte-for-byte with the first.
fn check_endorsements(responses: &[TransactionProposalResponse]) -> Result<()> {
    for response in responses {
        if !response.is_success() {
            return Err(ChannelError::EndorsementStatus {
                endorser: response.endorser.clone(),
                status: response.response.status,
                message: response.response.message.clone(),
            });
        }
    }

    if let Some((first, rest)) = responses.split_first() {
        if let Some(other) = rest.iter().find(|r| r.payload != first.payload) {
            return Err(ChannelError::EndorsementMismatch {
                first: first.endorser.clone(),
                other: other.endorser.clone(),
            });
        }
    }
    Ok(())
}
