//! Submits an endorsed transaction and waits for its commit status.
//!
//! ```text
//! register tx status ─► create envelope ─► send to orderer ─► wait
//!                                                              ├─ VALID        -> committed
//!                                                              ├─ other code   -> TxValidation
//!                                                              └─ deadline     -> Timeout
//! ```
//!
//! The tx-status registration is made before the transaction leaves the
//! client so a fast commit cannot be missed, and it is removed on every exit
//! path by [`RegistrationGuard`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use super::{ClientContext, EndorsementHandler, Handler, HandlerChain, ProposalProcessorHandler, RequestContext};
use crate::error::{ChannelError, Result};
use crate::events::{EventService, Registration, TxValidationCode};
use crate::fab::TransactionRequest;

/// Default deadline of an execute call.
pub const DEFAULT_EXECUTE_TIMEOUT: Duration = Duration::from_secs(180);

/// Unregisters its registration when dropped.
pub struct RegistrationGuard<'a> {
    events: &'a dyn EventService,
    registration: Registration,
}

impl<'a> RegistrationGuard<'a> {
    pub fn new(events: &'a dyn EventService, registration: Registration) -> Self {
        Self { events, registration }
    }

    pub fn registration(&self) -> &Registration {
        &self.registration
    }
}

impl Drop for RegistrationGuard<'_> {
    fn drop(&mut self) {
        self.events.unregister(&self.registration);
    }
}

/// Terminal stage of execute calls.
#[derive(Debug, Clone, Copy)]
pub struct CommitTxHandler {
    default_timeout: Duration,
}

impl CommitTxHandler {
    pub fn new() -> Self {
        Self::with_default_timeout(DEFAULT_EXECUTE_TIMEOUT)
    }

    pub fn with_default_timeout(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    async fn commit(
        &self,
        request_ctx: &RequestContext,
        deadline: Instant,
        client_ctx: &ClientContext,
    ) -> Result<TxValidationCode> {
        let proposal = request_ctx.response.proposal.clone().ok_or_else(|| {
            ChannelError::InvalidRequest("commit requires an endorsed proposal".to_string())
        })?;
        let tx_id = proposal.tx_id.clone();
        let timeout = request_ctx.timeout(self.default_timeout);

        let events = &*client_ctx.event_service;
        let (registration, mut statuses) = events.register_tx_status_event(&tx_id).await?;
        let guard = RegistrationGuard::new(events, registration);

        let submit = async {
            let transaction = client_ctx
                .transactor
                .create_transaction(TransactionRequest {
                    proposal,
                    responses: request_ctx.response.responses.clone(),
                })
                .await?;
            client_ctx.transactor.send_transaction(&transaction).await
        };
        let ack = timeout_at(deadline, submit)
            .await
            .map_err(|_| ChannelError::Timeout(timeout, "transaction submission"))?
            .map_err(|e| ChannelError::Ordering { source: Box::new(e) })?;
        debug!(
            tx_id = %tx_id,
            orderer = %ack.orderer,
            registration = %guard.registration().id(),
            "transaction submitted, awaiting commit"
        );

        let status = timeout_at(deadline, statuses.recv())
            .await
            .map_err(|_| ChannelError::Timeout(timeout, "transaction commit status"))?
            .ok_or(ChannelError::DispatcherStopped)?;

        if status.validation_code.is_valid() {
            Ok(status.validation_code)
        } else {
            Err(ChannelError::TxValidation {
                tx_id,
                code: status.validation_code,
            })
        }
    }
}

impl Default for CommitTxHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for CommitTxHandler {
    async fn handle(&self, request_ctx: &mut RequestContext, client_ctx: &ClientContext) {
        if request_ctx.is_failed() {
            return;
        }
        let deadline = request_ctx.deadline(self.default_timeout);
        match self.commit(request_ctx, deadline, client_ctx).await {
            Ok(code) => {
                debug!(tx_id = %request_ctx.response.transaction_id, "transaction committed");
                request_ctx.response.validation_code = Some(code);
            }
            Err(e) => {
                warn!(tx_id = %request_ctx.response.transaction_id, error = %e, "transaction not committed");
                if let ChannelError::TxValidation { code, .. } = &e {
                    request_ctx.response.validation_code = Some(*code);
                }
                request_ctx.set_error(e);
            }
        }
    }
}

/// Selection, endorsement, ordering and commit confirmation.
pub fn new_execute_handler() -> HandlerChain {
    HandlerChain::new()
        .then(ProposalProcessorHandler::new())
        .then(EndorsementHandler::with_default_timeout(DEFAULT_EXECUTE_TIMEOUT))
        .then(CommitTxHandler::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::spawn_dispatcher_default;
    use crate::handler::testing::{commit_context, commit_context_with_peers, MockPeer, MockTransactor};
    use crate::handler::{Opts, Request};

    fn execute_request(opts: Opts) -> RequestContext {
        RequestContext::new(Request::new("testCC", "invoke").args(["move", "a", "b", "1"]), opts)
    }

    #[tokio::test]
    async fn test_execute_commits() {
        let (events, _task) = spawn_dispatcher_default();
        let transactor = MockTransactor::committing(events.clone(), TxValidationCode::Valid);
        let ctx = commit_context(transactor.clone(), events.clone());

        let mut req = execute_request(Opts::new());
        new_execute_handler().handle(&mut req, &ctx).await;

        let response = req.into_result().unwrap();
        assert_eq!(response.validation_code, Some(TxValidationCode::Valid));
        assert_eq!(*transactor.submitted.lock().unwrap(), vec![response.transaction_id.clone()]);
        assert_eq!(events.stats().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_validation_failure_surfaced() {
        let (events, _task) = spawn_dispatcher_default();
        let transactor = MockTransactor::committing(events.clone(), TxValidationCode::MvccReadConflict);
        let ctx = commit_context(transactor, events.clone());

        let mut req = execute_request(Opts::new());
        new_execute_handler().handle(&mut req, &ctx).await;

        assert_eq!(req.response.validation_code, Some(TxValidationCode::MvccReadConflict));
        let err = req.into_result().unwrap_err();
        assert!(matches!(
            err,
            ChannelError::TxValidation {
                code: TxValidationCode::MvccReadConflict,
                ..
            }
        ));
        assert_eq!(events.stats().await.unwrap().total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_registration() {
        let (events, _task) = spawn_dispatcher_default();
        let ctx = commit_context(MockTransactor::new(), events.clone());

        let mut req = execute_request(Opts::new().with_timeout(Duration::from_millis(50)));
        new_execute_handler().handle(&mut req, &ctx).await;

        let tx_id = req.response.transaction_id.clone();
        let err = req.into_result().unwrap_err();
        assert!(err.is_timeout());

        let stats = events.stats().await.unwrap();
        assert!(!stats.is_tx_registered(&tx_id));
        assert_eq!(stats.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_endorsement_shortens_commit_wait() {
        let (events, _task) = spawn_dispatcher_default();
        let transactor = MockTransactor::committing_after(
            events.clone(),
            TxValidationCode::Valid,
            Duration::from_millis(80),
        );
        let ctx = commit_context_with_peers(
            vec![MockPeer::slow("peer1", "value", Duration::from_millis(80))],
            transactor.clone(),
            events.clone(),
        );

        let started = Instant::now();
        let mut req = execute_request(Opts::new().with_timeout(Duration::from_millis(100)));
        new_execute_handler().handle(&mut req, &ctx).await;

        // Endorsed at 80ms, commit due at 160ms, call deadline at 100ms
        assert!(matches!(
            req.into_result(),
            Err(ChannelError::Timeout(d, _)) if d == Duration::from_millis(100)
        ));
        assert!(started.elapsed() < Duration::from_millis(160));
        assert_eq!(transactor.submitted.lock().unwrap().len(), 1);
        assert_eq!(events.stats().await.unwrap().total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_within_remaining_time() {
        let (events, _task) = spawn_dispatcher_default();
        let transactor = MockTransactor::committing_after(
            events.clone(),
            TxValidationCode::Valid,
            Duration::from_millis(10),
        );
        let ctx = commit_context_with_peers(
            vec![MockPeer::slow("peer1", "value", Duration::from_millis(80))],
            transactor,
            events,
        );

        let mut req = execute_request(Opts::new().with_timeout(Duration::from_millis(100)));
        new_execute_handler().handle(&mut req, &ctx).await;

        assert_eq!(req.into_result().unwrap().validation_code, Some(TxValidationCode::Valid));
    }

    #[tokio::test]
    async fn test_failed_context_is_not_submitted() {
        let (events, _task) = spawn_dispatcher_default();
        let transactor = MockTransactor::committing(events.clone(), TxValidationCode::Valid);
        let ctx = commit_context(transactor.clone(), events.clone());

        let mut req = execute_request(Opts::new());
        EndorsementHandler::new().handle(&mut req, &ctx).await;
        req.set_error(ChannelError::service("earlier failure"));
        CommitTxHandler::new().handle(&mut req, &ctx).await;

        assert_eq!(req.error().unwrap().to_string(), "earlier failure");
        assert!(transactor.submitted.lock().unwrap().is_empty());
        assert_eq!(events.stats().await.unwrap().total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_uses_default() {
        let (events, _task) = spawn_dispatcher_default();
        let ctx = commit_context(MockTransactor::new(), events.clone());

        let started = Instant::now();
        let mut req = execute_request(Opts::new().with_timeout(Duration::ZERO));
        new_execute_handler().handle(&mut req, &ctx).await;

        assert!(matches!(
            req.into_result(),
            Err(ChannelError::Timeout(d, _)) if d == DEFAULT_EXECUTE_TIMEOUT
        ));
        assert!(started.elapsed() >= DEFAULT_EXECUTE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_ordering_failure_removes_registration() {
        let (events, _task) = spawn_dispatcher_default();
        let ctx = commit_context(MockTransactor::failing_order("orderer unavailable"), events.clone());

        let mut req = execute_request(Opts::new());
        new_execute_handler().handle(&mut req, &ctx).await;

        let err = req.into_result().unwrap_err();
        assert!(matches!(err, ChannelError::Ordering { .. }));
        assert!(err.to_string().contains("orderer unavailable"));
        assert_eq!(events.stats().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn test_stopped_dispatcher() {
        let (events, task) = spawn_dispatcher_default();
        events.stop().await.unwrap();
        task.await.unwrap();
        let ctx = commit_context(MockTransactor::new(), events);

        let mut req = execute_request(Opts::new());
        new_execute_handler().handle(&mut req, &ctx).await;

        assert!(matches!(req.into_result(), Err(ChannelError::DispatcherStopped)));
    }

    #[tokio::test]
    async fn test_commit_without_proposal() {
        let (events, _task) = spawn_dispatcher_default();
        let ctx = commit_context(MockTransactor::new(), events);

        let mut req = execute_request(Opts::new());
        CommitTxHandler::new().handle(&mut req, &ctx).await;

        assert!(matches!(req.into_result(), Err(ChannelError::InvalidRequest(_))));
    }
}
