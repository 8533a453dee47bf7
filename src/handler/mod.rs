//! Handler module - the transaction execution pipeline.
//!
//! A call is a [`RequestContext`] pushed through a [`HandlerChain`]. Each
//! stage reads what earlier stages produced, and the first recorded error
//! stops the chain.
//!
//! ```text
//! ProposalProcessorHandler ─► EndorsementHandler ─┬─► QueryResultHandler   (new_query_handler)
//!                                                 └─► CommitTxHandler      (new_execute_handler)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use fabric_channel_client::handler::{new_query_handler, Handler, Opts, Request, RequestContext};
//!
//! let mut ctx = RequestContext::new(Request::new("mycc", "query").arg("a"), Opts::new());
//! new_query_handler().handle(&mut ctx, &client_ctx).await;
//! let response = ctx.into_result()?;
//! ```

mod chain;
mod commit;
mod context;
mod endorsement;
mod proposal_processor;
mod query;
#[cfg(test)]
pub(crate) mod testing;

pub use chain::{Handler, HandlerChain};
pub use commit::{new_execute_handler, CommitTxHandler, RegistrationGuard, DEFAULT_EXECUTE_TIMEOUT};
pub use context::{ClientContext, Opts, Request, RequestContext, Response};
pub use endorsement::EndorsementHandler;
pub use proposal_processor::ProposalProcessorHandler;
pub use query::{new_query_handler, QueryResultHandler, DEFAULT_QUERY_TIMEOUT};
