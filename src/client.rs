//! Channel client builder and call entry points.
//!
//! The [`ChannelClientBuilder`] configures per-call defaults. The
//! [`ChannelClient`] turns each call into a [`RequestContext`], runs it
//! through a handler chain and returns the [`Response`]:
//! 1. Resolve the call timeout (unset or zero takes the configured default)
//! 2. Run the chain with the channel's [`ClientContext`]
//! 3. Return the response or the first error recorded by a stage
//!
//! # Example
//!
//! ```ignore
//! use fabric_channel_client::{ChannelClient, Opts, Request};
//!
//! let client = ChannelClient::builder(client_ctx)
//!     .execute_timeout(Duration::from_secs(60))
//!     .build();
//!
//! let value = client.query(Request::new("mycc", "query").arg("a"), Opts::new()).await?;
//! let committed = client
//!     .execute(Request::new("mycc", "move").args(["a", "b", "10"]), Opts::new())
//!     .await?;
//! ```

use std::time::Duration;

use crate::error::{ChannelError, Result};
use crate::handler::{
    new_execute_handler, new_query_handler, ClientContext, Handler, HandlerChain, Opts, Request,
    RequestContext, Response, DEFAULT_EXECUTE_TIMEOUT, DEFAULT_QUERY_TIMEOUT,
};

/// Builder for configuring and creating a [`ChannelClient`].
pub struct ChannelClientBuilder {
    context: ClientContext,
    query_timeout: Duration,
    execute_timeout: Duration,
}

impl ChannelClientBuilder {
    pub fn new(context: ClientContext) -> Self {
        Self {
            context,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            execute_timeout: DEFAULT_EXECUTE_TIMEOUT,
        }
    }

    /// Default deadline of `query` calls.
    ///
    /// Default: 30 seconds
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Default deadline of `execute` and `invoke_handler` calls.
    ///
    /// Default: 180 seconds
    pub fn execute_timeout(mut self, timeout: Duration) -> Self {
        self.execute_timeout = timeout;
        self
    }

    pub fn build(self) -> ChannelClient {
        ChannelClient {
            context: self.context,
            query_timeout: non_zero_or(self.query_timeout, DEFAULT_QUERY_TIMEOUT),
            execute_timeout: non_zero_or(self.execute_timeout, DEFAULT_EXECUTE_TIMEOUT),
            query_handler: new_query_handler(),
            execute_handler: new_execute_handler(),
        }
    }
}

/// Client bound to one channel.
///
/// Calls do not share mutable state, so one client can serve many concurrent
/// calls (share it behind an `Arc`).
pub struct ChannelClient {
    context: ClientContext,
    query_timeout: Duration,
    execute_timeout: Duration,
    query_handler: HandlerChain,
    execute_handler: HandlerChain,
}

impl ChannelClient {
    pub fn builder(context: ClientContext) -> ChannelClientBuilder {
        ChannelClientBuilder::new(context)
    }

    /// Client with default timeouts.
    pub fn new(context: ClientContext) -> Self {
        ChannelClientBuilder::new(context).build()
    }

    #[inline]
    pub fn channel_id(&self) -> &str {
        &self.context.channel_id
    }

    #[inline]
    pub fn context(&self) -> &ClientContext {
        &self.context
    }

    /// Evaluate a chaincode function on the endorsers without ordering it.
    pub async fn query(&self, request: Request, opts: Opts) -> Result<Response> {
        self.run(&self.query_handler, "query", request, opts, self.query_timeout)
            .await
    }

    /// Endorse, order and wait for the commit of a chaincode invocation.
    pub async fn execute(&self, request: Request, opts: Opts) -> Result<Response> {
        self.run(&self.execute_handler, "execute", request, opts, self.execute_timeout)
            .await
    }

    /// Run a caller-supplied handler, using the execute timeout as default.
    pub async fn invoke_handler(
        &self,
        handler: &dyn Handler,
        request: Request,
        opts: Opts,
    ) -> Result<Response> {
        self.run(handler, "invoke", request, opts, self.execute_timeout)
            .await
    }

    async fn run(
        &self,
        handler: &dyn Handler,
        call: &'static str,
        request: Request,
        mut opts: Opts,
        default_timeout: Duration,
    ) -> Result<Response> {
        if request.chaincode_id.is_empty() || request.fcn.is_empty() {
            return Err(ChannelError::InvalidRequest(
                "chaincode id and function name are required".to_string(),
            ));
        }

        opts.timeout = Some(opts.resolved_timeout(default_timeout));
        tracing::debug!(
            call,
            channel_id = %self.context.channel_id,
            chaincode_id = %request.chaincode_id,
            fcn = %request.fcn,
            timeout = ?opts.timeout,
            "invoking handler"
        );

        let mut request_ctx = RequestContext::new(request, opts);
        // Start the clock before any stage runs.
        request_ctx.deadline(default_timeout);
        handler.handle(&mut request_ctx, &self.context).await;

        let result = request_ctx.into_result();
        if let Err(e) = &result {
            tracing::debug!(call, error = %e, "call failed");
        }
        result
    }
}

fn non_zero_or(timeout: Duration, default: Duration) -> Duration {
    if timeout.is_zero() {
        default
    } else {
        timeout
    }
}
