//! Handler trait and ordered composition of handlers.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ClientContext, RequestContext};

/// One stage of the execution pipeline.
///
/// A stage reads what earlier stages left in the [`RequestContext`] and either
/// adds to the response or records an error with
/// [`RequestContext::set_error`]. Stages never return errors directly.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request_ctx: &mut RequestContext, client_ctx: &ClientContext);
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn handle(&self, request_ctx: &mut RequestContext, client_ctx: &ClientContext) {
        (**self).handle(request_ctx, client_ctx).await
    }
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Box<H> {
    async fn handle(&self, request_ctx: &mut RequestContext, client_ctx: &ClientContext) {
        (**self).handle(request_ctx, client_ctx).await
    }
}

/// Runs handlers in order, stopping at the first recorded error.
#[derive(Default)]
pub struct HandlerChain {
    handlers: Vec<Box<dyn Handler>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn then(mut self, handler: impl Handler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl Handler for HandlerChain {
    async fn handle(&self, request_ctx: &mut RequestContext, client_ctx: &ClientContext) {
        for handler in &self.handlers {
            if request_ctx.is_failed() {
                return;
            }
            handler.handle(request_ctx, client_ctx).await;
        }
    }
}
