use std::future::Future;

use async_trait::async_trait;

use crate::{Message, Request};

#[async_trait]
/// A generic message handler.
///
/// Every inbound request is handled in its own task, so a handler may block
/// on further calls (including calls back over the request's own connection)
/// without stalling other requests.
pub trait Handler: Send + Sync + 'static {
    /// Process a request and produce the reply sent back to the caller.
    async fn on_message(&self, request: Request) -> Message;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Message> + Send + 'static,
{
    async fn on_message(&self, request: Request) -> Message {
        (self)(request).await
    }
}
