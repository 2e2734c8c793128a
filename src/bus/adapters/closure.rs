//! Closure-backed message handlers.

use crate::bus::{
    domain::Message,
    ports::{HandlerResult, MessageHandler},
};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type MessageFilter = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Message handler backed by an async closure.
///
/// # Examples
///
/// ```
/// use assay::bus::adapters::FnHandler;
/// use assay::bus::ports::{HandlerResult, MessageHandler};
///
/// let handler = FnHandler::new("noop", |_message| async { HandlerResult::Ok(()) });
/// assert_eq!(handler.name(), "noop");
/// ```
pub struct FnHandler<F> {
    name: String,
    handler: F,
    filter: Option<MessageFilter>,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    /// Wraps `handler` under the given name.
    #[must_use]
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
            filter: None,
        }
    }

    /// Restricts the handler to messages accepted by `filter`.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Fn(&Message) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler")
            .field("name", &self.name)
            .field("filtered", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn can_handle(&self, message: &Message) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter(message))
    }

    async fn handle(&self, message: &Message) -> HandlerResult {
        (self.handler)(message.clone()).await
    }
}
