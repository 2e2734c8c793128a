//! Message handler port.

use crate::bus::domain::{HandlerError, Message};
use async_trait::async_trait;

/// Result type returned by message handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Consumer of bus messages of one type.
///
/// Handlers for the same type run concurrently and independently; a failing
/// or panicking handler never prevents the others from running.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Returns a stable name used in logs and `handler-error` events.
    fn name(&self) -> &str;

    /// Returns whether this handler wants `message`.
    ///
    /// Defaults to accepting every message of the subscribed type.
    fn can_handle(&self, message: &Message) -> bool {
        let _ = message;
        true
    }

    /// Processes a message.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when processing fails. The bus logs the
    /// failure and emits a `handler-error` message; the publisher is not
    /// affected.
    async fn handle(&self, message: &Message) -> HandlerResult;
}
