//! Port contracts for message consumers.

pub mod handler;

pub use handler::{HandlerResult, MessageHandler};
