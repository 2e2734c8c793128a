//! Domain model for bus messages.
//!
//! Messages are immutable once built. Their [`MessageType`] is derived from
//! the typed [`MessagePayload`], so a message can never carry a payload that
//! disagrees with its type.

mod config;
mod error;
mod health;
mod ids;
mod message;
mod payload;

pub use config::BusConfig;
pub use error::{BusError, BusResult, HandlerError, ParseMessageTypeError};
pub use health::{BusHealth, BusHealthStatus, BusStats};
pub use ids::{CorrelationId, MessageId};
pub use message::{Message, MessageType};
pub use payload::MessagePayload;
