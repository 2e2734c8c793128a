//! Limiter domain types.

mod admission;
mod config;
mod connection;
mod error;
mod metrics;

pub use admission::{Admission, DenialReason};
pub use config::LimiterConfig;
pub use connection::{ConnectionId, ConnectionRecord, UserId};
pub use error::{LimiterError, LimiterResult};
pub use metrics::{CleanupReport, LimiterMetrics};
