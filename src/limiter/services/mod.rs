//! Limiter service.

mod limiter;

pub use limiter::ConnectionLimiter;
