//! Connection admission and per-connection message rate limiting.
//!
//! Gates how many live subscribers the service accepts (per user and
//! globally) and how many messages each subscriber may receive, using
//! one-second and one-minute sliding windows. Denials are structured
//! values, not errors, so hot paths can decide how to back off.

pub mod domain;
pub mod services;

#[cfg(test)]
mod tests;
