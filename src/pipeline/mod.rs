//! Retrying job queues and the evaluation pipeline built on them.
//!
//! Three logical queues (evaluation requests, agent tasks and result
//! processing) run against a [`ports::QueueBackend`] with at-least-once
//! delivery. Handlers must therefore be idempotent: a job whose lease
//! expires is handed to another worker even if the first one later
//! finishes.
//!
//! - Domain types in [`domain`]
//! - Backend and handler contracts in [`ports`]
//! - In-memory backend and closure handlers in [`adapters`]
//! - Queue workers and the evaluation coordinator in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
