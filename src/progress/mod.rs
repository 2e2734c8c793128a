//! Per-evaluation progress snapshots.
//!
//! The aggregator is seeded with the agents an evaluation expects, folds
//! agent lifecycle messages from the bus into a snapshot, and hands out
//! immutable copies or a `watch` channel to delivery adapters.

pub mod domain;
pub mod services;

#[cfg(test)]
mod tests;
