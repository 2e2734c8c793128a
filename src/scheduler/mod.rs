//! Agent registry and dependency-ordered scheduling.
//!
//! Knows every available analysis agent, its declared dependencies and
//! health, and computes a safe execution order and parallel groups. The
//! module follows hexagonal architecture:
//!
//! - Domain types and graph algorithms in [`domain`]
//! - The agent contract in [`ports`]
//! - Scripted in-memory agents in [`adapters`]
//! - The registry service in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
