//! Typed publish/subscribe and request/reply message bus.
//!
//! Every other component communicates through the bus: agents report
//! progress, the registry emits health events and the progress aggregator
//! consumes the message catalogue. The module follows hexagonal
//! architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - The dispatcher itself in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
