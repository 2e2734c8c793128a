//! Adapter implementations of the bus ports.

pub mod closure;

pub use closure::FnHandler;
