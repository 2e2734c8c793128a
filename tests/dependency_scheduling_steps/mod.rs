//! Step definitions for dependency scheduling scenarios.

mod given;
mod then;
mod when;
pub mod world;
