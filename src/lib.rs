//! Assay: orchestration core for multi-agent business idea evaluation.
//!
//! A submitted idea is evaluated by several independent analysis agents. This
//! crate decides which agents run, in which order and with what concurrency,
//! retries their work, aggregates their progress and protects live progress
//! delivery from overload.
//!
//! # Architecture
//!
//! Each component follows hexagonal architecture principles:
//!
//! - **Domain**: Pure types and invariants with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external collaborators
//! - **Adapters**: In-memory implementations of ports
//! - **Services**: Orchestration over domain types and ports
//!
//! # Modules
//!
//! - [`bus`]: Typed publish/subscribe and request/reply message bus
//! - [`scheduler`]: Agent registry and dependency-ordered scheduling
//! - [`pipeline`]: Retrying job queues and the evaluation pipeline
//! - [`progress`]: Per-evaluation progress snapshots
//! - [`limiter`]: Connection admission and per-connection message rate limits
//! - [`orchestrator`]: Composition root wiring every component together
//! - [`config`]: JSON-loadable configuration for every component

pub mod background;
pub mod bus;
pub mod clock;
pub mod config;
pub mod ids;
pub mod limiter;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod scheduler;
