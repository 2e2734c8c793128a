//! Progress services.

mod aggregator;
mod events;

pub use aggregator::ProgressAggregator;
pub use events::ProgressEventHandler;
