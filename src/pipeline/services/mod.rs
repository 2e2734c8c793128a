//! Queue manager and evaluation pipeline services.

mod evaluation;
mod queue;

pub use evaluation::EvaluationPipeline;
pub use queue::{CancelOutcome, PipelineError, PipelineResult, QueueManager};
