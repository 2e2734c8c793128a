//! Progress domain types.

mod config;
mod error;
mod progress;
mod state;

pub use config::ProgressConfig;
pub use error::{ParseEvaluationStateError, ProgressError, ProgressResult};
pub use progress::{AgentProgress, EvaluationProgress};
pub use state::{AgentRunStatus, EvaluationState};
