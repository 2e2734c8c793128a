//! Job pipeline domain model.

mod backoff;
mod config;
mod error;
mod event;
mod ids;
mod job;
mod kind;
mod options;
mod payload;
mod run;

pub use backoff::{BackoffKind, BackoffPolicy};
pub use config::{PipelineConfig, QueueSettings};
pub use error::{ParseJobKindError, ParseJobStatusError};
pub use event::QueueEvent;
pub use ids::JobId;
pub use job::{Job, JobCounts, JobStatus};
pub use kind::JobKind;
pub use options::JobOptions;
pub use payload::JobPayload;
pub use run::{AgentPhase, EvaluationRun};
