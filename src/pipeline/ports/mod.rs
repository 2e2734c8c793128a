//! Port contracts of the job pipeline.

mod backend;
mod handler;

pub use backend::{Lease, LeaseToken, QueueBackend, QueueBackendError, QueueBackendResult};
pub use handler::{JobContext, JobError, JobHandler, JobHandlerResult};
