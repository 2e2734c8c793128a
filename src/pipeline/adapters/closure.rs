//! Closure-backed job handlers.

use crate::pipeline::domain::Job;
use crate::pipeline::ports::{JobContext, JobHandler, JobHandlerResult};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;

/// Job handler backed by an async closure.
pub struct FnJobHandler<F> {
    handler: F,
}

impl<F, Fut> FnJobHandler<F>
where
    F: Fn(Job, JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = JobHandlerResult> + Send,
{
    /// Wraps `handler`.
    #[must_use]
    pub const fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> fmt::Debug for FnJobHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnJobHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> JobHandler for FnJobHandler<F>
where
    F: Fn(Job, JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = JobHandlerResult> + Send,
{
    async fn handle(&self, job: &Job, context: JobContext) -> JobHandlerResult {
        (self.handler)(job.clone(), context).await
    }
}
