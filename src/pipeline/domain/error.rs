//! Pipeline domain parse errors.

use thiserror::Error;

/// Error returned while parsing a job kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown job kind: {0}")]
pub struct ParseJobKindError(pub String);

/// Error returned while parsing a job status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown job status: {0}")]
pub struct ParseJobStatusError(pub String);
