//! Request-level error taxonomy.
//!
//! Failures local to one test case (compile, runtime, timeout, resource)
//! travel as status values, not errors; `JudgeError` covers the failures
//! that are fatal to a whole request.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JudgeError {
    /// The requested problem does not exist in the store.
    #[error("problem {0} not found")]
    ProblemNotFound(i64),

    /// Malformed request payload, id, or test-case input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Anything that prevented the subsystem itself from operating.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
