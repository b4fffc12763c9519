//! Step ledger error types.

use thiserror::Error;

/// Errors that can occur while recording step results.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A result for this step was already recorded.
    #[error("duplicate result for step {0}")]
    DuplicateStep(u32),

    /// A retry was recorded for a step that never completed.
    #[error("no result recorded for step {0}")]
    StepNotRecorded(u32),

    /// Step numbers start at 1.
    #[error("invalid step number: {0}")]
    InvalidStepNumber(u32),
}

impl SessionError {
    /// Checks if this is a duplicate-recording error.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateStep(_))
    }
}

/// Result type for step ledger operations.
pub type SessionResult<T> = Result<T, SessionError>;
