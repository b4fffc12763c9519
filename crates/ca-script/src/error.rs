//! Script error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while compiling or evaluating a script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// The script source could not be compiled.
    #[error("script compile error at line {line}: {message}")]
    Compile {
        /// 1-based source line (0 when unknown).
        line: u32,
        /// Description of the problem.
        message: String,
    },

    /// An uncaught exception or runtime fault inside the script.
    #[error("script evaluation error: {0}")]
    Evaluation(String),

    /// A value had the wrong type for the operation (engine coercion failure).
    #[error("script type error: {0}")]
    Type(String),

    /// The script tried to write to a read-only host object.
    #[error("cannot assign to read-only property '{member}' of {object}")]
    ReadOnly {
        /// Host object class name.
        object: &'static str,
        /// Member the script tried to write.
        member: String,
    },

    /// The script called a capability the sandbox does not grant.
    #[error("'{0}' is not available in this sandbox")]
    SandboxDenied(String),

    /// The script exceeded its wall-clock budget.
    #[error("script exceeded its time limit of {}ms", limit.as_millis())]
    Timeout {
        /// Configured limit.
        limit: Duration,
    },

    /// The script exceeded its operation budget.
    #[error("script exceeded its budget of {0} operations")]
    BudgetExhausted(u64),

    /// No runtime is registered under this engine name.
    #[error("unknown script engine: {0}")]
    UnknownEngine(String),
}

impl ScriptError {
    /// Checks if the error means the script ran out of time or operations.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::BudgetExhausted(_))
    }

    /// Shorthand for a compile error.
    pub(crate) fn compile(line: u32, message: impl Into<String>) -> Self {
        Self::Compile {
            line,
            message: message.into(),
        }
    }
}

/// Result type for script operations.
pub type ScriptResult<T> = Result<T, ScriptError>;
