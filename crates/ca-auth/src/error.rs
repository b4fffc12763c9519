//! Authentication and flow error types.

use std::fmt;

use ca_script::ScriptError;
use thiserror::Error;

/// Errors an authenticator reports instead of a step outcome.
///
/// A rejected credential is not an error: authenticators report it as a
/// failed [`StepOutcome`](crate::authenticator::StepOutcome). An `AuthError`
/// means the step could not be carried out at all and ends the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The authenticator needs configuration it was not given.
    Misconfigured(String),
    /// An external identity provider could not be reached.
    ProviderUnavailable {
        /// Identity provider name.
        idp: String,
    },
    /// Authentication session has expired.
    SessionExpired,
    /// Internal error.
    Internal(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Misconfigured(msg) => write!(f, "authenticator misconfigured: {msg}"),
            Self::ProviderUnavailable { idp } => {
                write!(f, "identity provider '{idp}' is unavailable")
            }
            Self::SessionExpired => write!(f, "session has expired"),
            Self::Internal(msg) => write!(f, "internal authentication error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Result type for authenticator operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors that terminate an authentication flow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    /// A step was completed twice.
    #[error("step {0} was already completed")]
    DuplicateStep(u32),

    /// The script raised an error.
    #[error("script failed after step {step}: {source}")]
    ScriptEvaluation {
        /// Step the script was deciding after.
        step: u32,
        /// Engine error.
        #[source]
        source: ScriptError,
    },

    /// The script ran out of time or operations.
    #[error("script timed out after step {step}: {source}")]
    ScriptTimeout {
        /// Step the script was deciding after.
        step: u32,
        /// Engine error.
        #[source]
        source: ScriptError,
    },

    /// The script routed to a step the flow does not define.
    #[error("step {0} has no configured authenticator")]
    InvalidStepTarget(u32),

    /// A step in the static sequence failed.
    #[error("step {0} failed")]
    StepFailed(u32),

    /// An authenticator could not carry out its step.
    #[error("authenticator '{authenticator}' failed at step {step}: {message}")]
    Authenticator {
        /// Step number.
        step: u32,
        /// Authenticator id.
        authenticator: String,
        /// Error description.
        message: String,
    },

    /// The authentication session expired.
    #[error("authentication session expired")]
    SessionExpired,

    /// The flow was cancelled by its host.
    #[error("flow cancelled")]
    Cancelled,

    /// A step result arrived for a step the flow is not running.
    #[error("step {0} is not awaiting a result")]
    StepNotAwaited(u32),

    /// The flow tried to run a step again and its repeat policy forbids it.
    #[error("step {0} may not run again")]
    RepeatNotAllowed(u32),

    /// The flow definition is unusable.
    #[error("invalid flow definition: {0}")]
    InvalidDefinition(String),
}

impl FlowError {
    /// Checks if the error came from the sequencing script.
    #[must_use]
    pub const fn is_script_error(&self) -> bool {
        matches!(self, Self::ScriptEvaluation { .. } | Self::ScriptTimeout { .. })
    }

    /// Wraps a script error, classifying budget exhaustion as a timeout.
    #[must_use]
    pub fn from_script(step: u32, source: ScriptError) -> Self {
        if source.is_timeout() {
            Self::ScriptTimeout { step, source }
        } else {
            Self::ScriptEvaluation { step, source }
        }
    }
}

/// Result type for flow operations.
pub type FlowResult<T> = Result<T, FlowError>;
