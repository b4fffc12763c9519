//! Flow state machine.
//!
//! ```text
//! PendingStep(n) -> StepRunning(n) -> StepCompleted(n)
//!     StepCompleted(n) -> ScriptEvaluating(n) -> Advancing   (script configured)
//!     StepCompleted(n) -> Advancing                          (static order)
//! Advancing -> PendingStep(k) | FlowSucceeded | FlowFailed
//! any state -> FlowFailed
//! ```

use std::fmt;

use crate::error::FlowError;

/// Why a flow failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The flow hit an error.
    Error(FlowError),
    /// The script decided the flow fails.
    Rejected {
        /// Step the script was deciding after.
        step: u32,
        /// Reason supplied by the script.
        reason: Option<String>,
    },
}

impl FailureReason {
    /// The error, if the failure was not a script decision.
    #[must_use]
    pub const fn error(&self) -> Option<&FlowError> {
        match self {
            Self::Error(err) => Some(err),
            Self::Rejected { .. } => None,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(err) => write!(f, "{err}"),
            Self::Rejected {
                step,
                reason: Some(reason),
            } => write!(f, "rejected by script after step {step}: {reason}"),
            Self::Rejected { step, reason: None } => {
                write!(f, "rejected by script after step {step}")
            }
        }
    }
}

impl From<FlowError> for FailureReason {
    fn from(err: FlowError) -> Self {
        Self::Error(err)
    }
}

/// Where the flow goes after a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Run this step next.
    Step(u32),
    /// Finish successfully.
    Succeed,
    /// Finish with a failure.
    Fail(FailureReason),
}

/// Flow state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    /// Step `n` is next.
    PendingStep(u32),
    /// Step `n`'s authenticator is running.
    StepRunning(u32),
    /// Step `n`'s result is recorded.
    StepCompleted(u32),
    /// The script is deciding what follows step `n`.
    ScriptEvaluating(u32),
    /// The next move is decided but not yet taken.
    Advancing(Transition),
    /// The flow finished successfully.
    FlowSucceeded,
    /// The flow finished with a failure.
    FlowFailed(FailureReason),
}

impl FlowState {
    /// Checks if no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::FlowSucceeded | Self::FlowFailed(_))
    }

    /// Step the state refers to, if any.
    #[must_use]
    pub const fn step(&self) -> Option<u32> {
        match self {
            Self::PendingStep(n)
            | Self::StepRunning(n)
            | Self::StepCompleted(n)
            | Self::ScriptEvaluating(n) => Some(*n),
            _ => None,
        }
    }

    /// Failure reason, if the flow failed.
    #[must_use]
    pub const fn failure(&self) -> Option<&FailureReason> {
        match self {
            Self::FlowFailed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Short state name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PendingStep(_) => "pending_step",
            Self::StepRunning(_) => "step_running",
            Self::StepCompleted(_) => "step_completed",
            Self::ScriptEvaluating(_) => "script_evaluating",
            Self::Advancing(_) => "advancing",
            Self::FlowSucceeded => "flow_succeeded",
            Self::FlowFailed(_) => "flow_failed",
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.step(), self) {
            (Some(n), _) => write!(f, "{}({n})", self.name()),
            (None, Self::FlowFailed(reason)) => write!(f, "{}({reason})", self.name()),
            (None, _) => f.write_str(self.name()),
        }
    }
}
