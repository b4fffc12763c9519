//! Flow definitions.
//!
//! A flow definition is the configuration collaborator: the ordered list of
//! steps with their authenticators, the optional sequencing script and the
//! repeat policy. Definitions are usually deserialized from JSON.

use std::collections::BTreeMap;

use ca_script::ScriptSource;
use ca_session::step::idp;
use serde::{Deserialize, Serialize};

use crate::authenticator::AuthenticatorRegistry;
use crate::error::{FlowError, FlowResult};

/// One configured step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    /// 1-based step number.
    pub number: u32,
    /// Authenticator id, looked up in the [`AuthenticatorRegistry`].
    pub authenticator: String,
    /// Identity provider the step authenticates against.
    #[serde(default = "local_idp")]
    pub idp: String,
    /// Authenticator-specific options.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

fn local_idp() -> String {
    idp::LOCAL.to_string()
}

impl StepConfig {
    /// Looks up an option.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

/// Whether a script may send the flow back to a step that already ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatPolicy {
    /// Every step runs at most once.
    #[default]
    Deny,
    /// A step may run up to `max_attempts` times in total.
    Retry {
        /// Total attempts allowed per step, including the first.
        max_attempts: u32,
    },
}

impl RepeatPolicy {
    /// Checks whether a step that has run `attempts` times may run again.
    #[must_use]
    pub const fn allows(&self, attempts: u32) -> bool {
        match self {
            Self::Deny => attempts == 0,
            Self::Retry { max_attempts } => attempts < *max_attempts,
        }
    }
}

/// An authentication flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowDefinition {
    /// Flow name, used in logs and events.
    pub name: String,
    /// Steps, numbered contiguously from 1.
    pub steps: Vec<StepConfig>,
    /// Sequencing script; without one the steps run in order.
    #[serde(default)]
    pub script: Option<ScriptSource>,
    /// Repeat policy for script-directed jumps backwards.
    #[serde(default)]
    pub repeat_policy: RepeatPolicy,
}

impl FlowDefinition {
    /// Creates an empty flow.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            script: None,
            repeat_policy: RepeatPolicy::Deny,
        }
    }

    /// Appends a step, numbered after the existing ones.
    #[must_use]
    pub fn with_step(mut self, authenticator: impl Into<String>, idp: impl Into<String>) -> Self {
        let number = u32::try_from(self.steps.len() + 1).unwrap_or(u32::MAX);
        self.steps.push(StepConfig {
            number,
            authenticator: authenticator.into(),
            idp: idp.into(),
            options: BTreeMap::new(),
        });
        self
    }

    /// Sets the sequencing script.
    #[must_use]
    pub fn with_script(mut self, script: ScriptSource) -> Self {
        self.script = Some(script);
        self
    }

    /// Sets the repeat policy.
    #[must_use]
    pub const fn with_repeat_policy(mut self, policy: RepeatPolicy) -> Self {
        self.repeat_policy = policy;
        self
    }

    /// Parses a definition from JSON.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::InvalidDefinition` if the JSON does not describe a
    /// flow.
    pub fn from_json(json: &str) -> FlowResult<Self> {
        serde_json::from_str(json).map_err(|e| FlowError::InvalidDefinition(e.to_string()))
    }

    /// Looks up a step by number.
    #[must_use]
    pub fn step(&self, number: u32) -> Option<&StepConfig> {
        let index = usize::try_from(number.checked_sub(1)?).ok()?;
        self.steps.get(index).filter(|step| step.number == number)
    }

    /// Number of configured steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Checks if the flow has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Checks the static step configuration.
    ///
    /// Script routing targets are not checked here; they are validated when
    /// the script makes its decision.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::InvalidDefinition` if the flow has no steps, the
    /// steps are not numbered 1, 2, 3, ... in order, or a step names an
    /// authenticator that is not registered.
    pub fn validate(&self, authenticators: &AuthenticatorRegistry) -> FlowResult<()> {
        if self.name.trim().is_empty() {
            return Err(FlowError::InvalidDefinition("flow name is empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(FlowError::InvalidDefinition(format!(
                "flow '{}' has no steps",
                self.name
            )));
        }
        for (index, step) in self.steps.iter().enumerate() {
            let expected = index + 1;
            if usize::try_from(step.number).ok() != Some(expected) {
                return Err(FlowError::InvalidDefinition(format!(
                    "flow '{}': expected step {expected}, found step {}",
                    self.name, step.number
                )));
            }
            if !authenticators.contains(&step.authenticator) {
                return Err(FlowError::InvalidDefinition(format!(
                    "flow '{}': step {} uses unknown authenticator '{}'",
                    self.name, step.number, step.authenticator
                )));
            }
        }
        if let RepeatPolicy::Retry { max_attempts: 0 } = self.repeat_policy {
            return Err(FlowError::InvalidDefinition(
                "retry policy needs at least one attempt".to_string(),
            ));
        }
        Ok(())
    }
}
