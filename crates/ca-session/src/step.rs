//! Step result model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one completed authentication step.
///
/// Immutable once recorded: there are no setters, and the store only hands
/// out shared references. The step number and attempt are assigned by
/// [`StepResultStore`](crate::StepResultStore) when the result is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    step_number: u32,
    attempt: u32,
    authenticator: String,
    idp: String,
    succeeded: bool,
    attributes: BTreeMap<String, String>,
    completed_at: DateTime<Utc>,
}

impl StepResult {
    /// Creates an unrecorded step result.
    #[must_use]
    pub fn new(authenticator: impl Into<String>, idp: impl Into<String>, succeeded: bool) -> Self {
        Self {
            step_number: 0,
            attempt: 0,
            authenticator: authenticator.into(),
            idp: idp.into(),
            succeeded,
            attributes: BTreeMap::new(),
            completed_at: Utc::now(),
        }
    }

    /// Adds a subject attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Replaces the subject attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    pub(crate) fn stamp(mut self, step_number: u32, attempt: u32) -> Self {
        self.step_number = step_number;
        self.attempt = attempt;
        self
    }

    /// Step number this result was recorded under (0 if unrecorded).
    #[must_use]
    pub const fn step_number(&self) -> u32 {
        self.step_number
    }

    /// Attempt counter, 1 for the first execution of the step.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Name of the authenticator that ran.
    #[must_use]
    pub fn authenticator(&self) -> &str {
        &self.authenticator
    }

    /// Identity provider that ran ("LOCAL" for resident authenticators).
    #[must_use]
    pub fn idp(&self) -> &str {
        &self.idp
    }

    /// Whether the step succeeded.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Subject attributes returned by the authenticator.
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Looks up a single subject attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// When the step completed.
    #[must_use]
    pub const fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }
}

/// Well-known identity provider names.
pub mod idp {
    /// Identity provider name used for resident (local) authenticators.
    pub const LOCAL: &str = "LOCAL";
}
