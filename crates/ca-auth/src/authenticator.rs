//! Authenticator trait and registry.
//!
//! Authenticators are pluggable components that carry out one step of a
//! flow (password check, OTP, federated login, ...). The flow executor only
//! sees their outcome.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::definition::StepConfig;
use crate::error::AuthResult;

/// Outcome of one authenticator execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    succeeded: bool,
    idp: Option<String>,
    attributes: BTreeMap<String, String>,
}

impl StepOutcome {
    /// Creates a success outcome.
    #[must_use]
    pub const fn success() -> Self {
        Self {
            succeeded: true,
            idp: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub const fn failed() -> Self {
        Self {
            succeeded: false,
            idp: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Reports the identity provider that actually authenticated the
    /// subject, overriding the step's configured one.
    #[must_use]
    pub fn with_idp(mut self, idp: impl Into<String>) -> Self {
        self.idp = Some(idp.into());
        self
    }

    /// Adds a subject attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Checks if this is a success outcome.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.succeeded
    }

    /// Identity provider override, if any.
    #[must_use]
    pub fn idp(&self) -> Option<&str> {
        self.idp.as_deref()
    }

    /// Subject attributes.
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub(crate) fn into_parts(self) -> (bool, Option<String>, BTreeMap<String, String>) {
        (self.succeeded, self.idp, self.attributes)
    }
}

/// Read-only context passed to authenticators.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Session ID.
    pub session_id: Uuid,
    /// Flow name.
    pub flow: String,
    /// Step being executed.
    pub step_number: u32,
    /// Attempt number for this step, starting at 1.
    pub attempt: u32,
    /// Context properties at the time the step started.
    pub properties: BTreeMap<String, String>,
}

impl StepContext {
    /// Gets a context property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Authenticator trait.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns the authenticator ID.
    fn id(&self) -> &str;

    /// Returns the display name.
    fn display_name(&self) -> &str {
        self.id()
    }

    /// Runs the step.
    ///
    /// Returns a failed [`StepOutcome`] when the subject did not
    /// authenticate, and an error only when the step could not run.
    async fn run_step(&self, step: &StepConfig, context: &StepContext) -> AuthResult<StepOutcome>;
}

/// Registry of authenticators keyed by ID.
#[derive(Default)]
pub struct AuthenticatorRegistry {
    authenticators: DashMap<String, Arc<dyn Authenticator>>,
}

impl fmt::Debug for AuthenticatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatorRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

impl AuthenticatorRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an authenticator, replacing any with the same ID.
    pub fn register(&self, authenticator: Arc<dyn Authenticator>) {
        let id = authenticator.id().to_string();
        tracing::debug!(authenticator = %id, "registered authenticator");
        self.authenticators.insert(id, authenticator);
    }

    /// Gets an authenticator by ID.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn Authenticator>> {
        self.authenticators.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Checks if an authenticator is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.authenticators.contains_key(id)
    }

    /// Registered IDs, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .authenticators
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the number of registered authenticators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.authenticators.len()
    }

    /// Checks if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.authenticators.is_empty()
    }
}
