//! Common test utilities and fixtures.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ca_auth::{
    AuthError, AuthResult, Authenticator, AuthenticatorRegistry, StepConfig, StepContext,
    StepOutcome,
};
use ca_auth::{AuthenticationContext, FlowDefinition, FlowExecutor};
use ca_core::{EngineConfig, InMemoryEventListener};

/// Authenticator that always reports the same outcome.
///
/// The reported IdP comes from the step's `idp` option when set, so one
/// authenticator can stand in for several identity providers.
pub struct Scripted {
    id: &'static str,
    succeeded: bool,
    attributes: BTreeMap<String, String>,
}

impl Scripted {
    pub fn passing(id: &'static str) -> Self {
        Self {
            id,
            succeeded: true,
            attributes: BTreeMap::new(),
        }
    }

    pub fn failing(id: &'static str) -> Self {
        Self {
            id,
            succeeded: false,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl Authenticator for Scripted {
    fn id(&self) -> &str {
        self.id
    }

    async fn run_step(&self, step: &StepConfig, _context: &StepContext) -> AuthResult<StepOutcome> {
        let mut outcome = if self.succeeded {
            StepOutcome::success()
        } else {
            StepOutcome::failed()
        };
        if let Some(idp) = step.option("idp") {
            outcome = outcome.with_idp(idp);
        }
        for (key, value) in &self.attributes {
            outcome = outcome.with_attribute(key.clone(), value.clone());
        }
        Ok(outcome)
    }
}

/// Authenticator that never answers within a test's lifetime.
pub struct Hanging;

#[async_trait]
impl Authenticator for Hanging {
    fn id(&self) -> &str {
        "hanging"
    }

    async fn run_step(&self, _step: &StepConfig, _context: &StepContext) -> AuthResult<StepOutcome> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Err(AuthError::Internal("woke up".to_string()))
    }
}

/// Test environment: an executor wired to recording listeners.
pub struct TestEnv {
    /// Executor under test.
    pub executor: FlowExecutor,
    /// Events emitted by the executor.
    pub events: InMemoryEventListener,
}

impl TestEnv {
    /// Creates an environment with default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an environment with the given configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("ca_auth=debug,ca_script=debug")
            .with_test_writer()
            .try_init();

        let authenticators = AuthenticatorRegistry::new();
        authenticators.register(Arc::new(
            Scripted::passing("password").with_attribute("username", "alice"),
        ));
        authenticators.register(Arc::new(Scripted::passing("totp")));
        authenticators.register(Arc::new(Scripted::passing("federated")));
        authenticators.register(Arc::new(Scripted::failing("locked")));
        authenticators.register(Arc::new(Hanging));

        let events = InMemoryEventListener::new();
        let executor = FlowExecutor::new(Arc::new(authenticators), config)
            .expect("engine config is valid")
            .with_listener(Arc::new(events.clone()));
        Self { executor, events }
    }

    /// Starts a flow.
    pub fn start(&self, flow: FlowDefinition) -> anyhow::Result<AuthenticationContext> {
        Ok(self.executor.start(Arc::new(flow))?)
    }
}

/// Three-step flow: password, TOTP, then a federated login.
///
/// Step 1's reported IdP is `idp`.
pub fn three_step_flow(idp: &str) -> FlowDefinition {
    let mut flow = FlowDefinition::new("browser")
        .with_step("password", "LOCAL")
        .with_step("totp", "LOCAL")
        .with_step("federated", "google");
    flow.steps[0]
        .options
        .insert("idp".to_string(), idp.to_string());
    flow
}
