//! Authentication context.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ca_core::SessionConfig;
use ca_script::CompiledScript;
use ca_session::StepResultStore;
use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::definition::FlowDefinition;
use crate::flow::FlowState;

/// Session-scoped state of one login sequence.
///
/// The context is owned by its flow for the flow's whole lifetime; only the
/// [`FlowExecutor`](crate::executor::FlowExecutor) changes its state or its
/// step ledger.
pub struct AuthenticationContext {
    id: Uuid,
    flow: Arc<FlowDefinition>,
    store: StepResultStore,
    state: FlowState,
    history: Vec<FlowState>,
    properties: BTreeMap<String, String>,
    script: Option<Arc<dyn CompiledScript>>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    cancel: CancellationToken,
}

impl fmt::Debug for AuthenticationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationContext")
            .field("id", &self.id)
            .field("flow", &self.flow.name)
            .field("state", &self.state)
            .field("steps", &self.store.len())
            .field("script", &self.script.as_ref().map(|s| s.engine()))
            .finish_non_exhaustive()
    }
}

impl AuthenticationContext {
    pub(crate) fn new(
        flow: Arc<FlowDefinition>,
        script: Option<Arc<dyn CompiledScript>>,
        now: DateTime<Utc>,
    ) -> Self {
        let state = FlowState::PendingStep(1);
        Self {
            id: Uuid::now_v7(),
            flow,
            store: StepResultStore::new(),
            history: vec![state.clone()],
            state,
            properties: BTreeMap::new(),
            script,
            created_at: now,
            last_activity: now,
            cancel: CancellationToken::new(),
        }
    }

    /// Session ID.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The flow being executed.
    #[must_use]
    pub fn flow(&self) -> &FlowDefinition {
        &self.flow
    }

    /// Flow name.
    #[must_use]
    pub fn flow_name(&self) -> &str {
        &self.flow.name
    }

    /// Recorded step results.
    #[must_use]
    pub const fn store(&self) -> &StepResultStore {
        &self.store
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &FlowState {
        &self.state
    }

    /// Every state the flow has been in, oldest first.
    #[must_use]
    pub fn history(&self) -> &[FlowState] {
        &self.history
    }

    /// Checks if the flow reached a terminal state.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Context properties.
    #[must_use]
    pub const fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Gets a context property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Sets a context property, visible to later steps and scripts.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Compiled sequencing script, if the flow has one.
    #[must_use]
    pub fn script(&self) -> Option<&Arc<dyn CompiledScript>> {
        self.script.as_ref()
    }

    /// When the context was created.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the flow last made progress.
    #[must_use]
    pub const fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// Checks if the context is past its idle timeout or maximum lifespan.
    ///
    /// A limit too large to represent never expires.
    #[must_use]
    pub fn is_expired(&self, config: &SessionConfig, now: DateTime<Utc>) -> bool {
        let past = |since: DateTime<Utc>, secs: i64| {
            Duration::try_seconds(secs).is_some_and(|limit| now - since > limit)
        };
        past(self.last_activity, config.idle_timeout_secs)
            || past(self.created_at, config.max_lifespan_secs)
    }

    /// Token that cancels the running flow.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Requests cancellation. The flow fails at its next transition, or
    /// immediately if an authenticator or script is in flight.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn flow_arc(&self) -> Arc<FlowDefinition> {
        Arc::clone(&self.flow)
    }

    pub(crate) fn store_mut(&mut self) -> &mut StepResultStore {
        &mut self.store
    }

    pub(crate) fn transition(&mut self, next: FlowState, now: DateTime<Utc>) {
        self.history.push(next.clone());
        self.state = next;
        self.last_activity = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(now: DateTime<Utc>) -> AuthenticationContext {
        let flow = FlowDefinition::new("browser").with_step("basic", "LOCAL");
        AuthenticationContext::new(Arc::new(flow), None, now)
    }

    #[test]
    fn starts_at_first_step() {
        let ctx = context(Utc::now());
        assert_eq!(ctx.state(), &FlowState::PendingStep(1));
        assert_eq!(ctx.history(), &[FlowState::PendingStep(1)]);
        assert!(ctx.store().is_empty());
        assert!(!ctx.is_finished());
    }

    #[test]
    fn idle_expiry() {
        let start = Utc::now();
        let ctx = context(start);
        let config = SessionConfig {
            idle_timeout_secs: 60,
            max_lifespan_secs: 600,
        };

        assert!(!ctx.is_expired(&config, start + Duration::seconds(59)));
        assert!(ctx.is_expired(&config, start + Duration::seconds(61)));
    }

    #[test]
    fn lifespan_expiry_despite_activity() {
        let start = Utc::now();
        let mut ctx = context(start);
        let config = SessionConfig {
            idle_timeout_secs: 60,
            max_lifespan_secs: 100,
        };

        ctx.transition(FlowState::StepRunning(1), start + Duration::seconds(90));
        assert!(!ctx.is_expired(&config, start + Duration::seconds(95)));
        assert!(ctx.is_expired(&config, start + Duration::seconds(101)));
    }

    #[test]
    fn unrepresentable_limits_never_expire() {
        let start = Utc::now();
        let ctx = context(start);
        let config = SessionConfig {
            idle_timeout_secs: i64::MAX,
            max_lifespan_secs: i64::MAX,
        };

        assert!(!ctx.is_expired(&config, start + Duration::days(365 * 100)));
    }

    #[test]
    fn properties() {
        let mut ctx = context(Utc::now());
        ctx.set_property("riskScore", "low");
        assert_eq!(ctx.property("riskScore"), Some("low"));
        assert_eq!(ctx.property("missing"), None);
    }

    #[test]
    fn cancellation() {
        let ctx = context(Utc::now());
        let token = ctx.cancellation_token();
        ctx.cancel();
        assert!(token.is_cancelled());
        assert!(ctx.is_cancelled());
    }
}
