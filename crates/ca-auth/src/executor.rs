//! Flow executor.
//!
//! Drives an [`AuthenticationContext`] through the flow state machine. Each
//! call to [`FlowExecutor::step`] performs exactly one transition, so a host
//! can drive the flow from request callbacks; [`FlowExecutor::run`] loops
//! until the flow finishes.
//!
//! After step `n` is recorded the sequencing script (if any) is evaluated
//! against a snapshot of steps `1..=n`, positioned at `n + 1`. Script
//! evaluation runs on the blocking pool, bounded both by the engine's own
//! operation budget and by a wall-clock timeout.

use std::sync::Arc;

use ca_core::{EngineConfig, Event, EventListener, EventType, TracingEventListener};
use ca_script::{
    Budget, CompiledScript, PropertyView, RouteDecision, RuntimeRegistry, ScriptBinding,
    ScriptError, ScriptOutcome, StepAccessor,
};
use ca_session::{SessionError, StepResult};
use chrono::Utc;

use crate::authenticator::{AuthenticatorRegistry, StepContext};
use crate::context::AuthenticationContext;
use crate::definition::FlowDefinition;
use crate::error::{FlowError, FlowResult};
use crate::flow::{FailureReason, FlowState, Transition};

/// Executes authentication flows.
#[derive(Clone)]
pub struct FlowExecutor {
    authenticators: Arc<AuthenticatorRegistry>,
    runtimes: Arc<RuntimeRegistry>,
    config: EngineConfig,
    listener: Arc<dyn EventListener>,
}

impl std::fmt::Debug for FlowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowExecutor")
            .field("authenticators", &self.authenticators)
            .field("engines", &self.runtimes.engines())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FlowExecutor {
    /// Creates an executor with the built-in script engines, logging events
    /// through `tracing`.
    ///
    /// # Errors
    ///
    /// Returns `ca_core::Error::Validation` if `config` fails
    /// [`EngineConfig::validate`].
    pub fn new(
        authenticators: Arc<AuthenticatorRegistry>,
        config: EngineConfig,
    ) -> ca_core::Result<Self> {
        config.validate()?;
        Ok(Self {
            authenticators,
            runtimes: Arc::new(RuntimeRegistry::with_defaults()),
            config,
            listener: Arc::new(TracingEventListener),
        })
    }

    /// Replaces the script runtimes.
    #[must_use]
    pub fn with_runtimes(mut self, runtimes: RuntimeRegistry) -> Self {
        self.runtimes = Arc::new(runtimes);
        self
    }

    /// Replaces the event listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Starts a flow: validates the definition, compiles its script and
    /// creates a context positioned at step 1.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::InvalidDefinition` if the definition is invalid or
    /// its script does not compile.
    pub fn start(&self, flow: Arc<FlowDefinition>) -> FlowResult<AuthenticationContext> {
        flow.validate(&self.authenticators)?;
        let script = flow
            .script
            .as_ref()
            .map(|source| self.runtimes.compile(source))
            .transpose()
            .map_err(|e| FlowError::InvalidDefinition(format!("flow '{}': {e}", flow.name)))?;

        let ctx = AuthenticationContext::new(flow, script, Utc::now());
        tracing::info!(
            session_id = %ctx.id(),
            flow = %ctx.flow_name(),
            steps = ctx.flow().len(),
            scripted = ctx.script().is_some(),
            "authentication flow started"
        );
        self.emit(
            Event::builder(EventType::FlowStarted)
                .session(ctx.id())
                .flow(ctx.flow_name())
                .build(),
        );
        Ok(ctx)
    }

    /// Runs the flow until it finishes and returns the terminal state.
    pub async fn run(&self, ctx: &mut AuthenticationContext) -> FlowState {
        while !ctx.is_finished() {
            self.step(ctx).await;
        }
        ctx.state().clone()
    }

    /// Performs one transition and returns the new state.
    ///
    /// Calling `step` on a finished flow returns its terminal state
    /// unchanged.
    pub async fn step(&self, ctx: &mut AuthenticationContext) -> FlowState {
        if ctx.is_finished() {
            return ctx.state().clone();
        }
        if ctx.is_cancelled() {
            self.fail(ctx, FlowError::Cancelled.into());
            return ctx.state().clone();
        }
        if ctx.is_expired(&self.config.session, Utc::now()) {
            self.fail(ctx, FlowError::SessionExpired.into());
            return ctx.state().clone();
        }

        match ctx.state().clone() {
            FlowState::PendingStep(n) => self.begin_step(ctx, n),
            FlowState::StepRunning(n) => self.run_authenticator(ctx, n).await,
            FlowState::StepCompleted(n) => {
                let next = if ctx.script().is_some() {
                    FlowState::ScriptEvaluating(n)
                } else {
                    FlowState::Advancing(static_next(ctx, n))
                };
                self.transition(ctx, next);
            }
            FlowState::ScriptEvaluating(n) => self.decide(ctx, n).await,
            FlowState::Advancing(transition) => self.advance(ctx, transition),
            FlowState::FlowSucceeded | FlowState::FlowFailed(_) => {}
        }
        ctx.state().clone()
    }

    /// Commits the result of the step the flow is running.
    ///
    /// The executor calls this itself after an authenticator returns; hosts
    /// that run authenticators out of band call it directly while the flow
    /// is in `StepRunning(step_number)`. On success the flow moves to
    /// `StepCompleted`.
    ///
    /// # Errors
    ///
    /// The ledger is left unchanged on every error.
    ///
    /// - `FlowError::DuplicateStep` if the flow is not running the step and
    ///   the step already has a result. The flow fails.
    /// - `FlowError::StepNotAwaited` if the flow is not running the step and
    ///   the step has no result. The flow's state is kept.
    pub fn complete_step(
        &self,
        ctx: &mut AuthenticationContext,
        step_number: u32,
        result: StepResult,
    ) -> FlowResult<()> {
        if ctx.state() != &FlowState::StepRunning(step_number) {
            let duplicate = ctx.store().contains(step_number);
            let err = if duplicate {
                FlowError::DuplicateStep(step_number)
            } else {
                FlowError::StepNotAwaited(step_number)
            };
            tracing::warn!(
                session_id = %ctx.id(),
                flow = %ctx.flow_name(),
                step = step_number,
                state = %ctx.state(),
                error = %err,
                "rejected step result"
            );
            if duplicate {
                self.fail(ctx, err.clone().into());
            }
            return Err(err);
        }

        let store = ctx.store_mut();
        let recorded = if store.contains(step_number) {
            store.record_retry(step_number, result)
        } else {
            store.record(step_number, result)
        };
        let (succeeded, attempt, authenticator, idp) = match recorded {
            Ok(entry) => (
                entry.succeeded(),
                entry.attempt(),
                entry.authenticator().to_string(),
                entry.idp().to_string(),
            ),
            Err(err) => {
                let err = match err {
                    SessionError::DuplicateStep(n) => FlowError::DuplicateStep(n),
                    SessionError::InvalidStepNumber(n) | SessionError::StepNotRecorded(n) => {
                        FlowError::InvalidStepTarget(n)
                    }
                };
                self.fail(ctx, err.clone().into());
                return Err(err);
            }
        };

        tracing::debug!(
            session_id = %ctx.id(),
            flow = %ctx.flow_name(),
            step = step_number,
            attempt,
            succeeded,
            "step result recorded"
        );
        let mut event = Event::builder(EventType::StepCompleted)
            .session(ctx.id())
            .flow(ctx.flow_name())
            .step(step_number)
            .detail("authenticator", authenticator)
            .detail("idp", idp)
            .detail("attempt", attempt.to_string());
        if !succeeded {
            event = event.failure("step failed");
        }
        self.emit(event.build());

        self.transition(ctx, FlowState::StepCompleted(step_number));
        Ok(())
    }

    fn begin_step(&self, ctx: &mut AuthenticationContext, n: u32) {
        if ctx.flow().step(n).is_none() {
            self.fail(ctx, FlowError::InvalidStepTarget(n).into());
            return;
        }
        let attempts = u32::try_from(ctx.store().attempts(n).len()).unwrap_or(u32::MAX);
        if !ctx.flow().repeat_policy.allows(attempts) {
            self.fail(ctx, FlowError::RepeatNotAllowed(n).into());
            return;
        }
        self.transition(ctx, FlowState::StepRunning(n));
    }

    async fn run_authenticator(&self, ctx: &mut AuthenticationContext, n: u32) {
        let flow = ctx.flow_arc();
        let Some(step) = flow.step(n) else {
            self.fail(ctx, FlowError::InvalidStepTarget(n).into());
            return;
        };
        let Some(authenticator) = self.authenticators.get(&step.authenticator) else {
            let err = FlowError::Authenticator {
                step: n,
                authenticator: step.authenticator.clone(),
                message: "not registered".to_string(),
            };
            self.fail(ctx, err.into());
            return;
        };

        let attempt = ctx.store().get(n).map_or(1, |previous| previous.attempt() + 1);
        let step_context = StepContext {
            session_id: ctx.id(),
            flow: ctx.flow_name().to_string(),
            step_number: n,
            attempt,
            properties: ctx.properties().clone(),
        };
        let cancel = ctx.cancellation_token();

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                self.fail(ctx, FlowError::Cancelled.into());
                return;
            }
            outcome = authenticator.run_step(step, &step_context) => outcome,
        };

        match outcome {
            Ok(outcome) => {
                let (succeeded, idp, attributes) = outcome.into_parts();
                let result = StepResult::new(
                    authenticator.id(),
                    idp.unwrap_or_else(|| step.idp.clone()),
                    succeeded,
                )
                .with_attributes(attributes);
                // A rejected result already failed the flow.
                let _ = self.complete_step(ctx, n, result);
            }
            Err(err) => {
                let err = FlowError::Authenticator {
                    step: n,
                    authenticator: step.authenticator.clone(),
                    message: err.to_string(),
                };
                self.fail(ctx, err.into());
            }
        }
    }

    async fn decide(&self, ctx: &mut AuthenticationContext, n: u32) {
        let Some(script) = ctx.script().cloned() else {
            let next = static_next(ctx, n);
            self.transition(ctx, FlowState::Advancing(next));
            return;
        };

        let outcome = match self.evaluate(ctx, script, n).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(
                    session_id = %ctx.id(),
                    flow = %ctx.flow_name(),
                    step = n,
                    error = %err,
                    "script evaluation failed"
                );
                self.emit(
                    Event::builder(EventType::ScriptEvaluated)
                        .session(ctx.id())
                        .flow(ctx.flow_name())
                        .step(n)
                        .failure(err.to_string())
                        .build(),
                );
                self.fail(ctx, err.into());
                return;
            }
        };

        for (key, value) in &outcome.property_writes {
            ctx.set_property(key.clone(), value.clone());
        }
        let decision = outcome
            .decision
            .as_ref()
            .map_or_else(|| "none".to_string(), describe);
        tracing::debug!(
            session_id = %ctx.id(),
            flow = %ctx.flow_name(),
            step = n,
            operations = outcome.operations,
            decision = %decision,
            "script evaluated"
        );
        self.emit(
            Event::builder(EventType::ScriptEvaluated)
                .session(ctx.id())
                .flow(ctx.flow_name())
                .step(n)
                .detail("decision", decision)
                .detail("operations", outcome.operations.to_string())
                .build(),
        );

        let next = match outcome.decision {
            Some(RouteDecision::ExecuteStep(k)) => Transition::Step(k),
            Some(RouteDecision::Succeed) => Transition::Succeed,
            Some(RouteDecision::Fail { reason }) => {
                Transition::Fail(FailureReason::Rejected { step: n, reason })
            }
            None => static_next(ctx, n),
        };
        self.transition(ctx, FlowState::Advancing(next));
    }

    /// Evaluates the script for the decision after step `n`.
    async fn evaluate(
        &self,
        ctx: &AuthenticationContext,
        script: Arc<dyn CompiledScript>,
        n: u32,
    ) -> FlowResult<ScriptOutcome> {
        let accessor = StepAccessor::new(ctx.store().snapshot(n), n.saturating_add(1));
        let binding = ScriptBinding::new(
            ctx.id(),
            ctx.flow_name(),
            accessor,
            PropertyView::new(ctx.properties().clone()),
            self.config.sandbox.clone(),
        );
        let budget = Budget::from_config(&self.config.script);
        let limit = self.config.script.timeout();
        let cancel = ctx.cancellation_token();

        let task = tokio::task::spawn_blocking(move || script.evaluate(binding, budget));
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(FlowError::Cancelled),
            joined = tokio::time::timeout(limit, task) => match joined {
                Err(_) => Err(FlowError::ScriptTimeout {
                    step: n,
                    source: ScriptError::Timeout { limit },
                }),
                Ok(Err(join)) => Err(FlowError::ScriptEvaluation {
                    step: n,
                    source: ScriptError::Evaluation(format!("script runtime aborted: {join}")),
                }),
                Ok(Ok(result)) => result.map_err(|e| FlowError::from_script(n, e)),
            },
        }
    }

    fn advance(&self, ctx: &mut AuthenticationContext, transition: Transition) {
        match transition {
            Transition::Step(k) => {
                if ctx.flow().step(k).is_none() {
                    self.fail(ctx, FlowError::InvalidStepTarget(k).into());
                    return;
                }
                let from = ctx.store().last().map_or(0, StepResult::step_number);
                tracing::debug!(
                    session_id = %ctx.id(),
                    flow = %ctx.flow_name(),
                    from,
                    to = k,
                    "routing to step"
                );
                self.emit(
                    Event::builder(EventType::StepRouted)
                        .session(ctx.id())
                        .flow(ctx.flow_name())
                        .step(k)
                        .detail("from", from.to_string())
                        .build(),
                );
                self.transition(ctx, FlowState::PendingStep(k));
            }
            Transition::Succeed => {
                tracing::info!(
                    session_id = %ctx.id(),
                    flow = %ctx.flow_name(),
                    steps = ctx.store().len(),
                    "authentication flow succeeded"
                );
                self.emit(
                    Event::builder(EventType::FlowSucceeded)
                        .session(ctx.id())
                        .flow(ctx.flow_name())
                        .build(),
                );
                self.transition(ctx, FlowState::FlowSucceeded);
            }
            Transition::Fail(reason) => self.fail(ctx, reason),
        }
    }

    /// Moves the flow to `FlowFailed`. A finished flow keeps its state.
    fn fail(&self, ctx: &mut AuthenticationContext, reason: FailureReason) {
        if ctx.is_finished() {
            return;
        }
        tracing::warn!(
            session_id = %ctx.id(),
            flow = %ctx.flow_name(),
            state = %ctx.state(),
            reason = %reason,
            "authentication flow failed"
        );
        let mut event = Event::builder(EventType::FlowFailed)
            .session(ctx.id())
            .flow(ctx.flow_name())
            .failure(reason.to_string());
        if let Some(step) = ctx.state().step() {
            event = event.step(step);
        }
        self.emit(event.build());
        self.transition(ctx, FlowState::FlowFailed(reason));
    }

    fn transition(&self, ctx: &mut AuthenticationContext, next: FlowState) {
        tracing::trace!(
            session_id = %ctx.id(),
            from = %ctx.state(),
            to = %next,
            "flow transition"
        );
        ctx.transition(next, Utc::now());
    }

    fn emit(&self, event: Event) {
        self.listener.on_event(&event);
    }
}

/// Static successor of step `n`: the next configured step, success after
/// the last one, or failure if step `n` itself failed.
fn static_next(ctx: &AuthenticationContext, n: u32) -> Transition {
    let succeeded = ctx.store().get(n).is_some_and(StepResult::succeeded);
    if !succeeded {
        return Transition::Fail(FlowError::StepFailed(n).into());
    }
    let next = n.saturating_add(1);
    if ctx.flow().step(next).is_some() {
        Transition::Step(next)
    } else {
        Transition::Succeed
    }
}

fn describe(decision: &RouteDecision) -> String {
    match decision {
        RouteDecision::ExecuteStep(k) => format!("execute_step({k})"),
        RouteDecision::Succeed => "succeed".to_string(),
        RouteDecision::Fail { .. } => "fail".to_string(),
    }
}
