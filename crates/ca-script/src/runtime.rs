//! Script runtime strategy.
//!
//! The flow executor only depends on [`ScriptRuntime`] and
//! [`CompiledScript`]; each supported engine provides one implementation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ca_core::ScriptConfig;
use serde::{Deserialize, Serialize};

use crate::binding::{ScriptBinding, ScriptOutcome};
use crate::engines::expr::ExprRuntime;
use crate::engines::rules::RulesRuntime;
use crate::error::{ScriptError, ScriptResult};

/// How often the wall clock is consulted, in operations.
const CLOCK_CHECK_INTERVAL: u64 = 64;

/// Bytes of script-allocated data that cost one operation.
const BYTES_PER_OPERATION: usize = 64;

/// Execution budget for one evaluation.
///
/// Engines call [`tick`](Self::tick) for every unit of work; the budget
/// aborts the evaluation once the operation limit or deadline is reached.
#[derive(Debug, Clone)]
pub struct Budget {
    limit: Duration,
    deadline: Option<Instant>,
    max_operations: u64,
    used: u64,
}

impl Budget {
    /// Creates a budget starting now. A limit past the end of the clock
    /// never expires.
    #[must_use]
    pub fn new(limit: Duration, max_operations: u64) -> Self {
        Self {
            limit,
            deadline: Instant::now().checked_add(limit),
            max_operations,
            used: 0,
        }
    }

    /// Creates a budget from script configuration.
    #[must_use]
    pub fn from_config(config: &ScriptConfig) -> Self {
        Self::new(config.timeout(), config.max_operations)
    }

    /// Consumes one operation.
    ///
    /// # Errors
    ///
    /// Returns `ScriptError::BudgetExhausted` or `ScriptError::Timeout`.
    pub fn tick(&mut self) -> ScriptResult<()> {
        self.charge(1)
    }

    /// Pays for `bytes` of data the script is about to allocate.
    ///
    /// Called before the allocation happens, so the total memory a script
    /// can allocate is bounded by its operation limit.
    ///
    /// # Errors
    ///
    /// Returns `ScriptError::BudgetExhausted` or `ScriptError::Timeout`.
    pub fn allocate(&mut self, bytes: usize) -> ScriptResult<()> {
        let operations = u64::try_from(bytes.div_ceil(BYTES_PER_OPERATION)).unwrap_or(u64::MAX);
        self.charge(operations)
    }

    fn charge(&mut self, operations: u64) -> ScriptResult<()> {
        let before = self.used;
        self.used = self.used.saturating_add(operations);
        if self.used > self.max_operations {
            return Err(ScriptError::BudgetExhausted(self.max_operations));
        }
        if self.used / CLOCK_CHECK_INTERVAL != before / CLOCK_CHECK_INTERVAL {
            self.check_deadline()?;
        }
        Ok(())
    }

    /// Checks the wall clock.
    ///
    /// # Errors
    ///
    /// Returns `ScriptError::Timeout` once the deadline has passed.
    pub fn check_deadline(&self) -> ScriptResult<()> {
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(ScriptError::Timeout { limit: self.limit });
        }
        Ok(())
    }

    /// Operations consumed so far.
    #[must_use]
    pub const fn used(&self) -> u64 {
        self.used
    }

    /// Configured wall-clock limit.
    #[must_use]
    pub const fn limit(&self) -> Duration {
        self.limit
    }
}

/// A script compiled by one runtime.
///
/// Compiled scripts are immutable and shared between evaluations; all
/// per-evaluation state lives in the [`ScriptBinding`].
pub trait CompiledScript: Send + Sync + fmt::Debug {
    /// Engine that compiled the script.
    fn engine(&self) -> &'static str;

    /// Evaluates the script against a fresh binding.
    ///
    /// # Errors
    ///
    /// Returns a `ScriptError` for uncaught exceptions, type errors, sandbox
    /// violations, or an exhausted budget.
    fn evaluate(&self, binding: ScriptBinding, budget: Budget) -> ScriptResult<ScriptOutcome>;
}

/// A script engine.
pub trait ScriptRuntime: Send + Sync + fmt::Debug {
    /// Engine name used in flow configuration.
    fn engine(&self) -> &'static str;

    /// Compiles script source.
    ///
    /// # Errors
    ///
    /// Returns `ScriptError::Compile` if the source is malformed.
    fn compile(&self, source: &str) -> ScriptResult<Arc<dyn CompiledScript>>;
}

/// Script source as supplied by flow configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSource {
    /// Engine name (`expr` or `rules`).
    #[serde(default = "default_engine")]
    pub engine: String,
    /// Script text.
    pub source: String,
}

fn default_engine() -> String {
    ExprRuntime::ENGINE.to_string()
}

impl ScriptSource {
    /// Creates an `expr` script source.
    #[must_use]
    pub fn expr(source: impl Into<String>) -> Self {
        Self {
            engine: ExprRuntime::ENGINE.to_string(),
            source: source.into(),
        }
    }

    /// Creates a `rules` script source.
    #[must_use]
    pub fn rules(source: impl Into<String>) -> Self {
        Self {
            engine: RulesRuntime::ENGINE.to_string(),
            source: source.into(),
        }
    }
}

/// Registry of available script runtimes keyed by engine name.
#[derive(Debug, Clone, Default)]
pub struct RuntimeRegistry {
    runtimes: HashMap<&'static str, Arc<dyn ScriptRuntime>>,
}

impl RuntimeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in engines.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ExprRuntime::new()));
        registry.register(Arc::new(RulesRuntime::new()));
        registry
    }

    /// Registers a runtime, replacing any runtime with the same name.
    pub fn register(&mut self, runtime: Arc<dyn ScriptRuntime>) {
        self.runtimes.insert(runtime.engine(), runtime);
    }

    /// Looks up a runtime.
    #[must_use]
    pub fn get(&self, engine: &str) -> Option<Arc<dyn ScriptRuntime>> {
        self.runtimes.get(engine).cloned()
    }

    /// Registered engine names, sorted.
    #[must_use]
    pub fn engines(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.runtimes.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Compiles a script with the runtime named in its source.
    ///
    /// # Errors
    ///
    /// Returns `ScriptError::UnknownEngine` or the runtime's compile error.
    pub fn compile(&self, script: &ScriptSource) -> ScriptResult<Arc<dyn CompiledScript>> {
        let runtime = self
            .get(&script.engine)
            .ok_or_else(|| ScriptError::UnknownEngine(script.engine.clone()))?;
        runtime.compile(&script.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_exhausts_operations() {
        let mut budget = Budget::new(Duration::from_secs(60), 3);
        assert!(budget.tick().is_ok());
        assert!(budget.tick().is_ok());
        assert!(budget.tick().is_ok());
        assert_eq!(budget.tick().unwrap_err(), ScriptError::BudgetExhausted(3));
    }

    #[test]
    fn allocation_is_charged_by_size() {
        let mut budget = Budget::new(Duration::from_secs(60), 10);
        budget.allocate(64 * 4).unwrap();
        assert_eq!(budget.used(), 4);
        budget.allocate(1).unwrap();
        assert_eq!(budget.used(), 5);
        assert_eq!(
            budget.allocate(64 * 6).unwrap_err(),
            ScriptError::BudgetExhausted(10)
        );
    }

    #[test]
    fn budget_expires() {
        let budget = Budget::new(Duration::ZERO, 10);
        assert!(matches!(
            budget.check_deadline().unwrap_err(),
            ScriptError::Timeout { .. }
        ));
    }

    #[test]
    fn unbounded_limit_does_not_overflow() {
        let mut budget = Budget::new(Duration::MAX, 200);
        assert!(budget.check_deadline().is_ok());
        budget.allocate(64 * 128).unwrap();
        assert_eq!(budget.used(), 128);
    }

    #[test]
    fn registry_defaults() {
        let registry = RuntimeRegistry::with_defaults();
        assert_eq!(registry.engines(), vec!["expr", "rules"]);
        assert!(registry.get("python").is_none());
    }

    #[test]
    fn unknown_engine_is_an_error() {
        let registry = RuntimeRegistry::with_defaults();
        let source = ScriptSource {
            engine: "lua".to_string(),
            source: String::new(),
        };
        assert_eq!(
            registry.compile(&source).unwrap_err(),
            ScriptError::UnknownEngine("lua".to_string())
        );
    }

    #[test]
    fn script_source_defaults_to_expr() {
        let source: ScriptSource =
            serde_json::from_str(r#"{"source":"succeed();"}"#).unwrap();
        assert_eq!(source.engine, "expr");
    }
}
