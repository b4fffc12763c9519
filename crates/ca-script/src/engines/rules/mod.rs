//! The `rules` engine: a declarative JSON rule table.
//!
//! ```json
//! {
//!   "rules": [
//!     { "when": { "eq": ["steps.1.idp", "A"] }, "then": { "executeStep": 3 } },
//!     { "when": { "not": { "exists": "steps.1" } }, "then": { "fail": "no first step" } }
//!   ],
//!   "otherwise": { "executeStep": 2 }
//! }
//! ```
//!
//! Paths start at `steps.<n>` or `properties`. An unresolved path is JSON
//! `null`, so `{"eq": ["steps.4.idp", null]}` holds while step 4 has not
//! run. Walking past an absent value stays absent, so `steps.4.idp` needs no
//! `exists` guard. The `expr` engine is stricter here: reading a member of a
//! missing step is a `Type` error there.

mod eval;
mod model;

use std::sync::Arc;

use crate::binding::{ScriptBinding, ScriptOutcome};
use crate::error::ScriptResult;
use crate::runtime::{Budget, CompiledScript, ScriptRuntime};

use self::model::RuleSet;

/// Runtime for the `rules` engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct RulesRuntime;

impl RulesRuntime {
    /// Engine name.
    pub const ENGINE: &'static str = "rules";

    /// Creates the runtime.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ScriptRuntime for RulesRuntime {
    fn engine(&self) -> &'static str {
        Self::ENGINE
    }

    fn compile(&self, source: &str) -> ScriptResult<Arc<dyn CompiledScript>> {
        let rules = RuleSet::parse(source)?;
        tracing::debug!(rules = rules.rules.len(), "compiled rule table");
        Ok(Arc::new(RulesScript { rules }))
    }
}

#[derive(Debug)]
struct RulesScript {
    rules: RuleSet,
}

impl CompiledScript for RulesScript {
    fn engine(&self) -> &'static str {
        RulesRuntime::ENGINE
    }

    fn evaluate(&self, binding: ScriptBinding, budget: Budget) -> ScriptResult<ScriptOutcome> {
        eval::run(&self.rules, binding, budget)
    }
}
