//! The `expr` engine: a small JavaScript-like statement language.
//!
//! ```text
//! if (steps[1] && steps[1].idp == "A") {
//!     executeStep(3);
//! } else {
//!     executeStep(2);
//! }
//! ```
//!
//! Scripts see two globals, `steps` and (when the sandbox exposes it)
//! `properties`, and may call `executeStep(n)`, `succeed()`,
//! `fail(reason?)`, `setProperty(key, value)` and `log(...)`. The three
//! routing calls end the evaluation immediately.
//!
//! Reading a missing step yields `undefined`, the engine's absent value.
//! Reading a member *of* `undefined` is a `Type` error, as in JavaScript;
//! that is a rule of the language, not of the shared host-object adapter,
//! which only decides what a missing slot or member resolves to. Scripts
//! guard with `steps[n] && steps[n].idp`.
//!
//! Both the nesting depth of a script and the memory it allocates are
//! bounded: sources nested too deeply fail to compile, and string
//! concatenation is charged against the operation budget by size.

mod ast;
mod interp;
mod lexer;
mod parser;
mod value;

use std::sync::Arc;

use crate::binding::{ScriptBinding, ScriptOutcome};
use crate::error::ScriptResult;
use crate::runtime::{Budget, CompiledScript, ScriptRuntime};

/// Runtime for the `expr` engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprRuntime;

impl ExprRuntime {
    /// Engine name.
    pub const ENGINE: &'static str = "expr";

    /// Creates the runtime.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ScriptRuntime for ExprRuntime {
    fn engine(&self) -> &'static str {
        Self::ENGINE
    }

    fn compile(&self, source: &str) -> ScriptResult<Arc<dyn CompiledScript>> {
        let program = parser::parse(source)?;
        tracing::debug!(statements = program.len(), "compiled expr script");
        Ok(Arc::new(ExprScript { program }))
    }
}

#[derive(Debug)]
struct ExprScript {
    program: Vec<ast::Stmt>,
}

impl CompiledScript for ExprScript {
    fn engine(&self) -> &'static str {
        ExprRuntime::ENGINE
    }

    fn evaluate(&self, binding: ScriptBinding, budget: Budget) -> ScriptResult<ScriptOutcome> {
        interp::run(&self.program, binding, budget)
    }
}
