//! # ca-script
//!
//! The bridge between the statically typed step ledger and sandboxed
//! sequencing scripts.
//!
//! ## Layers
//!
//! - [`StepAccessor`] - exposes a [`StepSnapshot`](ca_session::StepSnapshot)
//!   as an indexable collection with "absent" semantics for missing steps
//! - [`HostObject`] / [`ForeignAdapter`] - engine-neutral lookups composed
//!   with each engine's canonical absent value
//! - [`ScriptRuntime`] - strategy trait implemented once per engine
//!
//! ## Engines
//!
//! - `expr` - a small JavaScript-like statement language
//! - `rules` - a declarative JSON rule table
//!
//! Both engines see identical slot semantics: a step that has not completed
//! (or lies ahead of the evaluation position) is absent, never an error.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod accessor;
pub mod adapter;
pub mod binding;
pub mod engines;
pub mod error;
pub mod runtime;

pub use accessor::{PropertyView, StepAccessor, StepProjection};
pub use adapter::{EngineValue, ForeignAdapter, HostObject, HostValue};
pub use binding::{RouteDecision, ScriptBinding, ScriptOutcome};
pub use engines::expr::ExprRuntime;
pub use engines::rules::RulesRuntime;
pub use error::{ScriptError, ScriptResult};
pub use runtime::{Budget, CompiledScript, RuntimeRegistry, ScriptRuntime, ScriptSource};
