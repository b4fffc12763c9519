//! # ca-auth
//!
//! Conditional authentication flow engine.
//!
//! This crate walks an authentication flow step by step: it runs the
//! authenticator configured for the current step, commits the result to the
//! session's step ledger and asks the flow's sequencing script (if any)
//! which step comes next.
//!
//! ## Features
//!
//! - Explicit flow state machine with a recorded transition history
//! - Pluggable authenticators behind an async trait
//! - Scripts in any registered engine, run under a time and operation budget
//! - Cancellation and idle expiry of in-flight flows
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use ca_auth::{AuthenticatorRegistry, FlowDefinition, FlowExecutor, FlowState};
//! use ca_core::EngineConfig;
//! use ca_script::ScriptSource;
//!
//! let authenticators = Arc::new(AuthenticatorRegistry::new());
//! authenticators.register(Arc::new(PasswordAuthenticator::new(users)));
//! authenticators.register(Arc::new(FederatedAuthenticator::new(idps)));
//!
//! let flow = FlowDefinition::new("browser")
//!     .with_step("password", "LOCAL")
//!     .with_step("totp", "LOCAL")
//!     .with_step("federated", "google")
//!     .with_script(ScriptSource::expr(
//!         r#"if (steps[1] && steps[1].idp == "LOCAL") { executeStep(2); } else { executeStep(3); }"#,
//!     ));
//!
//! let executor = FlowExecutor::new(authenticators, EngineConfig::from_env()?)?;
//! let mut ctx = executor.start(Arc::new(flow))?;
//! match executor.run(&mut ctx).await {
//!     FlowState::FlowSucceeded => { /* issue session */ }
//!     other => { /* report failure */ }
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod authenticator;
pub mod context;
pub mod definition;
pub mod error;
pub mod executor;
pub mod flow;
pub mod registry;

pub use authenticator::{Authenticator, AuthenticatorRegistry, StepContext, StepOutcome};
pub use context::AuthenticationContext;
pub use definition::{FlowDefinition, RepeatPolicy, StepConfig};
pub use error::{AuthError, AuthResult, FlowError, FlowResult};
pub use executor::FlowExecutor;
pub use flow::{FailureReason, FlowState, Transition};
pub use registry::{ContextRegistry, SharedContext};
