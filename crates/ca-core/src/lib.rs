//! # ca-core
//!
//! Core configuration, error handling, and audit events for condauth.
//!
//! This crate provides foundational types shared by every other condauth
//! crate: the engine configuration (timeouts and sandbox capabilities),
//! the top-level error type, and the flow audit event model.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod event;

pub use config::{
    EngineConfig, SandboxConfig, ScriptConfig, SessionConfig, MAX_SCRIPT_TIMEOUT_MS, MAX_SESSION_SECS,
};
pub use error::{Error, Result};
pub use event::{
    Event, EventBuilder, EventListener, EventOutcome, EventType, InMemoryEventListener,
    TracingEventListener,
};
