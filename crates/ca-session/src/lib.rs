//! # ca-session
//!
//! Session-scoped step result ledger.
//!
//! Each login session owns one [`StepResultStore`]: an append-only record of
//! what happened at every step of the authentication sequence. Scripts never
//! touch the store directly; they read an immutable [`StepSnapshot`] taken
//! from it.

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod error;
pub mod step;
pub mod store;

pub use error::{SessionError, SessionResult};
pub use step::StepResult;
pub use store::{StepResultStore, StepSnapshot};
