//! Error handling shared across condauth crates.
//!
//! Messages are meant for operators. Nothing here is shown to the end user
//! directly; the request layer maps flow failures to its own pages.

use thiserror::Error;

/// Result type alias using the core error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error.
    #[error("validation error: {0}")]
    Validation(String),
}
