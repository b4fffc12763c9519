//! Built-in script engines.

pub mod expr;
pub mod rules;
