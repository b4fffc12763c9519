//! End-to-end test suite for the condauth workspace.
//!
//! The scenarios live under `tests/`; this library target has no items.
