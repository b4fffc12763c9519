//! End-to-End Integration Tests
//!
//! These tests drive complete authentication flows through the executor,
//! with scripted authenticators standing in for real credential checks.

mod common;
mod definitions;
mod lifecycle;
mod scripted_flows;
mod static_flows;
