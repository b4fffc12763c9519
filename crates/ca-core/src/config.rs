//! Engine configuration.
//!
//! Configuration is read-only input to the engine at flow start. Defaults are
//! usable as-is; `from_env` overlays `CA_*` environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest accepted script timeout, in milliseconds.
pub const MAX_SCRIPT_TIMEOUT_MS: u64 = 60 * 60 * 1_000;

/// Longest accepted session idle timeout or lifespan, in seconds.
pub const MAX_SESSION_SECS: i64 = 366 * 24 * 60 * 60;

/// Main configuration structure for the sequencing engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Script execution limits.
    pub script: ScriptConfig,
    /// Authentication session lifetime.
    pub session: SessionConfig,
    /// Capabilities reachable from scripts.
    pub sandbox: SandboxConfig,
}

/// Script execution limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Wall-clock budget for a single script evaluation, in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of interpreter operations per evaluation.
    pub max_operations: u64,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1_000,
            max_operations: 100_000,
        }
    }
}

impl ScriptConfig {
    /// Returns the evaluation timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Authentication session lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which an unfinished flow expires, in seconds.
    pub idle_timeout_secs: i64,
    /// Absolute lifetime of an authentication context, in seconds.
    pub max_lifespan_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 900,
            max_lifespan_secs: 3_600,
        }
    }
}

/// Sandbox capability flags.
///
/// Scripts never see host state beyond what these flags expose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Whether the `properties` object is reachable from scripts.
    pub expose_properties: bool,
    /// Whether scripts may queue context property writes.
    pub allow_property_writes: bool,
    /// Whether scripts may write to the engine log.
    pub allow_logging: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            expose_properties: true,
            allow_property_writes: false,
            allow_logging: true,
        }
    }
}

impl SandboxConfig {
    /// A sandbox exposing nothing but the step collection.
    #[must_use]
    pub const fn locked_down() -> Self {
        Self {
            expose_properties: false,
            allow_property_writes: false,
            allow_logging: false,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from environment variables.
    ///
    /// A `.env` file is read first when present.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a variable is set but cannot be parsed, or
    /// `Error::Validation` if the resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Same as [`EngineConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "CA_SCRIPT_TIMEOUT_MS")? {
            config.script.timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "CA_SCRIPT_MAX_OPERATIONS")? {
            config.script.max_operations = v;
        }
        if let Some(v) = parse_var(&lookup, "CA_SESSION_IDLE_TIMEOUT")? {
            config.session.idle_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "CA_SESSION_MAX_LIFESPAN")? {
            config.session.max_lifespan_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "CA_SANDBOX_EXPOSE_PROPERTIES")? {
            config.sandbox.expose_properties = v;
        }
        if let Some(v) = parse_var(&lookup, "CA_SANDBOX_ALLOW_PROPERTY_WRITES")? {
            config.sandbox.allow_property_writes = v;
        }
        if let Some(v) = parse_var(&lookup, "CA_SANDBOX_ALLOW_LOGGING")? {
            config.sandbox.allow_logging = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.script.timeout_ms == 0 {
            return Err(Error::Validation(
                "script timeout must be greater than zero".to_string(),
            ));
        }
        if self.script.timeout_ms > MAX_SCRIPT_TIMEOUT_MS {
            return Err(Error::Validation(format!(
                "script timeout exceeds {MAX_SCRIPT_TIMEOUT_MS} ms"
            )));
        }
        if self.script.max_operations == 0 {
            return Err(Error::Validation(
                "script operation budget must be greater than zero".to_string(),
            ));
        }
        if self.session.idle_timeout_secs <= 0 || self.session.max_lifespan_secs <= 0 {
            return Err(Error::Validation(
                "session timeouts must be positive".to_string(),
            ));
        }
        if self.session.max_lifespan_secs > MAX_SESSION_SECS {
            return Err(Error::Validation(format!(
                "session lifespan exceeds {MAX_SESSION_SECS} seconds"
            )));
        }
        if self.session.idle_timeout_secs > self.session.max_lifespan_secs {
            return Err(Error::Validation(
                "session idle timeout exceeds the maximum lifespan".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw}"))),
    }
}
