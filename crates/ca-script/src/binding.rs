//! Per-evaluation script binding and its outcome.

use std::collections::BTreeMap;
use std::sync::Arc;

use ca_core::SandboxConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accessor::{PropertyView, StepAccessor};
use crate::adapter::HostObject;
use crate::error::{ScriptError, ScriptResult};

/// Routing decision produced by a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteDecision {
    /// Run the step with this number next.
    ExecuteStep(u32),
    /// Finish the flow as successful.
    Succeed,
    /// Finish the flow as failed.
    Fail {
        /// Optional reason supplied by the script.
        reason: Option<String>,
    },
}

/// Everything a script evaluation produced.
///
/// Property writes are only buffered here; the executor applies them after
/// the evaluation returned successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutcome {
    /// Routing decision, if the script made one.
    pub decision: Option<RouteDecision>,
    /// Buffered context property writes.
    pub property_writes: BTreeMap<String, String>,
    /// Operations consumed.
    pub operations: u64,
}

/// Host state exposed to exactly one script evaluation.
///
/// A binding is built fresh for every evaluation and moved into it, so no
/// state survives from one evaluation to the next.
#[derive(Debug)]
pub struct ScriptBinding {
    session_id: Uuid,
    flow: String,
    steps: StepAccessor,
    properties: PropertyView,
    sandbox: SandboxConfig,
    writes: BTreeMap<String, String>,
}

impl ScriptBinding {
    /// Creates a binding.
    #[must_use]
    pub fn new(
        session_id: Uuid,
        flow: impl Into<String>,
        steps: StepAccessor,
        properties: PropertyView,
        sandbox: SandboxConfig,
    ) -> Self {
        Self {
            session_id,
            flow: flow.into(),
            steps,
            properties,
            sandbox,
            writes: BTreeMap::new(),
        }
    }

    /// The `steps` global as a host object.
    #[must_use]
    pub fn steps_object(&self) -> Arc<dyn HostObject> {
        Arc::new(self.steps.clone())
    }

    /// The `properties` global, if the sandbox exposes it.
    #[must_use]
    pub fn properties_object(&self) -> Option<Arc<dyn HostObject>> {
        self.sandbox
            .expose_properties
            .then(|| Arc::new(self.properties.clone()) as Arc<dyn HostObject>)
    }

    /// Queues a context property write.
    ///
    /// # Errors
    ///
    /// Returns `ScriptError::SandboxDenied` if property writes are disabled.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) -> ScriptResult<()> {
        if !self.sandbox.allow_property_writes {
            return Err(ScriptError::SandboxDenied("setProperty".to_string()));
        }
        self.writes.insert(key.into(), value.into());
        Ok(())
    }

    /// Writes a script log line to the engine log.
    ///
    /// # Errors
    ///
    /// Returns `ScriptError::SandboxDenied` if logging is disabled.
    pub fn log(&self, message: &str) -> ScriptResult<()> {
        if !self.sandbox.allow_logging {
            return Err(ScriptError::SandboxDenied("log".to_string()));
        }
        tracing::info!(
            session_id = %self.session_id,
            flow = %self.flow,
            position = self.steps.position(),
            "script: {}",
            message
        );
        Ok(())
    }

    /// Consumes the binding into an outcome.
    #[must_use]
    pub fn finish(self, decision: Option<RouteDecision>, operations: u64) -> ScriptOutcome {
        ScriptOutcome {
            decision,
            property_writes: self.writes,
            operations,
        }
    }
}

#[cfg(test)]
mod tests {
    use ca_session::StepResultStore;

    use super::*;

    fn binding(sandbox: SandboxConfig) -> ScriptBinding {
        let store = StepResultStore::new();
        ScriptBinding::new(
            Uuid::now_v7(),
            "browser",
            StepAccessor::new(store.snapshot(0), 1),
            PropertyView::default(),
            sandbox,
        )
    }

    #[test]
    fn property_writes_are_buffered() {
        let mut sandbox = SandboxConfig::default();
        sandbox.allow_property_writes = true;
        let mut binding = binding(sandbox);

        binding.set_property("mfa", "required").unwrap();
        let outcome = binding.finish(Some(RouteDecision::Succeed), 3);

        assert_eq!(outcome.property_writes.get("mfa").map(String::as_str), Some("required"));
        assert_eq!(outcome.decision, Some(RouteDecision::Succeed));
        assert_eq!(outcome.operations, 3);
    }

    #[test]
    fn locked_down_sandbox_denies_everything() {
        let mut binding = binding(SandboxConfig::locked_down());

        assert!(binding.properties_object().is_none());
        assert_eq!(
            binding.set_property("k", "v").unwrap_err(),
            ScriptError::SandboxDenied("setProperty".to_string())
        );
        assert!(binding.log("hello").is_err());
    }
}
