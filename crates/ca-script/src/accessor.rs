//! Script-visible view of the step ledger.

use std::collections::BTreeMap;
use std::sync::Arc;

use ca_session::{StepResult, StepSnapshot};

use crate::adapter::{HostObject, HostValue};

/// Exposes completed steps to a script as `steps[n]`.
///
/// The accessor is positioned at the step the script is deciding about;
/// only steps strictly before that position are visible. Any other index,
/// including zero, negative, or out-of-range values, resolves to `None`.
#[derive(Debug, Clone)]
pub struct StepAccessor {
    snapshot: StepSnapshot,
    position: u32,
}

impl StepAccessor {
    /// Creates an accessor over `snapshot` for a script positioned at
    /// `position`.
    #[must_use]
    pub const fn new(snapshot: StepSnapshot, position: u32) -> Self {
        Self { snapshot, position }
    }

    /// Step number the script is positioned at.
    #[must_use]
    pub const fn position(&self) -> u32 {
        self.position
    }

    /// Looks up a step. `None` means "absent", never an error.
    #[must_use]
    pub fn get_slot(&self, index: i64) -> Option<StepProjection> {
        let step = u32::try_from(index).ok()?;
        if step == 0 || step >= self.position {
            return None;
        }
        self.snapshot
            .get(step)
            .map(|result| StepProjection(Arc::clone(result)))
    }

    /// Visible step numbers, ascending.
    #[must_use]
    pub fn visible_steps(&self) -> Vec<u32> {
        self.snapshot
            .step_numbers()
            .filter(|&n| n < self.position)
            .collect()
    }
}

impl HostObject for StepAccessor {
    fn class_name(&self) -> &'static str {
        "Steps"
    }

    fn is_indexed(&self) -> bool {
        true
    }

    fn resolve_slot(&self, index: i64) -> Option<HostValue> {
        self.get_slot(index)
            .map(|projection| HostValue::Object(Arc::new(projection)))
    }

    fn member_names(&self) -> Vec<String> {
        self.visible_steps().iter().map(u32::to_string).collect()
    }
}

/// Read-only projection of one recorded step.
#[derive(Debug, Clone)]
pub struct StepProjection(Arc<StepResult>);

impl StepProjection {
    /// Step number.
    #[must_use]
    pub fn step_number(&self) -> u32 {
        self.0.step_number()
    }

    /// Authenticator name.
    #[must_use]
    pub fn authenticator(&self) -> &str {
        self.0.authenticator()
    }

    /// Identity provider name.
    #[must_use]
    pub fn idp(&self) -> &str {
        self.0.idp()
    }

    /// Whether the step succeeded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.0.succeeded()
    }

    /// Subject attributes.
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        self.0.attributes()
    }

    /// Attempt counter.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.0.attempt()
    }
}

const STEP_MEMBERS: [&str; 6] = [
    "authenticator",
    "idp",
    "success",
    "attributes",
    "stepNumber",
    "attempt",
];

impl HostObject for StepProjection {
    fn class_name(&self) -> &'static str {
        "Step"
    }

    fn resolve_member(&self, name: &str) -> Option<HostValue> {
        let value = match name {
            "authenticator" => HostValue::Str(self.authenticator().to_string()),
            "idp" => HostValue::Str(self.idp().to_string()),
            "success" => HostValue::Bool(self.success()),
            "attributes" => HostValue::Object(Arc::new(Attributes(Arc::clone(&self.0)))),
            "stepNumber" => HostValue::Number(f64::from(self.step_number())),
            "attempt" => HostValue::Number(f64::from(self.attempt())),
            _ => return None,
        };
        Some(value)
    }

    fn member_names(&self) -> Vec<String> {
        STEP_MEMBERS.iter().map(|s| (*s).to_string()).collect()
    }
}

#[derive(Debug)]
struct Attributes(Arc<StepResult>);

impl HostObject for Attributes {
    fn class_name(&self) -> &'static str {
        "Attributes"
    }

    fn resolve_member(&self, name: &str) -> Option<HostValue> {
        self.0
            .attribute(name)
            .map(|value| HostValue::Str(value.to_string()))
    }

    fn member_names(&self) -> Vec<String> {
        self.0.attributes().keys().cloned().collect()
    }
}

/// Read-only copy of the context properties taken for one evaluation.
#[derive(Debug, Clone, Default)]
pub struct PropertyView(Arc<BTreeMap<String, String>>);

impl PropertyView {
    /// Creates a view over a copy of the given properties.
    #[must_use]
    pub fn new(properties: BTreeMap<String, String>) -> Self {
        Self(Arc::new(properties))
    }

    /// Looks up a property.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl HostObject for PropertyView {
    fn class_name(&self) -> &'static str {
        "Properties"
    }

    fn resolve_member(&self, name: &str) -> Option<HostValue> {
        self.get(name).map(|value| HostValue::Str(value.to_string()))
    }

    fn member_names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }
}
