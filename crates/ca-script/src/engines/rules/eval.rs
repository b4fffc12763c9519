//! Rule table evaluation.

use serde_json::Value as Json;

use super::model::{Action, Condition, Path, Root, RuleSet};
use crate::adapter::{EngineValue, ForeignAdapter, HostValue};
use crate::binding::{ScriptBinding, ScriptOutcome};
use crate::error::{ScriptError, ScriptResult};
use crate::runtime::Budget;

/// A resolved path value. Absent slots surface as JSON `null`.
#[derive(Debug, Clone)]
enum Slot {
    Absent,
    Scalar(Json),
    Object(ForeignAdapter<Slot>),
}

impl EngineValue for Slot {
    fn absent() -> Self {
        Self::Absent
    }

    fn from_host(value: HostValue) -> Self {
        match value {
            HostValue::Str(s) => Self::Scalar(Json::String(s)),
            HostValue::Bool(b) => Self::Scalar(Json::Bool(b)),
            HostValue::Number(n) => {
                Self::Scalar(serde_json::Number::from_f64(n).map_or(Json::Null, Json::Number))
            }
            HostValue::Object(object) => Self::Object(ForeignAdapter::new(object)),
        }
    }
}

impl Slot {
    fn to_json(&self) -> Json {
        match self {
            Self::Absent => Json::Null,
            Self::Scalar(value) => value.clone(),
            Self::Object(object) => Json::String(object.to_primitive()),
        }
    }
}

struct Evaluator {
    steps: ForeignAdapter<Slot>,
    properties: Option<ForeignAdapter<Slot>>,
    budget: Budget,
}

/// Evaluates a rule table: the first matching rule's action wins, then
/// `otherwise`.
pub fn run(rules: &RuleSet, mut binding: ScriptBinding, budget: Budget) -> ScriptResult<ScriptOutcome> {
    let mut evaluator = Evaluator {
        steps: ForeignAdapter::new(binding.steps_object()),
        properties: binding.properties_object().map(ForeignAdapter::new),
        budget,
    };

    let mut chosen = None;
    for rule in &rules.rules {
        evaluator.budget.check_deadline()?;
        if evaluator.matches(&rule.when)? {
            chosen = Some(&rule.then);
            break;
        }
    }

    let Some(Action { decision, set }) = chosen.or(rules.otherwise.as_ref()) else {
        return Ok(binding.finish(None, evaluator.budget.used()));
    };
    for (key, value) in set {
        binding.set_property(key.as_str(), value.as_str())?;
    }
    Ok(binding.finish(decision.clone(), evaluator.budget.used()))
}

impl Evaluator {
    fn matches(&mut self, condition: &Condition) -> ScriptResult<bool> {
        self.budget.tick()?;
        Ok(match condition {
            Condition::Always(value) => *value,
            Condition::All(conditions) => {
                for condition in conditions {
                    if !self.matches(condition)? {
                        return Ok(false);
                    }
                }
                true
            }
            Condition::Any(conditions) => {
                for condition in conditions {
                    if self.matches(condition)? {
                        return Ok(true);
                    }
                }
                false
            }
            Condition::Not(condition) => !self.matches(condition)?,
            Condition::Exists(path) => !matches!(self.resolve(path)?, Slot::Absent),
            Condition::Eq(path, expected) => json_eq(&self.resolve(path)?.to_json(), expected),
            Condition::Ne(path, expected) => !json_eq(&self.resolve(path)?.to_json(), expected),
        })
    }

    /// Walks a path. Any unresolved segment makes the whole path absent.
    fn resolve(&mut self, path: &Path) -> ScriptResult<Slot> {
        let mut current = match path.root {
            Root::Step(index) => self.steps.get_slot(index),
            Root::Properties => match &self.properties {
                Some(properties) => Slot::Object(properties.clone()),
                None => {
                    return Err(ScriptError::Evaluation(format!(
                        "properties is not defined (in '{}')",
                        path.text
                    )))
                }
            },
        };
        for member in &path.members {
            self.budget.tick()?;
            current = match current {
                Slot::Object(object) if object.is_indexed() => {
                    return Err(ScriptError::Type(format!(
                        "{} is indexed by step number, not '{member}' (in '{}')",
                        object.class_name(),
                        path.text
                    )))
                }
                Slot::Object(object) => object.get_member(member),
                Slot::Absent | Slot::Scalar(_) => Slot::Absent,
            };
        }
        Ok(current)
    }
}

fn json_eq(actual: &Json, expected: &Json) -> bool {
    match (actual, expected) {
        (Json::Number(a), Json::Number(b)) => a.as_f64() == b.as_f64(),
        _ => actual == expected,
    }
}
