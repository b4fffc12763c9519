//! JSON rule table format and its validated form.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value as Json;

use crate::binding::RouteDecision;
use crate::error::{ScriptError, ScriptResult};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleSetSpec {
    rules: Vec<RuleSpec>,
    #[serde(default)]
    otherwise: Option<ActionSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleSpec {
    when: ConditionSpec,
    then: ActionSpec,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConditionSpec {
    Literal(bool),
    Op(Box<OpSpec>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum OpSpec {
    All(Vec<ConditionSpec>),
    Any(Vec<ConditionSpec>),
    Not(ConditionSpec),
    Exists(String),
    Eq(String, Json),
    Ne(String, Json),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ActionSpec {
    Keyword(Keyword),
    Object(ActionObject),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum Keyword {
    Succeed,
    Fail,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ActionObject {
    #[serde(default)]
    execute_step: Option<u32>,
    #[serde(default)]
    succeed: bool,
    #[serde(default)]
    fail: Option<Json>,
    #[serde(default)]
    set: BTreeMap<String, Json>,
}

/// Root object a path starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Root {
    Step(i64),
    Properties,
}

/// A dotted lookup path such as `steps.1.attributes.email`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub root: Root,
    pub members: Vec<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Always(bool),
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
    Exists(Path),
    Eq(Path, Json),
    Ne(Path, Json),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub decision: Option<RouteDecision>,
    pub set: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub when: Condition,
    pub then: Action,
}

/// A validated rule table.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
    pub otherwise: Option<Action>,
}

impl RuleSet {
    /// Parses and validates a JSON rule table.
    pub fn parse(source: &str) -> ScriptResult<Self> {
        let spec: RuleSetSpec = serde_json::from_str(source).map_err(|err| {
            ScriptError::compile(u32::try_from(err.line()).unwrap_or(0), err.to_string())
        })?;

        let rules = spec
            .rules
            .into_iter()
            .enumerate()
            .map(|(i, rule)| {
                let context = format!("rule {i}");
                Ok(Rule {
                    when: condition(rule.when, &context)?,
                    then: action(rule.then, &context)?,
                })
            })
            .collect::<ScriptResult<Vec<_>>>()?;
        let otherwise = spec
            .otherwise
            .map(|otherwise| action(otherwise, "otherwise"))
            .transpose()?;

        Ok(Self { rules, otherwise })
    }
}

fn invalid(context: &str, message: impl std::fmt::Display) -> ScriptError {
    ScriptError::compile(0, format!("{context}: {message}"))
}

fn condition(spec: ConditionSpec, context: &str) -> ScriptResult<Condition> {
    let op = match spec {
        ConditionSpec::Literal(value) => return Ok(Condition::Always(value)),
        ConditionSpec::Op(op) => *op,
    };
    let all = |specs: Vec<ConditionSpec>| {
        specs
            .into_iter()
            .map(|spec| condition(spec, context))
            .collect::<ScriptResult<Vec<_>>>()
    };
    Ok(match op {
        OpSpec::All(specs) => Condition::All(all(specs)?),
        OpSpec::Any(specs) => Condition::Any(all(specs)?),
        OpSpec::Not(spec) => Condition::Not(Box::new(condition(spec, context)?)),
        OpSpec::Exists(path) => Condition::Exists(parse_path(&path, context)?),
        OpSpec::Eq(path, value) => Condition::Eq(parse_path(&path, context)?, value),
        OpSpec::Ne(path, value) => Condition::Ne(parse_path(&path, context)?, value),
    })
}

fn action(spec: ActionSpec, context: &str) -> ScriptResult<Action> {
    let object = match spec {
        ActionSpec::Keyword(Keyword::Succeed) => ActionObject {
            succeed: true,
            ..ActionObject::default()
        },
        ActionSpec::Keyword(Keyword::Fail) => ActionObject {
            fail: Some(Json::Bool(true)),
            ..ActionObject::default()
        },
        ActionSpec::Object(object) => object,
    };

    let mut decisions = Vec::new();
    if let Some(step) = object.execute_step {
        if step == 0 {
            return Err(invalid(context, "executeStep must be at least 1"));
        }
        decisions.push(RouteDecision::ExecuteStep(step));
    }
    if object.succeed {
        decisions.push(RouteDecision::Succeed);
    }
    if let Some(reason) = object.fail {
        let reason = match reason {
            Json::String(reason) => Some(reason),
            Json::Bool(true) => None,
            other => return Err(invalid(context, format!("invalid fail reason {other}"))),
        };
        decisions.push(RouteDecision::Fail { reason });
    }
    if decisions.len() > 1 {
        return Err(invalid(context, "an action may route at most once"));
    }

    let set = object
        .set
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Json::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect();

    Ok(Action {
        decision: decisions.pop(),
        set,
    })
}

fn parse_path(text: &str, context: &str) -> ScriptResult<Path> {
    let mut segments = text.split('.');
    let root = match segments.next() {
        Some("steps") => {
            let index = segments
                .next()
                .ok_or_else(|| invalid(context, format!("path '{text}' needs a step number")))?;
            let index = index.parse::<i64>().map_err(|_| {
                invalid(
                    context,
                    format!("step index in '{text}' must be an integer, got '{index}'"),
                )
            })?;
            Root::Step(index)
        }
        Some("properties") => Root::Properties,
        _ => {
            return Err(invalid(
                context,
                format!("path '{text}' must start with 'steps' or 'properties'"),
            ))
        }
    };
    let members: Vec<String> = segments.map(str::to_string).collect();
    if members.iter().any(String::is_empty) {
        return Err(invalid(context, format!("path '{text}' has an empty segment")));
    }
    Ok(Path {
        root,
        members,
        text: text.to_string(),
    })
}
