//! Tree-walking evaluator for the `expr` language.

use std::borrow::Cow;
use std::collections::HashMap;

use super::ast::{BinaryOp, Expr, LogicalOp, Stmt, StmtKind, UnaryOp};
use super::value::Value;
use crate::adapter::ForeignAdapter;
use crate::binding::{RouteDecision, ScriptBinding, ScriptOutcome};
use crate::error::{ScriptError, ScriptResult};
use crate::runtime::Budget;

/// Non-local exits out of statement execution.
enum Control {
    /// A routing function was called; the script stops here.
    Halt,
    /// `return` at top level.
    Return,
    Fault(ScriptError),
}

impl From<ScriptError> for Control {
    fn from(err: ScriptError) -> Self {
        Self::Fault(err)
    }
}

type Exec<T> = Result<T, Control>;

/// Runs a parsed program against a binding.
pub fn run(program: &[Stmt], binding: ScriptBinding, budget: Budget) -> ScriptResult<ScriptOutcome> {
    let mut globals = HashMap::new();
    globals.insert("steps", Value::Object(ForeignAdapter::new(binding.steps_object())));
    if let Some(properties) = binding.properties_object() {
        globals.insert("properties", Value::Object(ForeignAdapter::new(properties)));
    }

    let mut interp = Interpreter {
        binding,
        budget,
        globals,
        locals: HashMap::new(),
        decision: None,
    };

    for stmt in program {
        match interp.exec(stmt) {
            Ok(()) => {}
            Err(Control::Halt | Control::Return) => break,
            Err(Control::Fault(err)) => return Err(err),
        }
    }

    let operations = interp.budget.used();
    Ok(interp.binding.finish(interp.decision, operations))
}

struct Interpreter {
    binding: ScriptBinding,
    budget: Budget,
    globals: HashMap<&'static str, Value>,
    locals: HashMap<String, Value>,
    decision: Option<RouteDecision>,
}

impl Interpreter {
    fn exec(&mut self, stmt: &Stmt) -> Exec<()> {
        self.budget.tick()?;
        match &stmt.kind {
            StmtKind::Empty => {}
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Declare(name, init) => {
                if self.globals.contains_key(name.as_str()) {
                    return Err(evaluation(format!("cannot redeclare global '{name}'")));
                }
                let value = match init {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Undefined,
                };
                self.locals.insert(name.clone(), value);
            }
            StmtKind::Assign(target, expr) => self.assign(target, expr)?,
            StmtKind::If(cond, then, otherwise) => {
                if self.eval(cond)?.truthy() {
                    self.exec(then)?;
                } else if let Some(otherwise) = otherwise {
                    self.exec(otherwise)?;
                }
            }
            StmtKind::While(cond, body) => {
                while self.eval(cond)?.truthy() {
                    self.exec(body)?;
                }
            }
            StmtKind::Block(body) => {
                for stmt in body {
                    self.exec(stmt)?;
                }
            }
            StmtKind::Return => return Err(Control::Return),
            StmtKind::Throw(expr) => {
                let value = self.eval(expr)?;
                return Err(evaluation(format!(
                    "uncaught exception at line {}: {}",
                    stmt.line,
                    value.to_display()
                )));
            }
        }
        Ok(())
    }

    fn assign(&mut self, target: &Expr, expr: &Expr) -> Exec<()> {
        match target {
            Expr::Ident(name) => {
                if self.globals.contains_key(name.as_str()) {
                    return Err(ScriptError::ReadOnly {
                        object: "global",
                        member: name.clone(),
                    }
                    .into());
                }
                if !self.locals.contains_key(name) {
                    return Err(evaluation(format!("{name} is not defined")));
                }
                let value = self.eval(expr)?;
                self.locals.insert(name.clone(), value);
                Ok(())
            }
            Expr::Member(object, member) => {
                let object = self.eval(object)?;
                Err(write_error(&object, member).into())
            }
            Expr::Index(object, key) => {
                let object = self.eval(object)?;
                let key = self.eval(key)?;
                Err(write_error(&object, &key.to_display()).into())
            }
            _ => Err(evaluation("invalid assignment target")),
        }
    }

    fn eval(&mut self, expr: &Expr) -> Exec<Value> {
        self.budget.tick()?;
        let value = match expr {
            Expr::Number(n) => Value::Number(*n),
            Expr::Str(s) => Value::Str(s.clone()),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Null => Value::Null,
            Expr::Undefined => Value::Undefined,
            Expr::Ident(name) => self.lookup(name)?,
            Expr::Member(object, member) => {
                let object = self.eval(object)?;
                member_of(&object, member)?
            }
            Expr::Index(object, key) => {
                let object = self.eval(object)?;
                let key = self.eval(key)?;
                index_of(&object, &key)?
            }
            Expr::Call(name, args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                self.call(name, values)?
            }
            Expr::Unary(op, operand) => {
                let operand = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Value::Bool(!operand.truthy()),
                    UnaryOp::Neg => Value::Number(-operand.to_number()),
                }
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval(left)?;
                match (op, left.truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => left,
                    _ => self.eval(right)?,
                }
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                if *op == BinaryOp::Add && (is_textual(&left) || is_textual(&right)) {
                    self.concat(&left, &right)?
                } else {
                    binary(*op, &left, &right)
                }
            }
        };
        Ok(value)
    }

    fn concat(&mut self, left: &Value, right: &Value) -> Exec<Value> {
        let left = text_of(left);
        let right = text_of(right);
        let len = left.len().saturating_add(right.len());
        self.budget.allocate(len)?;
        let mut joined = String::with_capacity(len);
        joined.push_str(&left);
        joined.push_str(&right);
        Ok(Value::Str(joined))
    }

    fn lookup(&self, name: &str) -> Exec<Value> {
        self.locals
            .get(name)
            .or_else(|| self.globals.get(name))
            .cloned()
            .ok_or_else(|| evaluation(format!("{name} is not defined")))
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> Exec<Value> {
        match name {
            "executeStep" => {
                let target = match args.first() {
                    Some(Value::Number(n)) if n.fract() == 0.0 && *n >= 1.0 && *n <= f64::from(u32::MAX) => {
                        *n as u32
                    }
                    Some(other) => {
                        return Err(ScriptError::Type(format!(
                            "executeStep expects a positive integer, got {}",
                            other.to_display()
                        ))
                        .into())
                    }
                    None => {
                        return Err(ScriptError::Type("executeStep expects a step number".to_string()).into())
                    }
                };
                self.route(RouteDecision::ExecuteStep(target))
            }
            "succeed" => self.route(RouteDecision::Succeed),
            "fail" => {
                let reason = args
                    .first()
                    .filter(|value| !value.is_nullish())
                    .map(Value::to_display);
                self.route(RouteDecision::Fail { reason })
            }
            "setProperty" => {
                let [key, value] = args.as_slice() else {
                    return Err(ScriptError::Type("setProperty expects a key and a value".to_string()).into());
                };
                self.binding.set_property(key.to_display(), value.to_display())?;
                Ok(Value::Undefined)
            }
            "log" => {
                let message = args.iter().map(Value::to_display).collect::<Vec<_>>().join(" ");
                self.binding.log(&message)?;
                Ok(Value::Undefined)
            }
            _ => Err(evaluation(format!("{name} is not a function"))),
        }
    }

    fn route(&mut self, decision: RouteDecision) -> Exec<Value> {
        self.decision = Some(decision);
        Err(Control::Halt)
    }
}

fn evaluation(message: impl Into<String>) -> Control {
    Control::Fault(ScriptError::Evaluation(message.into()))
}

fn write_error(object: &Value, member: &str) -> ScriptError {
    match object {
        Value::Object(adapter) => ScriptError::ReadOnly {
            object: adapter.class_name(),
            member: member.to_string(),
        },
        other => ScriptError::Type(format!(
            "cannot set property '{member}' of {}",
            other.type_name()
        )),
    }
}

fn member_of(object: &Value, member: &str) -> ScriptResult<Value> {
    match object {
        Value::Undefined | Value::Null => Err(ScriptError::Type(format!(
            "cannot read property '{member}' of {}",
            object.type_name()
        ))),
        Value::Object(adapter) if adapter.is_indexed() => match member {
            "length" => Ok(Value::Number(adapter.keys().len() as f64)),
            _ => Err(ScriptError::Type(format!(
                "{} is indexed by step number, not '{member}'",
                adapter.class_name()
            ))),
        },
        Value::Object(adapter) => Ok(adapter.get_member(member)),
        Value::Str(s) if member == "length" => Ok(Value::Number(s.chars().count() as f64)),
        _ => Ok(Value::Undefined),
    }
}

fn index_of(object: &Value, key: &Value) -> ScriptResult<Value> {
    match object {
        Value::Object(adapter) if adapter.is_indexed() => match key {
            Value::Number(n) if n.fract() == 0.0 => Ok(adapter.get_slot(*n as i64)),
            other => Err(ScriptError::Type(format!(
                "{} index must be an integer, got {} '{}'",
                adapter.class_name(),
                other.type_name(),
                other.to_display()
            ))),
        },
        _ => member_of(object, &key.to_display()),
    }
}

fn text_of(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Str(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_display()),
    }
}

/// `+` concatenates when either operand is a string or an object.
fn is_textual(value: &Value) -> bool {
    matches!(value, Value::Str(_) | Value::Object(_))
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => Value::Number(left.to_number() + right.to_number()),
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Eq => Value::Bool(left.loose_eq(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_eq(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_eq(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_eq(right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            Value::Bool(compare(op, left, right))
        }
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    ordering.is_some_and(|ordering| match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    })
}
