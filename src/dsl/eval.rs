//! Tree-walking evaluator
//!
//! Operator semantics:
//!
//! - Arithmetic yields null when an operand is null or not numeric, and for
//!   division or modulo by zero. `+` concatenates when it cannot add and
//!   either side is a string.
//! - `=` and `<>` are strict: no coercion between types.
//! - `<`, `<=`, `>`, `>=` compare strings lexicographically, otherwise
//!   numerically with null as 0 and booleans as 0/1.
//! - `AND` and `OR` short-circuit and return the deciding operand.

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::builtins::Implementation;
use super::error::EvalResult;
use crate::domain::value::{parse_number, Record, Value};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// Read access to the fields a formula can see
pub trait FieldSource {
    fn field(&self, name: &str) -> Option<&Value>;
}

impl FieldSource for Record {
    fn field(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// A record seen through the values computed so far in the current pass
pub struct Overlay<'a> {
    pub base: &'a Record,
    pub updates: &'a Record,
}

impl FieldSource for Overlay<'_> {
    fn field(&self, name: &str) -> Option<&Value> {
        self.updates.get(name).or_else(|| self.base.get(name))
    }
}

/// Evaluation environment: the visible fields and the pass clock
pub struct Env<'a> {
    fields: &'a dyn FieldSource,
    now: DateTime<Utc>,
}

impl<'a> Env<'a> {
    pub fn new(fields: &'a dyn FieldSource, now: DateTime<Utc>) -> Self {
        Self { fields, now }
    }

    /// Instant returned by `NOW()` and `TODAY()`
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Evaluates `expr` against this environment
    pub fn eval(&self, expr: &Expr) -> EvalResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Field(name) => Ok(self.fields.field(name).cloned().unwrap_or_default()),
            Expr::ForeignField { .. } => Ok(Value::Null),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                Ok(unary(*op, &value))
            }
            Expr::Binary { op, left, right } => self.binary(*op, left, right),
            Expr::Call { function, args } => match function.implementation {
                Implementation::Lazy(f) => f(args, self),
                Implementation::Eager(f) => {
                    let values = args.iter().map(|a| self.eval(a)).collect::<EvalResult<Vec<_>>>()?;
                    f(&values, self)
                }
            },
        }
    }

    fn binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> EvalResult<Value> {
        let lhs = self.eval(left)?;
        let rhs = || self.eval(right);

        Ok(match op {
            BinaryOp::And if lhs.is_truthy() => rhs()?,
            BinaryOp::Or if !lhs.is_truthy() => rhs()?,
            BinaryOp::And | BinaryOp::Or => lhs,
            BinaryOp::Add => add(&lhs, &rhs()?),
            BinaryOp::Sub => arithmetic(&lhs, &rhs()?, |a, b| Some(a - b)),
            BinaryOp::Mul => arithmetic(&lhs, &rhs()?, |a, b| Some(a * b)),
            BinaryOp::Div => arithmetic(&lhs, &rhs()?, |a, b| (b != 0.0).then(|| a / b)),
            BinaryOp::Mod => arithmetic(&lhs, &rhs()?, |a, b| (b != 0.0).then(|| a % b)),
            BinaryOp::Eq => Value::Bool(strict_equals(&lhs, &rhs()?)),
            BinaryOp::NotEq => Value::Bool(!strict_equals(&lhs, &rhs()?)),
            BinaryOp::Lt => Value::Bool(loose_compare(&lhs, &rhs()?) == Some(Ordering::Less)),
            BinaryOp::Le => Value::Bool(matches!(
                loose_compare(&lhs, &rhs()?),
                Some(Ordering::Less | Ordering::Equal)
            )),
            BinaryOp::Gt => Value::Bool(loose_compare(&lhs, &rhs()?) == Some(Ordering::Greater)),
            BinaryOp::Ge => Value::Bool(matches!(
                loose_compare(&lhs, &rhs()?),
                Some(Ordering::Greater | Ordering::Equal)
            )),
        })
    }
}

fn unary(op: UnaryOp, value: &Value) -> Value {
    match op {
        UnaryOp::Not => Value::Bool(!value.is_truthy()),
        UnaryOp::Neg => value.to_number().map(|n| Value::Number(-n)).unwrap_or_default(),
        UnaryOp::Plus => value.to_number().map(Value::Number).unwrap_or_default(),
    }
}

fn arithmetic(lhs: &Value, rhs: &Value, op: impl Fn(f64, f64) -> Option<f64>) -> Value {
    match (lhs.to_number(), rhs.to_number()) {
        (Some(a), Some(b)) => op(a, b).map(Value::Number).unwrap_or_default(),
        _ => Value::Null,
    }
}

fn add(lhs: &Value, rhs: &Value) -> Value {
    if let (Some(a), Some(b)) = (lhs.to_number(), rhs.to_number()) {
        return Value::Number(a + b);
    }
    if matches!(lhs, Value::String(_)) || matches!(rhs, Value::String(_)) {
        return Value::String(format!("{}{}", lhs.to_text(), rhs.to_text()));
    }
    Value::Null
}

/// Equality without coercion. NaN never equals itself.
pub(crate) fn strict_equals(a: &Value, b: &Value) -> bool {
    a == b
}

/// Ordering used by the relational operators and as the last-resort
/// fallback of the comparison functions. `None` means incomparable.
pub(crate) fn loose_compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return Some(x.cmp(y));
    }
    loose_number(a)?.partial_cmp(&loose_number(b)?)
}

fn loose_number(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => parse_number(s),
        Value::Array(_) | Value::Object(_) => None,
        other => other.to_number(),
    }
}
