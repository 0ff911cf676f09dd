//! Conditionals, null handling, membership and comparison functions

use super::date_time::parse_datetime;
use super::{arg, Builtin};
use crate::domain::value::Value;
use crate::dsl::ast::Expr;
use crate::dsl::error::EvalResult;
use crate::dsl::eval::{loose_compare, strict_equals, Env};
use std::cmp::Ordering;

pub(super) static BUILTINS: &[Builtin] = &[
    Builtin::lazy("IF", 2, Some(3), if_),
    Builtin::lazy("CASE_WHEN", 0, None, case_when),
    Builtin::lazy("COALESCE", 0, None, coalesce),
    Builtin::lazy("AND", 0, None, and),
    Builtin::lazy("OR", 0, None, or),
    Builtin::eager("NOT", 1, Some(1), not),
    Builtin::eager("NULLIF", 2, Some(2), nullif),
    Builtin::eager("IS_NULL", 1, Some(1), is_null),
    Builtin::eager("IN", 1, None, in_),
    Builtin::eager("BETWEEN", 3, Some(3), between),
    Builtin::eager("EQ", 2, Some(2), eq),
    Builtin::eager("NE", 2, Some(2), ne),
    Builtin::eager("LT", 2, Some(2), lt),
    Builtin::eager("LTE", 2, Some(2), lte),
    Builtin::eager("GT", 2, Some(2), gt),
    Builtin::eager("GTE", 2, Some(2), gte),
];

fn if_(args: &[Expr], env: &Env) -> EvalResult<Value> {
    if env.eval(&args[0])?.is_truthy() {
        env.eval(&args[1])
    } else {
        args.get(2).map_or(Ok(Value::Null), |e| env.eval(e))
    }
}

/// Pairs of (condition, value); an odd trailing argument is the default
fn case_when(args: &[Expr], env: &Env) -> EvalResult<Value> {
    for pair in args.chunks_exact(2) {
        if env.eval(&pair[0])?.is_truthy() {
            return env.eval(&pair[1]);
        }
    }
    match args.len() % 2 {
        1 => env.eval(&args[args.len() - 1]),
        _ => Ok(Value::Null),
    }
}

fn coalesce(args: &[Expr], env: &Env) -> EvalResult<Value> {
    for expr in args {
        let value = env.eval(expr)?;
        if !value.is_null() {
            return Ok(value);
        }
    }
    Ok(Value::Null)
}

fn and(args: &[Expr], env: &Env) -> EvalResult<Value> {
    for expr in args {
        if !env.eval(expr)?.is_truthy() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn or(args: &[Expr], env: &Env) -> EvalResult<Value> {
    for expr in args {
        if env.eval(expr)?.is_truthy() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn not(args: &[Value], _: &Env) -> EvalResult<Value> {
    Ok(Value::Bool(!arg(args, 0).is_truthy()))
}

fn nullif(args: &[Value], _: &Env) -> EvalResult<Value> {
    let a = arg(args, 0);
    if strict_equals(a, arg(args, 1)) {
        Ok(Value::Null)
    } else {
        Ok(a.clone())
    }
}

fn is_null(args: &[Value], _: &Env) -> EvalResult<Value> {
    Ok(Value::Bool(arg(args, 0).is_null()))
}

/// Candidates may be scalars or arrays; arrays are searched element-wise
fn in_(args: &[Value], _: &Env) -> EvalResult<Value> {
    let needle = arg(args, 0);
    let found = args[1..].iter().any(|candidate| match candidate {
        Value::Array(items) => items.iter().any(|item| strict_equals(item, needle)),
        other => strict_equals(other, needle),
    });
    Ok(Value::Bool(found))
}

/// Numeric comparison when all three parse as numbers, then dates, then
/// the relational-operator ordering
fn between(args: &[Value], _: &Env) -> EvalResult<Value> {
    let (value, lower, upper) = (arg(args, 0), arg(args, 1), arg(args, 2));
    if value.is_null() || lower.is_null() || upper.is_null() {
        return Ok(Value::Bool(false));
    }

    if let (Some(v), Some(lo), Some(hi)) = (value.to_number(), lower.to_number(), upper.to_number()) {
        return Ok(Value::Bool(v >= lo && v <= hi));
    }

    if let (Some(v), Some(lo), Some(hi)) = (
        parse_datetime(value),
        parse_datetime(lower),
        parse_datetime(upper),
    ) {
        return Ok(Value::Bool(v >= lo && v <= hi));
    }

    let above = matches!(loose_compare(value, lower), Some(Ordering::Greater | Ordering::Equal));
    let below = matches!(loose_compare(value, upper), Some(Ordering::Less | Ordering::Equal));
    Ok(Value::Bool(above && below))
}

/// Numeric first, then dates, then the relational-operator ordering
pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.to_number(), b.to_number()) {
        return x.partial_cmp(&y);
    }
    if let (Some(x), Some(y)) = (parse_datetime(a), parse_datetime(b)) {
        return Some(x.cmp(&y));
    }
    loose_compare(a, b)
}

fn eq(args: &[Value], _: &Env) -> EvalResult<Value> {
    Ok(Value::Bool(strict_equals(arg(args, 0), arg(args, 1))))
}

fn ne(args: &[Value], _: &Env) -> EvalResult<Value> {
    Ok(Value::Bool(!strict_equals(arg(args, 0), arg(args, 1))))
}

fn ordered(args: &[Value], accept: fn(Ordering) -> bool) -> EvalResult<Value> {
    let result = compare(arg(args, 0), arg(args, 1)).is_some_and(accept);
    Ok(Value::Bool(result))
}

fn lt(args: &[Value], _: &Env) -> EvalResult<Value> {
    ordered(args, Ordering::is_lt)
}

fn lte(args: &[Value], _: &Env) -> EvalResult<Value> {
    ordered(args, Ordering::is_le)
}

fn gt(args: &[Value], _: &Env) -> EvalResult<Value> {
    ordered(args, Ordering::is_gt)
}

fn gte(args: &[Value], _: &Env) -> EvalResult<Value> {
    ordered(args, Ordering::is_ge)
}
