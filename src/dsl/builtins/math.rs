//! Numeric functions. Non-numeric input yields null unless noted.

use super::{num_arg, Builtin};
use crate::domain::value::Value;
use crate::dsl::error::EvalResult;
use crate::dsl::eval::Env;

pub(super) static BUILTINS: &[Builtin] = &[
    Builtin::eager("ROUND", 1, Some(2), round),
    Builtin::eager("ABS", 1, Some(1), abs),
    Builtin::eager("CEIL", 1, Some(1), ceil),
    Builtin::eager("FLOOR", 1, Some(1), floor),
    Builtin::eager("ADD", 0, None, add),
    Builtin::eager("SUB", 0, None, sub),
    Builtin::eager("MUL", 0, None, mul),
    Builtin::eager("DIV", 2, Some(2), div),
    Builtin::eager("MOD", 2, Some(2), modulo),
    Builtin::eager("NEGATE", 1, Some(1), negate),
    Builtin::eager("POWER", 2, Some(2), power),
    Builtin::eager("SQRT", 1, Some(1), sqrt),
    Builtin::eager("SIGN", 1, Some(1), sign),
    Builtin::eager("GREATEST", 0, None, greatest),
    Builtin::eager("LEAST", 0, None, least),
];

fn number(value: Option<f64>) -> EvalResult<Value> {
    Ok(value.map(Value::Number).unwrap_or_default())
}

/// Half-up rounding to `decimals` places (default 2)
fn round(args: &[Value], _: &Env) -> EvalResult<Value> {
    let decimals = match args.get(1) {
        None => 2.0,
        Some(d) => d.to_number().unwrap_or(0.0).trunc(),
    };
    number(num_arg(args, 0).map(|n| {
        let factor = 10f64.powf(decimals);
        (n * factor + 0.5).floor() / factor
    }))
}

fn abs(args: &[Value], _: &Env) -> EvalResult<Value> {
    number(num_arg(args, 0).map(f64::abs))
}

fn ceil(args: &[Value], _: &Env) -> EvalResult<Value> {
    number(num_arg(args, 0).map(f64::ceil))
}

fn floor(args: &[Value], _: &Env) -> EvalResult<Value> {
    number(num_arg(args, 0).map(f64::floor))
}

/// Sum; non-numeric arguments count as 0
fn add(args: &[Value], _: &Env) -> EvalResult<Value> {
    number(Some(args.iter().filter_map(Value::to_number).sum()))
}

/// Left fold; null when the first argument is not numeric
fn sub(args: &[Value], _: &Env) -> EvalResult<Value> {
    let Some(first) = args.first().and_then(Value::to_number) else {
        return Ok(Value::Null);
    };
    number(Some(args[1..].iter().fold(first, |acc, v| acc - v.to_number().unwrap_or(0.0))))
}

/// Product; null when any argument is not numeric
fn mul(args: &[Value], _: &Env) -> EvalResult<Value> {
    if args.is_empty() {
        return Ok(Value::Null);
    }
    number(args.iter().map(Value::to_number).product::<Option<f64>>())
}

fn div(args: &[Value], _: &Env) -> EvalResult<Value> {
    number(match (num_arg(args, 0), num_arg(args, 1)) {
        (Some(a), Some(b)) if b != 0.0 => Some(a / b),
        _ => None,
    })
}

fn modulo(args: &[Value], _: &Env) -> EvalResult<Value> {
    number(match (num_arg(args, 0), num_arg(args, 1)) {
        (Some(a), Some(b)) if b != 0.0 => Some(a % b),
        _ => None,
    })
}

fn negate(args: &[Value], _: &Env) -> EvalResult<Value> {
    number(num_arg(args, 0).map(|n| -n))
}

fn power(args: &[Value], _: &Env) -> EvalResult<Value> {
    number(match (num_arg(args, 0), num_arg(args, 1)) {
        (Some(base), Some(exp)) => Some(base.powf(exp)),
        _ => None,
    })
}

fn sqrt(args: &[Value], _: &Env) -> EvalResult<Value> {
    number(num_arg(args, 0).filter(|n| *n >= 0.0).map(f64::sqrt))
}

fn sign(args: &[Value], _: &Env) -> EvalResult<Value> {
    number(num_arg(args, 0).map(|n| {
        if n > 0.0 {
            1.0
        } else if n < 0.0 {
            -1.0
        } else {
            0.0
        }
    }))
}

fn greatest(args: &[Value], _: &Env) -> EvalResult<Value> {
    number(args.iter().filter_map(Value::to_number).reduce(f64::max))
}

fn least(args: &[Value], _: &Env) -> EvalResult<Value> {
    number(args.iter().filter_map(Value::to_number).reduce(f64::min))
}
