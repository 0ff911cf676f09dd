//! `CAST` and `TRY_CAST`

use super::date_time::{format_date, format_datetime, parse_datetime};
use super::{arg, Builtin};
use crate::domain::value::Value;
use crate::dsl::error::{EvalError, EvalResult};
use crate::dsl::eval::Env;

pub(super) static BUILTINS: &[Builtin] = &[
    Builtin::eager("CAST", 2, Some(2), cast),
    Builtin::eager("TRY_CAST", 2, Some(2), try_cast),
];

fn cast(args: &[Value], _: &Env) -> EvalResult<Value> {
    cast_value(arg(args, 0), &arg(args, 1).to_text(), true)
}

fn try_cast(args: &[Value], _: &Env) -> EvalResult<Value> {
    cast_value(arg(args, 0), &arg(args, 1).to_text(), false)
}

/// Converts `value` to `target`.
///
/// Null stays null for every target. When `strict`, a failed conversion or
/// an unknown target is an error; otherwise it yields null.
pub fn cast_value(value: &Value, target: &str, strict: bool) -> EvalResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    let fail = |err: EvalError| if strict { Err(err) } else { Ok(Value::Null) };
    let invalid = |kind: &str| {
        fail(EvalError::Cast {
            target: kind.to_string(),
            value: value.to_string(),
        })
    };

    match target.trim().to_lowercase().as_str() {
        "string" | "text" => Ok(Value::String(value.to_text())),
        "int" | "integer" | "bigint" => match value.to_number() {
            Some(n) => Ok(Value::Number(n.trunc())),
            None => invalid("integer"),
        },
        "float" | "double" | "decimal" | "numeric" => match value.to_number() {
            Some(n) => Ok(Value::Number(n)),
            None => invalid("decimal"),
        },
        "bool" | "boolean" => match to_bool(value) {
            Some(b) => Ok(Value::Bool(b)),
            None => invalid("boolean"),
        },
        "date" => match parse_datetime(value) {
            Some(dt) => Ok(Value::String(format_date(&dt))),
            None => invalid("date"),
        },
        "datetime" | "timestamp" => match parse_datetime(value) {
            Some(dt) => Ok(Value::String(format_datetime(&dt))),
            None => invalid("datetime"),
        },
        _ => fail(EvalError::UnsupportedCastType(target.to_string())),
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(*n != 0.0),
        other => match other.to_text().trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" => Some(true),
            "false" | "0" | "no" | "n" => Some(false),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value::Record;
    use crate::dsl::parser::parse;
    use chrono::Utc;

    fn run(formula: &str) -> EvalResult<Value> {
        let expr = parse(formula).unwrap();
        Env::new(&Record::new(), Utc::now()).eval(&expr)
    }

    #[test]
    fn integer_casts() {
        assert_eq!(run(r#"CAST("12", "int")"#), Ok(Value::from(12)));
        assert_eq!(run(r#"CAST("-12.9", "integer")"#), Ok(Value::from(-12)));
        assert_eq!(run(r#"TRY_CAST("abc", "int")"#), Ok(Value::Null));
    }

    #[test]
    fn strict_cast_fails() {
        let err = run(r#"CAST("abc", "int")"#).unwrap_err();
        assert!(matches!(err, EvalError::Cast { ref target, .. } if target == "integer"));
        assert!(err.to_string().contains("\"abc\""));
    }

    #[test]
    fn unsupported_type() {
        assert_eq!(
            run(r#"CAST(1, "uuid")"#),
            Err(EvalError::UnsupportedCastType("uuid".into()))
        );
        assert_eq!(run(r#"TRY_CAST(1, "uuid")"#), Ok(Value::Null));
        assert_eq!(run(r#"CAST(null, "uuid")"#), Ok(Value::Null));
    }

    #[test]
    fn boolean_casts() {
        assert_eq!(run(r#"CAST("Yes", "bool")"#), Ok(Value::Bool(true)));
        assert_eq!(run(r#"CAST("n", "boolean")"#), Ok(Value::Bool(false)));
        assert_eq!(run("CAST(2, \"bool\")"), Ok(Value::Bool(true)));
        assert_eq!(run(r#"TRY_CAST("maybe", "bool")"#), Ok(Value::Null));
    }

    #[test]
    fn text_and_decimal_casts() {
        assert_eq!(run(r#"CAST(12.5, "text")"#), Ok(Value::from("12.5")));
        assert_eq!(run(r#"CAST(" 3.25 ", "decimal")"#), Ok(Value::from(3.25)));
        assert_eq!(run(r#"CAST(true, "string")"#), Ok(Value::from("true")));
    }

    #[test]
    fn date_casts() {
        assert_eq!(run(r#"CAST("2025-10-10T15:00:00Z", "date")"#), Ok(Value::from("2025-10-10")));
        assert_eq!(
            run(r#"CAST("2025-10-10", "datetime")"#),
            Ok(Value::from("2025-10-10T00:00:00.000Z"))
        );
        assert_eq!(run(r#"TRY_CAST("someday", "date")"#), Ok(Value::Null));
    }
}
