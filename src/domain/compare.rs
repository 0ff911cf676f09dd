//! Change detection between stored and freshly computed values
//!
//! A computed field is written back only when [`values_equal`] says the new
//! value differs from the stored one. Storage layers routinely hand values
//! back in another representation (`1` for `true`, `"12.50"` for `12.5`), and
//! treating those as changes would cause a write on every pass.

use super::value::Value;

/// Absolute tolerance for numeric comparison
pub const NUMERIC_TOLERANCE: f64 = 1e-7;

/// Returns true when `old` and `new` should be considered the same value
pub fn values_equal(old: &Value, new: &Value) -> bool {
    if old == new {
        return true;
    }

    match (old.is_null(), new.is_null()) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        _ => {}
    }

    let a = normalize_boolean(old);
    let b = normalize_boolean(new);
    if a == b {
        return true;
    }

    match (&a, &b) {
        (Value::Number(x), Value::Number(y)) => {
            if x.is_nan() && y.is_nan() {
                return true;
            }
            (x - y).abs() < NUMERIC_TOLERANCE
        }
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => false,
        _ => a.to_text() == b.to_text(),
    }
}

/// Maps the usual boolean encodings (`1`/`0`, `"1"`/`"0"`, `"true"`/`"false"`)
/// onto native booleans; other values pass through.
fn normalize_boolean(value: &Value) -> Value {
    match value {
        Value::Number(n) if *n == 1.0 => Value::Bool(true),
        Value::Number(n) if *n == 0.0 => Value::Bool(false),
        Value::String(s) if s == "1" || s == "true" => Value::Bool(true),
        Value::String(s) if s == "0" || s == "false" => Value::Bool(false),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_values() {
        assert!(values_equal(&Value::from(3), &Value::from(3)));
        assert!(values_equal(&Value::from("a"), &Value::from("a")));
    }

    #[test]
    fn nulls() {
        assert!(values_equal(&Value::Null, &Value::Null));
        assert!(!values_equal(&Value::Null, &Value::from(0)));
        assert!(!values_equal(&Value::from(""), &Value::Null));
    }

    #[test]
    fn boolean_encodings() {
        assert!(values_equal(&Value::from(1), &Value::from(true)));
        assert!(values_equal(&Value::from("0"), &Value::from(false)));
        assert!(values_equal(&Value::from("true"), &Value::from(1)));
        assert!(!values_equal(&Value::from(1), &Value::from(false)));
    }

    #[test]
    fn float_tolerance() {
        assert!(values_equal(&Value::from(0.1 + 0.2), &Value::from(0.3)));
        assert!(!values_equal(&Value::from(0.3), &Value::from(0.3001)));
    }

    #[test]
    fn nan_equals_nan() {
        assert!(values_equal(
            &Value::Number(f64::NAN),
            &Value::Number(f64::NAN)
        ));
    }

    #[test]
    fn string_form_fallback() {
        assert!(values_equal(&Value::from("42"), &Value::from(42)));
        assert!(values_equal(&Value::from("12.5"), &Value::from(12.5)));
        assert!(!values_equal(&Value::from("abc"), &Value::from(42)));
    }

    #[test]
    fn structured_values() {
        let a = Value::Array(vec![1.into(), 2.into()]);
        let b = Value::Array(vec![1.into(), 2.into()]);
        let c = Value::Array(vec![2.into()]);
        assert!(values_equal(&a, &b));
        assert!(!values_equal(&a, &c));
    }
}
