//! String functions
//!
//! Null input reads as the empty string. Lengths and offsets count
//! characters, not bytes.

use super::{arg, num_arg, Builtin};
use crate::domain::value::Value;
use crate::dsl::error::EvalResult;
use crate::dsl::eval::Env;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

pub(super) static BUILTINS: &[Builtin] = &[
    Builtin::eager("UPPER", 1, Some(1), upper),
    Builtin::eager("LOWER", 1, Some(1), lower),
    Builtin::eager("LENGTH", 1, Some(1), length),
    Builtin::eager("LEFT", 2, Some(2), left),
    Builtin::eager("RIGHT", 2, Some(2), right),
    Builtin::eager("SUBSTR", 2, Some(3), substr),
    Builtin::eager("SUBSTRING", 2, Some(3), substr),
    Builtin::eager("TRIM", 1, Some(1), trim),
    Builtin::eager("LTRIM", 1, Some(1), ltrim),
    Builtin::eager("RTRIM", 1, Some(1), rtrim),
    Builtin::eager("REPLACE", 3, Some(3), replace),
    Builtin::eager("REGEX_MATCH", 2, Some(2), regex_match),
    Builtin::eager("REGEX_EXTRACT", 2, Some(3), regex_extract),
    Builtin::eager("REGEX_REPLACE", 2, Some(4), regex_replace),
    Builtin::eager("CONCAT", 0, None, concat),
    Builtin::eager("CONCAT_WS", 1, None, concat_ws),
];

const REGEX_CACHE_LIMIT: usize = 256;

/// Compiles `pattern`, reusing earlier compilations. Malformed patterns
/// return `None`.
fn cached_regex(pattern: &str) -> Option<Regex> {
    static CACHE: OnceLock<Mutex<HashMap<String, Regex>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));

    let mut cache = cache.lock();
    if let Some(regex) = cache.get(pattern) {
        return Some(regex.clone());
    }

    let regex = Regex::new(pattern).ok()?;
    if cache.len() >= REGEX_CACHE_LIMIT {
        cache.clear();
    }
    cache.insert(pattern.to_string(), regex.clone());
    Some(regex)
}

fn text(value: String) -> EvalResult<Value> {
    Ok(Value::String(value))
}

/// Character count argument, truncated toward zero; missing reads as 0
fn count_arg(args: &[Value], index: usize) -> i64 {
    num_arg(args, index).map_or(0, |n| n.trunc() as i64)
}

fn char_slice(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end.saturating_sub(start)).collect()
}

fn upper(args: &[Value], _: &Env) -> EvalResult<Value> {
    text(arg(args, 0).to_text().to_uppercase())
}

fn lower(args: &[Value], _: &Env) -> EvalResult<Value> {
    text(arg(args, 0).to_text().to_lowercase())
}

fn length(args: &[Value], _: &Env) -> EvalResult<Value> {
    Ok(Value::from(arg(args, 0).to_text().chars().count() as i64))
}

fn left(args: &[Value], _: &Env) -> EvalResult<Value> {
    let s = arg(args, 0).to_text();
    let count = count_arg(args, 1).max(0) as usize;
    text(s.chars().take(count).collect())
}

fn right(args: &[Value], _: &Env) -> EvalResult<Value> {
    let s = arg(args, 0).to_text();
    let count = count_arg(args, 1).max(0) as usize;
    let len = s.chars().count();
    text(char_slice(&s, len.saturating_sub(count), len))
}

/// Zero-based `start`; without `len` runs to the end. Bounds are clamped
/// and swapped when reversed.
fn substr(args: &[Value], _: &Env) -> EvalResult<Value> {
    let s = arg(args, 0).to_text();
    let len = s.chars().count() as i64;
    let start = count_arg(args, 1);
    let end = match args.get(2) {
        None | Some(Value::Null) => len,
        Some(_) => start + count_arg(args, 2),
    };

    let clamp = |n: i64| n.clamp(0, len) as usize;
    let (a, b) = (clamp(start), clamp(end));
    let (from, to) = if a <= b { (a, b) } else { (b, a) };
    text(char_slice(&s, from, to))
}

fn trim(args: &[Value], _: &Env) -> EvalResult<Value> {
    text(arg(args, 0).to_text().trim().to_string())
}

fn ltrim(args: &[Value], _: &Env) -> EvalResult<Value> {
    text(arg(args, 0).to_text().trim_start().to_string())
}

fn rtrim(args: &[Value], _: &Env) -> EvalResult<Value> {
    text(arg(args, 0).to_text().trim_end().to_string())
}

/// Literal, all occurrences
fn replace(args: &[Value], _: &Env) -> EvalResult<Value> {
    let source = arg(args, 0).to_text();
    let search = arg(args, 1).to_text();
    if search.is_empty() {
        return text(source);
    }
    text(source.replace(&search, &arg(args, 2).to_text()))
}

fn regex_match(args: &[Value], _: &Env) -> EvalResult<Value> {
    let (subject, pattern) = (arg(args, 0), arg(args, 1));
    if subject.is_null() || pattern.is_null() {
        return Ok(Value::Bool(false));
    }
    let matched = cached_regex(&pattern.to_text()).is_some_and(|re| re.is_match(&subject.to_text()));
    Ok(Value::Bool(matched))
}

/// Capture group `group` (default 1) of the first match
fn regex_extract(args: &[Value], _: &Env) -> EvalResult<Value> {
    let (subject, pattern) = (arg(args, 0), arg(args, 1));
    if subject.is_null() || pattern.is_null() {
        return Ok(Value::Null);
    }
    let Some(re) = cached_regex(&pattern.to_text()) else {
        return Ok(Value::Null);
    };

    let group = num_arg(args, 2).map_or(1, |n| n.trunc() as i64);
    let subject = subject.to_text();
    let extracted = usize::try_from(group)
        .ok()
        .and_then(|g| re.captures(&subject)?.get(g))
        .map(|m| Value::from(m.as_str()));
    Ok(extracted.unwrap_or_default())
}

/// Replaces every match, or only the first when `global` is falsy.
/// `$1` and `${name}` in the replacement refer to capture groups.
fn regex_replace(args: &[Value], _: &Env) -> EvalResult<Value> {
    let (subject, pattern) = (arg(args, 0), arg(args, 1));
    if subject.is_null() || pattern.is_null() {
        return Ok(Value::Null);
    }
    let Some(re) = cached_regex(&pattern.to_text()) else {
        return Ok(Value::Null);
    };

    let subject = subject.to_text();
    let replacement = arg(args, 2).to_text();
    let global = args.get(3).map_or(true, Value::is_truthy);
    let result = if global {
        re.replace_all(&subject, replacement.as_str())
    } else {
        re.replace(&subject, replacement.as_str())
    };
    text(result.into_owned())
}

/// Null arguments are skipped
fn concat(args: &[Value], _: &Env) -> EvalResult<Value> {
    text(args.iter().filter(|v| !v.is_null()).map(Value::to_text).collect())
}

fn concat_ws(args: &[Value], _: &Env) -> EvalResult<Value> {
    let separator = arg(args, 0).to_text();
    let parts: Vec<String> = args[1..]
        .iter()
        .filter(|v| !v.is_null())
        .map(Value::to_text)
        .collect();
    text(parts.join(&separator))
}

#[cfg(test)]
mod tests {
    use crate::domain::value::{Record, Value};
    use crate::dsl::eval::Env;
    use crate::dsl::parser::parse;
    use chrono::Utc;

    fn eval(formula: &str) -> Value {
        let expr = parse(formula).unwrap();
        Env::new(&Record::new(), Utc::now()).eval(&expr).unwrap()
    }

    #[test]
    fn case_and_length() {
        assert_eq!(eval(r#"UPPER("abc")"#), Value::from("ABC"));
        assert_eq!(eval("LOWER({{missing}})"), Value::from(""));
        assert_eq!(eval(r#"LENGTH("héllo")"#), Value::from(5));
        assert_eq!(eval("LENGTH({{missing}})"), Value::from(0));
        assert_eq!(eval("UPPER(12)"), Value::from("12"));
    }

    #[test]
    fn slicing() {
        assert_eq!(eval(r#"LEFT("abcdef", 2)"#), Value::from("ab"));
        assert_eq!(eval(r#"RIGHT("abcdef", 2)"#), Value::from("ef"));
        assert_eq!(eval(r#"RIGHT("abc", 10)"#), Value::from("abc"));
        assert_eq!(eval(r#"RIGHT("abc", 0)"#), Value::from(""));
        assert_eq!(eval(r#"SUBSTR("abcdef", 2)"#), Value::from("cdef"));
        assert_eq!(eval(r#"SUBSTRING("abcdef", 1, 3)"#), Value::from("bcd"));
        assert_eq!(eval(r#"SUBSTR("abcdef", 10, 3)"#), Value::from(""));
        assert_eq!(eval(r#"SUBSTR("hello", -2, 3)"#), Value::from("h"));
    }

    #[test]
    fn trimming_and_replace() {
        assert_eq!(eval(r#"TRIM("  a b  ")"#), Value::from("a b"));
        assert_eq!(eval(r#"LTRIM("  a ")"#), Value::from("a "));
        assert_eq!(eval(r#"RTRIM("  a ")"#), Value::from("  a"));
        assert_eq!(eval(r#"REPLACE("a.b.c", ".", "-")"#), Value::from("a-b-c"));
        assert_eq!(eval(r#"REPLACE("abc", "", "-")"#), Value::from("abc"));
        assert_eq!(eval(r#"REPLACE({{x}}, "a", "b")"#), Value::from(""));
    }

    #[test]
    fn regex_functions() {
        assert_eq!(eval(r#"REGEX_MATCH("INV-042", "^INV-\\d+$")"#), Value::Bool(true));
        assert_eq!(eval(r#"REGEX_EXTRACT("INV-042", "INV-(\\d+)")"#), Value::from("042"));
        assert_eq!(eval(r#"REGEX_EXTRACT("INV-042", "INV-(\\d+)", 0)"#), Value::from("INV-042"));
        assert_eq!(eval(r#"REGEX_EXTRACT("INV-042", "X(\\d+)")"#), Value::Null);
        assert_eq!(eval(r##"REGEX_REPLACE("a1b22c", "\\d+", "#")"##), Value::from("a#b#c"));
        assert_eq!(eval(r##"REGEX_REPLACE("a1b22c", "\\d+", "#", false)"##), Value::from("a#b22c"));
        assert_eq!(eval(r#"REGEX_REPLACE("2025-10-15", "(\\d+)-(\\d+)-(\\d+)", "$3/$2/$1")"#), Value::from("15/10/2025"));
    }

    #[test]
    fn malformed_regex_yields_default() {
        assert_eq!(eval(r#"REGEX_MATCH("abc", "(")"#), Value::Bool(false));
        assert_eq!(eval(r#"REGEX_EXTRACT("abc", "(")"#), Value::Null);
        assert_eq!(eval(r#"REGEX_REPLACE("abc", "(", "x")"#), Value::Null);
    }

    #[test]
    fn concatenation_skips_nulls() {
        assert_eq!(eval(r#"CONCAT("a", {{x}}, 1, true)"#), Value::from("a1true"));
        assert_eq!(eval(r#"CONCAT_WS(", ", "a", {{x}}, "b")"#), Value::from("a, b"));
        assert_eq!(eval("CONCAT()"), Value::from(""));
    }
}
