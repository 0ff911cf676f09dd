//! Static scope analysis of formula text
//!
//! Works on raw text so it can classify formulas that do not compile.

use regex::Regex;
use std::sync::OnceLock;

/// Functions that reach beyond the current record
pub const RELATIONAL_FUNCTIONS: &[&str] = &[
    "LOOKUP",
    "PARENT",
    "CHILDREN",
    "RELATED",
    "SUM",
    "AVG",
    "COUNT",
    "MIN",
    "MAX",
    "COUNT_DISTINCT",
];

fn field_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)?)\s*\}\}").expect("valid field regex")
    })
}

fn relational_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let names = RELATIONAL_FUNCTIONS.join("|");
        Regex::new(&format!(r"(?i)\b(?:{})\s*\(", names)).expect("valid relational function regex")
    })
}

/// Every field referenced, `field` or `Collection.field`, first occurrence first
pub fn extract_fields(formula: &str) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    for captures in field_pattern().captures_iter(formula) {
        let name = &captures[1];
        if !fields.iter().any(|f| f == name) {
            fields.push(name.to_string());
        }
    }
    fields
}

/// Bare (same-record) field references only
pub fn extract_dependencies(formula: &str) -> Vec<String> {
    extract_fields(formula)
        .into_iter()
        .filter(|f| !f.contains('.'))
        .collect()
}

/// True when the formula only reads sibling fields of the same record
pub fn is_local(formula: &str) -> bool {
    let cross_collection = extract_fields(formula).iter().any(|f| f.contains('.'));
    !cross_collection && !relational_pattern().is_match(formula)
}
