//! Formula language: compilation, evaluation and static analysis
//!
//! ```text
//! {{total_ht}} * 0.2
//! IF({{stock}} < 10, "Alert", "OK")
//! ROUND(DIV({{done}}, {{total}}) * 100, 1)
//! ```

pub mod ast;
pub mod builtins;
pub mod cache;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod scope;

pub use cache::FormulaCache;
pub use error::{CompileError, EvalError, SyntaxError};
pub use eval::{Env, FieldSource, Overlay};

use crate::domain::value::{Record, Value};
use ast::Expr;
use chrono::{DateTime, Utc};
use error::EvalResult;
use serde::Serialize;

/// A formula ready to run against records
#[derive(Debug)]
pub struct CompiledFormula {
    source: String,
    expr: Expr,
    dependencies: Vec<String>,
    local: bool,
}

impl CompiledFormula {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Same-record fields the formula reads
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Evaluates against `fields` with the current time as the clock
    pub fn evaluate(&self, fields: &dyn FieldSource) -> EvalResult<Value> {
        self.evaluate_at(fields, Utc::now())
    }

    /// Evaluates against `fields` with a fixed clock
    pub fn evaluate_at(&self, fields: &dyn FieldSource, now: DateTime<Utc>) -> EvalResult<Value> {
        Env::new(fields, now).eval(&self.expr)
    }
}

/// Compiles formula text. Blank text compiles to a formula returning null.
pub fn compile(formula: &str) -> Result<CompiledFormula, CompileError> {
    let expr = parser::parse(formula)?;
    Ok(CompiledFormula {
        source: formula.to_string(),
        expr,
        dependencies: scope::extract_dependencies(formula),
        local: scope::is_local(formula),
    })
}

/// Outcome of trying a formula against sample data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub fields: Vec<String>,
    pub is_local: bool,
    pub message: String,
}

/// Compiles `formula` and evaluates it once against `sample`
pub fn validate(formula: &str, sample: &Record) -> Validation {
    let fields = scope::extract_dependencies(formula);
    let is_local = scope::is_local(formula);

    let outcome = compile(formula)
        .map_err(|e| e.to_string())
        .and_then(|compiled| compiled.evaluate(sample).map_err(|e| e.to_string()));

    match outcome {
        Ok(result) => {
            let message = if is_local {
                format!("Formula is valid (local). Result: {}", result)
            } else {
                format!(
                    "Formula is valid but requires full engine (uses relations/aggregations). Result: {}",
                    result
                )
            };
            Validation {
                valid: true,
                result: Some(result),
                error: None,
                fields,
                is_local,
                message,
            }
        }
        Err(error) => Validation {
            valid: false,
            result: None,
            message: format!("Formula error: {}", error),
            error: Some(error),
            fields,
            is_local,
        },
    }
}
