//! Content-addressed cache of compiled formulas
//!
//! Keyed by formula text, so identical formulas on different fields or
//! collections share one compilation. Entries are immutable; failed
//! compilations are not cached.

use super::error::{CompileError, EvalError};
use super::eval::FieldSource;
use super::{compile, CompiledFormula};
use crate::domain::value::Value;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Failure of [`FormulaCache::evaluate`]
#[derive(Debug, Error)]
pub enum FormulaError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("Error evaluating formula `{formula}`: {source}")]
    Eval { formula: String, source: EvalError },
}

#[derive(Debug, Default)]
pub struct FormulaCache {
    entries: Mutex<HashMap<String, Arc<CompiledFormula>>>,
}

impl FormulaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached compilation of `formula`, compiling on a miss
    pub fn get_or_compile(&self, formula: &str) -> Result<Arc<CompiledFormula>, CompileError> {
        if let Some(hit) = self.entries.lock().get(formula) {
            return Ok(Arc::clone(hit));
        }

        let compiled = Arc::new(compile(formula)?);
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(formula.to_string())
            .or_insert_with(|| Arc::clone(&compiled));
        Ok(Arc::clone(entry))
    }

    /// Compiles (or reuses) and evaluates `formula` against `fields`
    pub fn evaluate(&self, formula: &str, fields: &dyn FieldSource) -> Result<Value, FormulaError> {
        let compiled = self.get_or_compile(formula)?;
        let value = compiled.evaluate(fields).map_err(|source| FormulaError::Eval {
            formula: formula.to_string(),
            source,
        })?;
        tracing::trace!(formula, result = %value, "Evaluated formula");
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
