//! recalc - Calculated fields for JSON records
//!
//! Formulas written against sibling fields of a record (`{{qty}} * {{price}}`)
//! are compiled once, ordered by their dependencies per collection, and
//! re-run incrementally when inputs change. Only values that actually differ
//! from the stored ones are reported as updates.

pub mod cli;
pub mod domain;
pub mod dsl;
pub mod engine;
pub mod storage;

pub use domain::{FormulaDefinition, FormulaStatus, Record, Value};
pub use dsl::{compile, validate, CompiledFormula};
pub use engine::{FormulaRegistry, RecalcOutcome, Snapshot};
