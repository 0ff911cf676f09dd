//! Domain models for calculated fields
//!
//! Values, formula definitions, change detection and the dependency graph,
//! without any I/O concerns.

pub mod compare;
pub mod formula;
pub mod graph;
pub mod value;

pub use compare::values_equal;
pub use formula::{FormulaDefinition, FormulaStatus};
pub use graph::{Analysis, DependencyGraph, FieldNode};
pub use value::{Record, Value};
