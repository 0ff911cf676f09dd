//! Recalculation engine
//!
//! - [`loader`] picks the published local formulas and fingerprints them
//! - [`Snapshot`] holds compiled formulas and graphs for one formula set
//! - [`FormulaRegistry`] swaps snapshots atomically
//! - [`Snapshot::compute_updates`] recomputes one record
//! - [`stable_reload`] installs a new formula set once it stops changing
//! - [`recalculate_collection`] recomputes a whole collection

pub mod batch;
mod error;
mod executor;
pub mod loader;
mod reload;
mod snapshot;

pub use batch::{recalculate_collection, BatchOptions, BatchReport};
pub use error::RecalcError;
pub use executor::{FieldError, RecalcOutcome};
pub use loader::{LoadReport, SkippedFormula};
pub use reload::{stable_reload, FormulaSource, ReloadOptions, ReloadReport};
pub use snapshot::{CalculatedField, CollectionFormulas, CollectionSummary, FormulaRegistry, Snapshot};
