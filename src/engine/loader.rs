//! Selection of the formulas the engine runs
//!
//! Keeps published, complete, local definitions in (collection, sort,
//! field) order and fingerprints the selection so reloads can tell when
//! two reads saw the same formula set.

use crate::domain::FormulaDefinition;
use crate::dsl::scope;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, info, warn};

/// A formula that was left out of the snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFormula {
    pub collection: String,
    pub field: String,
    pub reason: String,
}

/// What a load kept and what it left out
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    /// Formulas compiled into the snapshot
    pub loaded: usize,
    /// Draft or archived definitions
    pub inactive: usize,
    /// Rows missing a collection, field or formula text
    pub incomplete: usize,
    /// Formulas reading other records or collections
    pub skipped_non_local: Vec<SkippedFormula>,
    /// Formulas that did not compile; their fields keep stored values
    pub failed: Vec<SkippedFormula>,
}

/// Local published formulas plus the report of what was filtered out
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub formulas: Vec<FormulaDefinition>,
    pub report: LoadReport,
}

impl Selection {
    /// blake3 fingerprint of the selected formula set
    pub fn signature(&self) -> String {
        signature(&self.formulas)
    }
}

/// Fingerprint of a formula set, independent of input order
pub fn signature(formulas: &[FormulaDefinition]) -> String {
    let mut sorted: Vec<&FormulaDefinition> = formulas.iter().collect();
    sorted.sort_by(|a, b| definition_order(a, b));

    let mut hasher = blake3::Hasher::new();
    for def in sorted {
        hasher.update(def.collection.as_bytes());
        hasher.update(b"\0");
        hasher.update(def.field.as_bytes());
        hasher.update(b"\0");
        hasher.update(def.formula.as_bytes());
        hasher.update(b"\0");
        if let Some(sort) = def.sort_order {
            hasher.update(&sort.to_le_bytes());
        }
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

/// Orders by collection, then sort (unsorted last), then field
fn definition_order(a: &FormulaDefinition, b: &FormulaDefinition) -> Ordering {
    let sort_key = |d: &FormulaDefinition| (d.sort_order.is_none(), d.sort_order);
    a.collection
        .cmp(&b.collection)
        .then_with(|| sort_key(a).cmp(&sort_key(b)))
        .then_with(|| a.field.cmp(&b.field))
}

/// Filters raw definitions down to what the engine can run
pub fn select_local(definitions: Vec<FormulaDefinition>) -> Selection {
    let mut report = LoadReport::default();
    let mut formulas = Vec::new();

    for def in definitions {
        if !def.status.is_active() {
            debug!(collection = %def.collection, field = %def.field, status = %def.status, "Skipping inactive formula");
            report.inactive += 1;
            continue;
        }

        if !def.is_complete() {
            warn!(
                collection = %def.collection,
                field = %def.field,
                "Skipping formula row missing collection, field or formula text"
            );
            report.incomplete += 1;
            continue;
        }

        if !scope::is_local(&def.formula) {
            info!(
                collection = %def.collection,
                field = %def.field,
                formula = %def.formula,
                "Skipping non-local formula"
            );
            report.skipped_non_local.push(SkippedFormula {
                collection: def.collection.clone(),
                field: def.field.clone(),
                reason: "uses relations or aggregations".to_string(),
            });
            continue;
        }

        formulas.push(def);
    }

    formulas.sort_by(definition_order);
    Selection { formulas, report }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FormulaStatus;

    #[test]
    fn keeps_published_local_formulas_in_order() {
        let selection = select_local(vec![
            FormulaDefinition::new("orders", "total", "{{qty}} * {{price}}").with_sort(2),
            FormulaDefinition::new("orders", "tax", "{{total}} * 0.2").with_sort(1),
            FormulaDefinition::new("orders", "note", "UPPER({{label}})"),
            FormulaDefinition::new("clients", "name_uc", "UPPER({{name}})"),
        ]);

        let keys: Vec<_> = selection
            .formulas
            .iter()
            .map(|f| format!("{}.{}", f.collection, f.field))
            .collect();
        assert_eq!(keys, ["clients.name_uc", "orders.tax", "orders.total", "orders.note"]);
    }

    #[test]
    fn filters_and_reports() {
        let selection = select_local(vec![
            FormulaDefinition::new("orders", "total", "{{a}}"),
            FormulaDefinition::new("orders", "draft", "{{a}}").with_status(FormulaStatus::Draft),
            FormulaDefinition::new("orders", "", "{{a}}"),
            FormulaDefinition::new("orders", "budget", "{{Phase.budget}}"),
            FormulaDefinition::new("orders", "lines", "SUM({{lines}})"),
        ]);

        assert_eq!(selection.formulas.len(), 1);
        assert_eq!(selection.report.inactive, 1);
        assert_eq!(selection.report.incomplete, 1);
        assert_eq!(selection.report.skipped_non_local.len(), 2);
    }

    #[test]
    fn signature_ignores_input_order() {
        let a = FormulaDefinition::new("orders", "a", "{{x}}");
        let b = FormulaDefinition::new("orders", "b", "{{y}}");
        assert_eq!(signature(&[a.clone(), b.clone()]), signature(&[b, a]));
    }

    #[test]
    fn signature_tracks_formula_text() {
        let before = signature(&[FormulaDefinition::new("orders", "a", "{{x}}")]);
        let after = signature(&[FormulaDefinition::new("orders", "a", "{{x}} + 1")]);
        assert_ne!(before, after);
    }
}
