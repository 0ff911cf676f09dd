//! Immutable view of the active formula set
//!
//! A snapshot is built off to the side from one load of formula
//! definitions and swapped into the [`FormulaRegistry`] in one step.
//! In-flight computations keep the `Arc` they started with.

use super::loader::{self, LoadReport, Selection, SkippedFormula};
use crate::domain::{Analysis, DependencyGraph, FormulaDefinition};
use crate::dsl::{CompiledFormula, FormulaCache};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A compiled calculated field
#[derive(Debug, Clone)]
pub struct CalculatedField {
    pub definition: FormulaDefinition,
    pub compiled: Arc<CompiledFormula>,
}

/// Every calculated field of one collection with its graph and analysis
#[derive(Debug, Clone)]
pub struct CollectionFormulas {
    pub name: String,
    fields: BTreeMap<String, CalculatedField>,
    graph: DependencyGraph,
    analysis: Analysis,
}

impl CollectionFormulas {
    fn build(name: String, calculated: Vec<CalculatedField>) -> Self {
        let graph = DependencyGraph::build(calculated.iter().map(|f| {
            (
                f.definition.field.clone(),
                f.definition.formula.clone(),
                f.compiled.dependencies().to_vec(),
            )
        }));
        let analysis = graph.analyze();

        for warning in analysis.cycle_warnings() {
            warn!(collection = %name, cycle = %warning, "Circular formula dependency; values on this cycle are best-effort");
        }

        let fields = calculated
            .into_iter()
            .map(|f| (f.definition.field.clone(), f))
            .collect();

        Self {
            name,
            fields,
            graph,
            analysis,
        }
    }

    pub fn field(&self, name: &str) -> Option<&CalculatedField> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &CalculatedField> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    /// Introspection summary for `recalc analyze`
    pub fn summary(&self) -> CollectionSummary {
        CollectionSummary {
            collection: self.name.clone(),
            formula_count: self.fields.len(),
            fields: self.analysis.order.clone(),
            has_cycles: self.analysis.has_cycles(),
            order: self.analysis.order.clone(),
            levels: self.analysis.levels.clone(),
            cycles: self.analysis.cycles.clone(),
        }
    }
}

/// Serializable view of one collection's formula set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionSummary {
    pub collection: String,
    pub formula_count: usize,
    pub fields: Vec<String>,
    pub has_cycles: bool,
    pub order: Vec<String>,
    pub levels: BTreeMap<String, usize>,
    pub cycles: Vec<Vec<String>>,
}

/// Compiled formulas and graphs for every collection, from one load
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    collections: BTreeMap<String, CollectionFormulas>,
    signature: String,
    report: LoadReport,
}

impl Snapshot {
    /// Filters, compiles and groups raw definitions
    pub fn build(definitions: Vec<FormulaDefinition>, cache: &FormulaCache) -> Self {
        Self::from_selection(loader::select_local(definitions), cache)
    }

    pub fn from_selection(selection: Selection, cache: &FormulaCache) -> Self {
        let signature = selection.signature();
        let Selection { formulas, mut report } = selection;

        let mut grouped: BTreeMap<String, Vec<CalculatedField>> = BTreeMap::new();
        for definition in formulas {
            match cache.get_or_compile(&definition.formula) {
                Ok(compiled) => {
                    debug!(collection = %definition.collection, field = %definition.field, "Compiled formula");
                    grouped
                        .entry(definition.collection.clone())
                        .or_default()
                        .push(CalculatedField {
                            definition,
                            compiled,
                        });
                }
                Err(err) => {
                    warn!(
                        collection = %definition.collection,
                        field = %definition.field,
                        error = %err,
                        "Formula failed to compile; field keeps its stored value"
                    );
                    report.failed.push(SkippedFormula {
                        collection: definition.collection,
                        field: definition.field,
                        reason: err.to_string(),
                    });
                }
            }
        }

        report.loaded = grouped.values().map(Vec::len).sum();
        let collections = grouped
            .into_iter()
            .map(|(name, fields)| (name.clone(), CollectionFormulas::build(name, fields)))
            .collect();

        Self {
            collections,
            signature,
            report,
        }
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionFormulas> {
        self.collections.get(name)
    }

    pub fn collections(&self) -> impl Iterator<Item = &CollectionFormulas> {
        self.collections.values()
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }

    /// Number of compiled formulas across all collections
    pub fn formula_count(&self) -> usize {
        self.collections.values().map(CollectionFormulas::len).sum()
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }
}

/// Holder of the active snapshot
#[derive(Debug, Default)]
pub struct FormulaRegistry {
    active: RwLock<Arc<Snapshot>>,
    cache: FormulaCache,
}

impl FormulaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry already holding `definitions`
    pub fn with_definitions(definitions: Vec<FormulaDefinition>) -> Self {
        let registry = Self::new();
        let snapshot = registry.build(definitions);
        registry.swap(snapshot);
        registry
    }

    /// The snapshot in effect right now
    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.active.read())
    }

    /// Builds a snapshot with this registry's compile cache, without installing it
    pub fn build(&self, definitions: Vec<FormulaDefinition>) -> Snapshot {
        Snapshot::build(definitions, &self.cache)
    }

    /// Installs `snapshot`, returning the one it replaces
    pub fn swap(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let next = Arc::new(snapshot);
        std::mem::replace(&mut *self.active.write(), next)
    }

    pub fn cache(&self) -> &FormulaCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice_formulas() -> Vec<FormulaDefinition> {
        vec![
            FormulaDefinition::new("invoices", "total_ttc", "{{total_ht}} + {{tva}}"),
            FormulaDefinition::new("invoices", "tva", "{{total_ht}} * 0.2"),
            FormulaDefinition::new("invoices", "total_ht", "{{qty}} * {{price}}"),
        ]
    }

    #[test]
    fn groups_by_collection_and_orders_dependencies() {
        let mut defs = invoice_formulas();
        defs.push(FormulaDefinition::new("clients", "label", "UPPER({{name}})"));
        let snapshot = Snapshot::build(defs, &FormulaCache::new());

        assert_eq!(snapshot.collection_names(), ["clients", "invoices"]);
        assert_eq!(snapshot.formula_count(), 4);
        let invoices = snapshot.collection("invoices").unwrap();
        assert_eq!(invoices.analysis().order, ["total_ht", "tva", "total_ttc"]);
        assert!(!invoices.analysis().has_cycles());
    }

    #[test]
    fn compile_failures_are_reported_not_loaded() {
        let defs = vec![
            FormulaDefinition::new("orders", "ok", "{{a}} + 1"),
            FormulaDefinition::new("orders", "broken", "({{a}} +"),
        ];
        let snapshot = Snapshot::build(defs, &FormulaCache::new());

        assert_eq!(snapshot.report().loaded, 1);
        assert_eq!(snapshot.report().failed.len(), 1);
        assert_eq!(snapshot.report().failed[0].field, "broken");
        assert!(snapshot.collection("orders").unwrap().field("broken").is_none());
    }

    #[test]
    fn cycles_are_kept_with_diagnostics() {
        let defs = vec![
            FormulaDefinition::new("loop", "a", "{{b}} + 1"),
            FormulaDefinition::new("loop", "b", "{{a}} + 1"),
        ];
        let snapshot = Snapshot::build(defs, &FormulaCache::new());
        let summary = snapshot.collection("loop").unwrap().summary();
        assert!(summary.has_cycles);
        assert_eq!(summary.order.len(), 2);
    }

    #[test]
    fn registry_swap_keeps_old_snapshot_alive() {
        let registry = FormulaRegistry::with_definitions(invoice_formulas());
        let before = registry.current();

        let next = registry.build(vec![FormulaDefinition::new("invoices", "tva", "{{total_ht}} * 0.1")]);
        let replaced = registry.swap(next);

        assert!(Arc::ptr_eq(&before, &replaced));
        assert_eq!(before.formula_count(), 3);
        assert_eq!(registry.current().formula_count(), 1);
        assert_ne!(before.signature(), registry.current().signature());
    }
}
