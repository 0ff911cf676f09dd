//! Property tests for the recalculation engine
//!
//! Formula sets are random acyclic chains over two plain inputs, added in
//! random order. Idempotence is checked both in memory and through a JSONL
//! store, where NaN and infinities come back as null.

use proptest::prelude::*;
use recalc::domain::value::record_from_json;
use recalc::domain::{values_equal, FormulaDefinition, Record, Value};
use recalc::dsl::FormulaCache;
use recalc::engine::{recalculate_collection, BatchOptions, Snapshot};
use recalc::storage::{JsonlRecordStore, RecordStore};
use tempfile::TempDir;

const COLLECTION: &str = "items";

/// For each field `f{i}`, the indexes of earlier fields it reads
fn dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..8).prop_flat_map(|n| {
        (0..n)
            .map(|i| proptest::sample::subsequence((0..i).collect::<Vec<_>>(), 0..=i))
            .collect::<Vec<_>>()
    })
}

fn definitions(deps: &[Vec<usize>]) -> Vec<FormulaDefinition> {
    deps.iter()
        .enumerate()
        .map(|(i, reads)| {
            let mut terms: Vec<String> = reads.iter().map(|j| format!("{{{{f{}}}}}", j)).collect();
            terms.push(format!("{{{{x}}}} * {}", i + 1));
            terms.push("{{y}}".to_string());
            FormulaDefinition::new(COLLECTION, format!("f{}", i), terms.join(" + "))
        })
        .collect()
}

fn shuffled_definitions() -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<FormulaDefinition>)> {
    dag().prop_flat_map(|deps| {
        let defs = definitions(&deps);
        (Just(deps), Just(defs).prop_shuffle())
    })
}

proptest! {
    #[test]
    fn order_puts_dependencies_first((deps, defs) in shuffled_definitions()) {
        let snapshot = Snapshot::build(defs, &FormulaCache::new());
        let collection = snapshot.collection(COLLECTION).unwrap();
        let order = &collection.analysis().order;

        prop_assert_eq!(order.len(), deps.len());
        prop_assert!(!collection.analysis().has_cycles());

        let position = |field: &str| order.iter().position(|f| f == field).unwrap();
        for (i, reads) in deps.iter().enumerate() {
            for j in reads {
                let (dep, field) = (format!("f{}", j), format!("f{}", i));
                prop_assert!(position(&dep) < position(&field));
            }
        }
    }

    #[test]
    fn applying_updates_is_idempotent(
        (_, defs) in shuffled_definitions(),
        x in -1000.0f64..1000.0,
        y in prop_oneof![
            (-1000i64..1000).prop_map(|n| serde_json::json!(n)),
            Just(serde_json::json!(null)),
            Just(serde_json::json!("7")),
        ],
    ) {
        let snapshot = Snapshot::build(defs, &FormulaCache::new());
        let mut record = record_from_json(serde_json::json!({"x": x, "y": y}));

        let first = snapshot.compute_updates(COLLECTION, &record, None::<&[&str]>, None);
        record.extend(first.updates);

        let second = snapshot.compute_updates(COLLECTION, &record, None::<&[&str]>, None);
        prop_assert!(!second.has_changes, "second pass changed {:?}", second.updates);
    }

    #[test]
    fn incremental_pass_matches_full_pass(
        (deps, defs) in shuffled_definitions(),
        x in -100i64..100,
        changed_x in -100i64..100,
    ) {
        let snapshot = Snapshot::build(defs, &FormulaCache::new());
        let mut record = record_from_json(serde_json::json!({"x": x, "y": 1}));
        let initial = snapshot.compute_updates(COLLECTION, &record, None::<&[&str]>, None);
        record.extend(initial.updates);

        record.insert("x".to_string(), Value::from(changed_x));
        let incremental = snapshot.compute_updates(COLLECTION, &record, Some(&["x"][..]), None);
        let full = snapshot.compute_updates(COLLECTION, &record, None::<&[&str]>, None);

        prop_assert_eq!(incremental.evaluated.len(), deps.len());
        let mut a: Record = record.clone();
        a.extend(incremental.updates);
        let mut b: Record = record;
        b.extend(full.updates);
        for field in a.keys() {
            prop_assert!(values_equal(&a[field], &b[field]));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn stored_updates_are_idempotent(
        (_, defs) in shuffled_definitions(),
        x in -1000.0f64..1000.0,
        y in prop_oneof![
            (-1000i64..1000).prop_map(|n| serde_json::json!(n)),
            Just(serde_json::json!(null)),
        ],
    ) {
        let mut defs = defs;
        defs.push(FormulaDefinition::new(COLLECTION, "root", "POWER({{x}}, 0.5)"));
        defs.push(FormulaDefinition::new(COLLECTION, "overflow", "POWER(10, 400) + {{x}}"));
        let snapshot = Snapshot::build(defs, &FormulaCache::new());

        let dir = TempDir::new().unwrap();
        let store = JsonlRecordStore::new(dir.path());
        store
            .put(COLLECTION, record_from_json(serde_json::json!({"x": x, "y": y})))
            .unwrap();

        let options = BatchOptions::new(COLLECTION);
        let first = recalculate_collection(&snapshot, &store, &options).unwrap();
        prop_assert_eq!(first.processed, 1);

        let second = recalculate_collection(&snapshot, &store, &options).unwrap();
        prop_assert_eq!(second.updated, 0, "rewrote {:?}", store.read_all(COLLECTION).unwrap());
    }
}
