//! CLI integration tests for recalc
//!
//! These tests drive the binary end to end: project setup, formula
//! management, single-record computation and collection-wide recompute.

use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get a command instance for the recalc binary
fn recalc_cmd() -> assert_cmd::Command {
    assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("recalc"))
}

/// Create a temporary directory and initialize a recalc project
fn setup_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    recalc_cmd().arg("init").arg(dir.path()).assert().success();
    dir
}

/// Project with the invoice formulas `total_ht`, `tva` and `total_ttc`
fn setup_invoices() -> TempDir {
    let dir = setup_project();
    for (field, formula) in [
        ("total_ttc", "{{total_ht}} + {{tva}}"),
        ("tva", "{{total_ht}} * 0.2"),
        ("total_ht", "{{qty}} * {{price}}"),
    ] {
        recalc_cmd()
            .current_dir(dir.path())
            .args(["formula", "add", "invoices", field, formula])
            .assert()
            .success();
    }
    dir
}

fn json_stdout(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

// =============================================================================
// Initialization Tests
// =============================================================================

#[test]
fn test_init_creates_structure() {
    let dir = TempDir::new().unwrap();

    recalc_cmd()
        .arg("init")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized recalc project"));

    assert!(dir.path().join(".recalc").is_dir());
    assert!(dir.path().join(".recalc/data").is_dir());
    assert!(dir.path().join(".recalc/config.toml").is_file());
    assert!(dir.path().join(".recalc/formulas.jsonl").is_file());
}

#[test]
fn test_init_is_idempotent() {
    let dir = TempDir::new().unwrap();

    recalc_cmd().arg("init").arg(dir.path()).assert().success();
    recalc_cmd().arg("init").arg(dir.path()).assert().success();
}

#[test]
fn test_commands_outside_project_fail() {
    let dir = TempDir::new().unwrap();

    recalc_cmd()
        .current_dir(dir.path())
        .args(["formula", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("recalc init"));
}

// =============================================================================
// Formula Tests
// =============================================================================

#[test]
fn test_formula_add_and_list() {
    let dir = setup_invoices();

    recalc_cmd()
        .current_dir(dir.path())
        .args(["formula", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("total_ht"))
        .stdout(predicate::str::contains("{{qty}} * {{price}}"));

    let stored = fs::read_to_string(dir.path().join(".recalc/formulas.jsonl")).unwrap();
    assert!(stored.contains("\"collection_cible\":\"invoices\""));
    assert!(stored.contains("\"champ_cible\":\"tva\""));
}

#[test]
fn test_formula_add_replaces_existing() {
    let dir = setup_invoices();

    recalc_cmd()
        .current_dir(dir.path())
        .args(["formula", "add", "invoices", "tva", "{{total_ht}} * 0.1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated formula for invoices.tva"));

    let output = recalc_cmd()
        .current_dir(dir.path())
        .args(["--format", "json", "formula", "list", "invoices"])
        .output()
        .unwrap();
    let list = json_stdout(&output);
    assert_eq!(list.as_array().unwrap().len(), 3);
}

#[test]
fn test_formula_add_rejects_syntax_errors() {
    let dir = setup_project();

    recalc_cmd()
        .current_dir(dir.path())
        .args(["formula", "add", "invoices", "bad", "({{a}} +"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("({{a}} +"));
}

#[test]
fn test_formula_remove() {
    let dir = setup_invoices();

    recalc_cmd()
        .current_dir(dir.path())
        .args(["formula", "remove", "invoices", "tva"])
        .assert()
        .success();

    recalc_cmd()
        .current_dir(dir.path())
        .args(["formula", "remove", "invoices", "tva"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No formula for invoices.tva"));
}

#[test]
fn test_formula_test_reports_result() {
    let dir = setup_project();

    recalc_cmd()
        .current_dir(dir.path())
        .args(["formula", "test", "{{prix}} * {{quantite}}", "--data", r#"{"prix": 10, "quantite": 3}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("Formula is valid (local). Result: 30"));

    recalc_cmd()
        .current_dir(dir.path())
        .args(["formula", "test", r#"CAST("abc", "int")"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Formula error"));
}

// =============================================================================
// Compute Tests
// =============================================================================

#[test]
fn test_compute_invoice_chain() {
    let dir = setup_invoices();

    let output = recalc_cmd()
        .current_dir(dir.path())
        .args(["--format", "json", "compute", "invoices", "--data", r#"{"qty": 10, "price": 50}"#])
        .output()
        .unwrap();
    assert!(output.status.success());

    let outcome = json_stdout(&output);
    assert_eq!(outcome["has_changes"], true);
    assert_eq!(outcome["updates"]["total_ht"], 500);
    assert_eq!(outcome["updates"]["tva"], 100);
    assert_eq!(outcome["updates"]["total_ttc"], 600);
    assert_eq!(
        outcome["evaluated"],
        serde_json::json!(["total_ht", "tva", "total_ttc"])
    );
}

#[test]
fn test_compute_with_changed_fields() {
    let dir = setup_invoices();

    let output = recalc_cmd()
        .current_dir(dir.path())
        .args([
            "--format",
            "json",
            "compute",
            "invoices",
            "--data",
            r#"{"qty": 1, "price": 1, "total_ht": 100, "tva": 0, "total_ttc": 0}"#,
            "--changed",
            "tva",
        ])
        .output()
        .unwrap();

    let outcome = json_stdout(&output);
    assert_eq!(outcome["evaluated"], serde_json::json!(["tva", "total_ttc"]));
    assert_eq!(outcome["updates"]["total_ttc"], 120);
}

#[test]
fn test_compute_already_up_to_date() {
    let dir = setup_invoices();

    recalc_cmd()
        .current_dir(dir.path())
        .args([
            "compute",
            "invoices",
            "--data",
            r#"{"qty": 10, "price": 50, "total_ht": 500, "tva": 100, "total_ttc": "600"}"#,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes"));
}

// =============================================================================
// Record and Batch Tests
// =============================================================================

#[test]
fn test_record_put_applies_computed_fields() {
    let dir = setup_invoices();

    recalc_cmd()
        .current_dir(dir.path())
        .args(["record", "put", "invoices", "--data", r#"{"qty": 2, "price": 25}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stored invoices record 1"));

    let output = recalc_cmd()
        .current_dir(dir.path())
        .args(["--format", "json", "record", "get", "invoices", "1"])
        .output()
        .unwrap();
    let record = json_stdout(&output);
    assert_eq!(record["total_ht"], 50);
    assert_eq!(record["total_ttc"], 60);
}

#[test]
fn test_run_recomputes_collection() {
    let dir = setup_invoices();
    let data = dir.path().join(".recalc/data/invoices.jsonl");
    fs::write(
        &data,
        "{\"id\":1,\"qty\":1,\"price\":10}\n{\"id\":2,\"qty\":2,\"price\":10}\n{\"id\":3,\"qty\":3,\"price\":10}\n",
    )
    .unwrap();

    recalc_cmd()
        .current_dir(dir.path())
        .args(["run", "invoices", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry-run: 3 item(s) would be updated on 3 processed."));
    assert!(!fs::read_to_string(&data).unwrap().contains("total_ht"));

    recalc_cmd()
        .current_dir(dir.path())
        .args(["run", "invoices", "--batch-size", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated 3 item(s) on 3 processed."));
    assert!(fs::read_to_string(&data).unwrap().contains("\"total_ttc\":36"));

    recalc_cmd()
        .current_dir(dir.path())
        .args(["run", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated 0 item(s) on 3 processed."));
}

#[test]
fn test_run_with_unknown_fields_fails() {
    let dir = setup_invoices();

    recalc_cmd()
        .current_dir(dir.path())
        .args(["run", "invoices", "--fields", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("None of the requested fields (nope)"));
}

#[test]
fn test_run_all_with_fields_skips_other_collections() {
    let dir = setup_invoices();
    recalc_cmd()
        .current_dir(dir.path())
        .args(["formula", "add", "clients", "label", "UPPER({{name}})"])
        .assert()
        .success();
    fs::write(
        dir.path().join(".recalc/data/invoices.jsonl"),
        "{\"id\":1,\"qty\":2,\"price\":10}\n",
    )
    .unwrap();

    recalc_cmd()
        .current_dir(dir.path())
        .args(["run", "--all", "--fields", "tva"])
        .assert()
        .success()
        .stdout(predicate::str::contains("clients: skipped"))
        .stdout(predicate::str::contains("invoices: Updated 1 item(s) on 1 processed."));

    recalc_cmd()
        .current_dir(dir.path())
        .args(["run", "--all", "--fields", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("in any collection"));
}

// =============================================================================
// Analysis and Reload Tests
// =============================================================================

#[test]
fn test_analyze_reports_order_and_cycles() {
    let dir = setup_invoices();
    for (field, formula) in [("a", "{{b}} + 1"), ("b", "{{a}} + 1")] {
        recalc_cmd()
            .current_dir(dir.path())
            .args(["formula", "add", "loops", field, formula])
            .assert()
            .success();
    }

    recalc_cmd()
        .current_dir(dir.path())
        .args(["analyze", "invoices", "--graph"])
        .assert()
        .success()
        .stdout(predicate::str::contains("total_ht → tva → total_ttc"))
        .stdout(predicate::str::contains("cycles: none"))
        .stdout(predicate::str::contains("triggers: total_ttc, tva"));

    let output = recalc_cmd()
        .current_dir(dir.path())
        .args(["--format", "json", "analyze", "loops"])
        .output()
        .unwrap();
    let analysis = json_stdout(&output);
    assert_eq!(analysis["collections"][0]["has_cycles"], true);
}

#[test]
fn test_reload_reports_active_formulas() {
    let dir = setup_invoices();
    recalc_cmd()
        .current_dir(dir.path())
        .args(["formula", "add", "invoices", "client", "{{Client.name}}"])
        .assert()
        .success()
        .stdout(predicate::str::contains("will not be computed locally"));

    fs::write(
        dir.path().join(".recalc/config.toml"),
        "[reload]\nattempts = 2\nsettle_delay_ms = 0\n",
    )
    .unwrap();

    recalc_cmd()
        .current_dir(dir.path())
        .arg("reload")
        .assert()
        .success()
        .stdout(predicate::str::contains("stabilized after 2 attempt(s)"))
        .stdout(predicate::str::contains("3 formula(s) active across 1 collection(s)"))
        .stdout(predicate::str::contains("Skipped 1 non-local formula(s)"));
}
