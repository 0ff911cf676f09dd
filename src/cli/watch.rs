//! Live formula reload
//!
//! Watches `.recalc/` and runs a stabilizing reload after each debounced
//! burst of edits to `formulas.jsonl`.

use std::path::Path;
use std::sync::mpsc;

use anyhow::{Context, Result};
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use tracing::{error, info, warn};

use super::app::print_reload;
use super::output::Output;
use crate::engine::{stable_reload, FormulaRegistry};
use crate::storage::Project;

/// Blocks, reloading the formula set whenever `formulas.jsonl` changes
pub fn run(output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    let config = &project.config().project.reload;
    let store = project.formula_store();
    let registry = FormulaRegistry::new();

    let report = stable_reload(&registry, &store, config.options())?;
    print_reload(output, &report);

    let recalc_dir = project.recalc_dir();
    let (tx, rx) = mpsc::channel();
    let mut debouncer = new_debouncer(config.debounce(), tx)
        .context("Failed to start file watcher")?;

    debouncer
        .watcher()
        .watch(&recalc_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", recalc_dir.display()))?;

    info!(
        dir = %recalc_dir.display(),
        debounce_ms = config.debounce_ms,
        "Watching formula definitions"
    );

    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let relevant = events.iter().filter(|e| is_formula_store(&e.path)).count();
                if relevant == 0 {
                    continue;
                }

                info!("Detected {} change(s) to formula definitions", relevant);
                match stable_reload(&registry, &store, config.options()) {
                    Ok(report) => print_reload(output, &report),
                    // Keep serving the previous snapshot
                    Err(e) => error!(error = %format!("{:#}", e), "Reload failed"),
                }
            }
            Ok(Err(e)) => {
                warn!(error = ?e, "Watch error");
            }
            Err(e) => {
                error!(error = %e, "Watch channel closed");
                break;
            }
        }
    }

    Ok(())
}

/// True for `formulas.jsonl` itself, not its temp file
fn is_formula_store(path: &Path) -> bool {
    path.file_name().is_some_and(|name| name == "formulas.jsonl")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_formula_store_triggers_reloads() {
        assert!(is_formula_store(Path::new("/p/.recalc/formulas.jsonl")));
        assert!(!is_formula_store(Path::new("/p/.recalc/formulas.jsonl.tmp")));
        assert!(!is_formula_store(Path::new("/p/.recalc/config.toml")));
        assert!(!is_formula_store(Path::new("/p/.recalc/data/orders.jsonl")));
    }
}
