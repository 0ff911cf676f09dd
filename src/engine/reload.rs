//! Stabilizing reload of the active formula set
//!
//! Formula definitions may be mid-write when a reload fires. The source is
//! read repeatedly with a settle delay until two consecutive reads carry
//! the same signature; the last read is then swapped in as a whole.

use super::loader;
use super::snapshot::FormulaRegistry;
use crate::domain::FormulaDefinition;
use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where formula definitions come from
pub trait FormulaSource {
    /// Every stored definition, whatever its status
    fn load_definitions(&self) -> Result<Vec<FormulaDefinition>>;
}

impl FormulaSource for Vec<FormulaDefinition> {
    fn load_definitions(&self) -> Result<Vec<FormulaDefinition>> {
        Ok(self.clone())
    }
}

/// Reload tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadOptions {
    pub attempts: u32,
    pub settle_delay: Duration,
}

impl Default for ReloadOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            settle_delay: Duration::from_millis(700),
        }
    }
}

/// Outcome of [`stable_reload`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReloadReport {
    pub attempts_used: u32,
    /// Two consecutive reads agreed before attempts ran out
    pub stabilized: bool,
    pub collections: usize,
    pub formulas: usize,
    pub signature: String,
    pub skipped_non_local: usize,
    pub failed: usize,
}

impl ReloadReport {
    pub fn message(&self) -> String {
        format!(
            "{} formula(s) active across {} collection(s)",
            self.formulas, self.collections
        )
    }
}

/// Reloads `source` until it settles, then installs the result in `registry`
pub fn stable_reload(
    registry: &FormulaRegistry,
    source: &dyn FormulaSource,
    options: ReloadOptions,
) -> Result<ReloadReport> {
    let attempts = options.attempts.max(1);
    let mut last_signature: Option<String> = None;
    let mut last_load = Vec::new();
    let mut attempts_used = 0;
    let mut stabilized = false;

    for attempt in 1..=attempts {
        attempts_used = attempt;
        info!(attempt, attempts, "Reload attempt {}/{}", attempt, attempts);

        let definitions = source
            .load_definitions()
            .with_context(|| format!("Failed to load formula definitions (attempt {})", attempt))?;
        let signature = loader::signature(&loader::select_local(definitions.clone()).formulas);
        debug!(attempt, signature = %signature, "Loaded formula set");

        let settled = last_signature.as_deref() == Some(signature.as_str());
        last_signature = Some(signature);
        last_load = definitions;

        if settled {
            info!(attempt, "Formula set stabilized on attempt {}", attempt);
            stabilized = true;
            break;
        }

        if attempt < attempts && !options.settle_delay.is_zero() {
            std::thread::sleep(options.settle_delay);
        }
    }

    if !stabilized && attempts > 1 {
        warn!(attempts, "Formula set did not stabilize; using the last load");
    }

    let snapshot = registry.build(last_load);
    let report = ReloadReport {
        attempts_used,
        stabilized,
        collections: snapshot.collection_names().len(),
        formulas: snapshot.formula_count(),
        signature: snapshot.signature().to_string(),
        skipped_non_local: snapshot.report().skipped_non_local.len(),
        failed: snapshot.report().failed.len(),
    };
    registry.swap(snapshot);

    info!("{}", report.message());
    Ok(report)
}
