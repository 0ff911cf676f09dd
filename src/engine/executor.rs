//! Recalculation of one record
//!
//! Fields run strictly in scheduled order. Each formula sees the values
//! computed earlier in the same pass, and a failing field is logged and
//! skipped without touching its siblings.

use super::snapshot::{CollectionFormulas, Snapshot};
use crate::domain::{values_equal, Record, Value};
use crate::dsl::Overlay;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// A field whose formula failed on this record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub error: String,
}

/// Result of [`Snapshot::compute_updates`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecalcOutcome {
    /// Fields whose new value differs from the stored one
    pub updates: Record,
    /// Fields evaluated, in evaluation order
    pub evaluated: Vec<String>,
    pub errors: Vec<FieldError>,
    pub has_changes: bool,
}

impl CollectionFormulas {
    /// Evaluation order for a pass: the full order, narrowed by `changed`
    /// and by the closure of `targets` when given
    pub fn schedule<S: AsRef<str>>(&self, changed: Option<&[S]>, targets: Option<&[S]>) -> Vec<String> {
        let order = &self.analysis().order;
        let mut schedule = match changed {
            Some(changed) => self.graph().optimize_order(order, changed),
            None => order.clone(),
        };

        if let Some(targets) = targets {
            let closure: BTreeSet<String> = self.graph().dependency_closure(targets);
            schedule.retain(|field| closure.contains(field));
        }

        schedule
    }

    /// Evaluates the scheduled fields against `record`
    pub fn compute_updates_at<S: AsRef<str>>(
        &self,
        record: &Record,
        changed: Option<&[S]>,
        targets: Option<&[S]>,
        now: DateTime<Utc>,
    ) -> RecalcOutcome {
        let schedule = self.schedule(changed, targets);
        let mut computed = Record::new();
        let mut outcome = RecalcOutcome::default();

        for field in schedule {
            let Some(calculated) = self.field(&field) else {
                continue;
            };

            let overlay = Overlay {
                base: record,
                updates: &computed,
            };
            let result = calculated
                .compiled
                .evaluate_at(&overlay, now)
                .map(Value::into_storable);
            outcome.evaluated.push(field.clone());

            match result {
                Ok(value) => {
                    let old = record.get(&field).cloned().unwrap_or(Value::Null);
                    if !values_equal(&old, &value) {
                        debug!(collection = %self.name, field = %field, old = %old, new = %value, "Field changed");
                        outcome.updates.insert(field.clone(), value.clone());
                    }
                    computed.insert(field, value);
                }
                Err(err) => {
                    warn!(
                        collection = %self.name,
                        field = %field,
                        formula = %calculated.definition.formula,
                        error = %err,
                        "Formula evaluation failed; keeping stored value"
                    );
                    outcome.errors.push(FieldError {
                        field,
                        error: err.to_string(),
                    });
                }
            }
        }

        outcome.has_changes = !outcome.updates.is_empty();
        outcome
    }
}

impl Snapshot {
    /// Computes the field updates `record` needs in `collection`.
    ///
    /// `changed` restricts the pass to fields affected by those inputs;
    /// `targets` restricts it to what those outputs need. Both may apply.
    pub fn compute_updates<S: AsRef<str>>(
        &self,
        collection: &str,
        record: &Record,
        changed: Option<&[S]>,
        targets: Option<&[S]>,
    ) -> RecalcOutcome {
        self.compute_updates_at(collection, record, changed, targets, Utc::now())
    }

    /// [`Self::compute_updates`] with a fixed clock for `NOW()`/`TODAY()`
    pub fn compute_updates_at<S: AsRef<str>>(
        &self,
        collection: &str,
        record: &Record,
        changed: Option<&[S]>,
        targets: Option<&[S]>,
        now: DateTime<Utc>,
    ) -> RecalcOutcome {
        match self.collection(collection) {
            Some(formulas) if !formulas.is_empty() => {
                formulas.compute_updates_at(record, changed, targets, now)
            }
            _ => RecalcOutcome::default(),
        }
    }
}
