//! Collection-wide recompute
//!
//! Pages through a collection, recomputes every record and writes back the
//! changed fields, or only counts them on a dry run.

use super::error::RecalcError;
use super::snapshot::Snapshot;
use crate::domain::Record;
use crate::storage::{record_id, RecordQuery, RecordStore};
use serde::Serialize;
use tracing::{debug, error, info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const MAX_BATCH_SIZE: usize = 500;

/// Parameters of [`recalculate_collection`]
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub collection: String,
    /// Restrict the pass to these outputs and what they need; empty means all
    pub target_fields: Vec<String>,
    /// Equality filter on the records to process
    pub filter: Record,
    /// Records per page, clamped to 1..=500
    pub batch_size: usize,
    pub dry_run: bool,
}

impl BatchOptions {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            target_fields: Vec::new(),
            filter: Record::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
        }
    }

    fn page_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub success: bool,
    pub collection: String,
    pub processed: usize,
    pub updated: usize,
    /// Matching records counted up front; 0 when the store cannot count
    pub total: usize,
    pub dry_run: bool,
    pub fields: Vec<String>,
    /// Records with at least one failing formula
    pub records_with_errors: usize,
    pub message: String,
}

fn read_error(collection: &str, err: anyhow::Error) -> RecalcError {
    RecalcError::Read {
        collection: collection.to_string(),
        message: format!("{:#}", err),
    }
}

/// Ids of the records matching `filter`, read before anything is written.
///
/// Updates can change whether a record matches, so paging the filter while
/// writing would skip records.
fn matching_ids(
    store: &dyn RecordStore,
    collection: &str,
    filter: &Record,
    limit: usize,
) -> Result<Vec<String>, RecalcError> {
    let mut ids = Vec::new();
    let mut without_id = 0;
    let mut offset = 0;

    loop {
        let query = RecordQuery::filtered(filter.clone())
            .ids_only()
            .page(offset, limit);
        let page = store
            .read_many(collection, &query)
            .map_err(|err| read_error(collection, err))?;

        for record in &page {
            match record_id(record) {
                Some(id) => ids.push(id),
                None => without_id += 1,
            }
        }

        offset += page.len();
        if page.len() < limit {
            break;
        }
    }

    if without_id > 0 {
        warn!(collection, count = without_id, "Skipping records without id");
    }
    Ok(ids)
}

/// Recomputes every record of `options.collection` matching its filter
pub fn recalculate_collection(
    snapshot: &Snapshot,
    store: &dyn RecordStore,
    options: &BatchOptions,
) -> Result<BatchReport, RecalcError> {
    let collection = options.collection.as_str();
    info!(
        collection,
        fields = ?options.target_fields,
        batch_size = options.batch_size,
        dry_run = options.dry_run,
        "Recalculating collection"
    );

    let formulas = match snapshot.collection(collection) {
        Some(formulas) if !formulas.is_empty() => formulas,
        _ => {
            warn!(collection, "No local formulas for collection");
            return Ok(BatchReport {
                success: true,
                collection: collection.to_string(),
                processed: 0,
                updated: 0,
                total: 0,
                dry_run: options.dry_run,
                fields: Vec::new(),
                records_with_errors: 0,
                message: format!("No formulas for collection {}", collection),
            });
        }
    };

    let requested: Vec<String> = options
        .target_fields
        .iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();

    let targets = if requested.is_empty() {
        None
    } else {
        let closure = formulas.graph().dependency_closure(&requested);
        if !closure.iter().any(|f| formulas.field(f).is_some()) {
            return Err(RecalcError::NoMatchingFields {
                collection: collection.to_string(),
                requested,
            });
        }

        let missing: Vec<&str> = requested
            .iter()
            .filter(|f| formulas.field(f).is_none())
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            warn!(collection, missing = ?missing, "Some requested fields are not local formulas");
        }

        Some(closure.into_iter().collect::<Vec<_>>())
    };

    let total = match store.count(collection, &options.filter) {
        Ok(count) => count.unwrap_or(0),
        Err(err) => {
            debug!(collection, error = %err, "Store cannot count records; continuing without a total");
            0
        }
    };

    let limit = options.page_size();
    let ids = matching_ids(store, collection, &options.filter, limit)?;
    info!(collection, total, matched = ids.len(), limit, "Starting batch processing");

    let mut processed = 0;
    let mut updated = 0;
    let mut records_with_errors = 0;

    for (index, batch) in ids.chunks(limit).enumerate() {
        let chunk = store
            .read_many(collection, &RecordQuery::by_ids(batch.to_vec()))
            .map_err(|err| read_error(collection, err))?;

        debug!(collection, batch = index, size = chunk.len(), "Processing batch");

        for record in &chunk {
            let outcome = snapshot.compute_updates(
                collection,
                record,
                None,
                targets.as_deref(),
            );
            processed += 1;
            if !outcome.errors.is_empty() {
                records_with_errors += 1;
            }
            if !outcome.has_changes {
                continue;
            }

            if options.dry_run {
                updated += 1;
                continue;
            }

            let Some(id) = record_id(record) else {
                continue;
            };
            match store.update_one(collection, &id, &outcome.updates) {
                Ok(true) => updated += 1,
                Ok(false) => warn!(collection, id = %id, "Record disappeared before its update"),
                Err(err) => error!(collection, id = %id, error = %format!("{:#}", err), "Error updating record during recalculation"),
            }
        }
    }

    let fields = match targets {
        Some(closure) => closure,
        None => formulas.analysis().order.clone(),
    };

    let message = if options.dry_run {
        format!(
            "Dry-run: {} item(s) would be updated on {} processed.",
            updated, processed
        )
    } else {
        format!("Updated {} item(s) on {} processed.", updated, processed)
    };

    let report = BatchReport {
        success: true,
        collection: collection.to_string(),
        processed,
        updated,
        total,
        dry_run: options.dry_run,
        fields,
        records_with_errors,
        message,
    };
    info!(collection, processed, updated, total, "{}", report.message);
    Ok(report)
}
