//! Record CLI commands

use anyhow::{bail, Result};
use clap::Subcommand;
use tracing::debug;

use super::app::{load_snapshot, parse_record};
use super::output::Output;
use crate::domain::value::record_to_json;
use crate::storage::{Project, RecordStore, ID_FIELD};

#[derive(Subcommand)]
pub enum RecordCommands {
    /// Create or patch a record, then store its recomputed fields
    ///
    /// Examples:
    ///   recalc record put invoices --data '{"qty": 10, "price": 50}'
    ///   recalc record put invoices --data '{"id": 1, "qty": 12}'
    Put {
        collection: String,

        /// Record fields as a JSON object; include "id" to patch
        #[arg(long)]
        data: String,
    },

    /// Show a record
    Get { collection: String, id: String },
}

pub fn run(cmd: RecordCommands, output: &Output) -> Result<()> {
    match cmd {
        RecordCommands::Put { collection, data } => put(output, &collection, &data),
        RecordCommands::Get { collection, id } => get(output, &collection, &id),
    }
}

/// Writes the payload, then applies the updates its changed fields cause
/// in one follow-up write
fn put(output: &Output, collection: &str, data: &str) -> Result<()> {
    let project = Project::open_current()?;
    let snapshot = load_snapshot(&project)?;
    let store = project.record_store();

    let payload = parse_record(data)?;
    let changed: Vec<String> = payload
        .keys()
        .filter(|k| k.as_str() != ID_FIELD)
        .cloned()
        .collect();

    let id = store.put(collection, payload)?;
    let Some(record) = store.read_one(collection, &id, None)? else {
        bail!("Record {} vanished from {} after write", id, collection);
    };

    let outcome = snapshot.compute_updates(collection, &record, Some(changed.as_slice()), None);
    if outcome.has_changes {
        debug!(collection, id = %id, fields = outcome.updates.len(), "Applying computed fields");
        store.update_one(collection, &id, &outcome.updates)?;
    }

    if output.is_json() {
        output.data(&serde_json::json!({
            "id": id,
            "updates": record_to_json(&outcome.updates),
            "errors": outcome.errors,
        }));
        return Ok(());
    }

    output.success(&format!("Stored {} record {}", collection, id));
    for (field, value) in &outcome.updates {
        println!("  {} = {}", field, value);
    }
    for err in &outcome.errors {
        println!("  {}: error: {}", err.field, err.error);
    }

    Ok(())
}

fn get(output: &Output, collection: &str, id: &str) -> Result<()> {
    let project = Project::open_current()?;
    let Some(record) = project.record_store().read_one(collection, id, None)? else {
        bail!("No record {} in {}", id, collection);
    };

    if output.is_json() {
        output.data(&record_to_json(&record));
    } else {
        for (field, value) in &record {
            output.row(&[field.as_str(), value.to_text().as_str()]);
        }
    }

    Ok(())
}
