//! Formula CLI commands

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use super::app::parse_record;
use super::output::Output;
use crate::domain::{FormulaDefinition, FormulaStatus, Record};
use crate::dsl::{self, scope};
use crate::storage::Project;

#[derive(Subcommand)]
pub enum FormulaCommands {
    /// Add or replace the formula of a calculated field
    ///
    /// Examples:
    ///   recalc formula add invoices total_ht "{{qty}} * {{price}}"
    ///   recalc formula add invoices tva "ROUND({{total_ht}} * 0.2, 2)" --sort 2
    Add {
        /// Collection holding the field
        collection: String,

        /// Calculated field
        field: String,

        /// Formula text
        formula: String,

        /// published, draft or archived
        #[arg(long, default_value = "published")]
        status: String,

        /// Suggested execution order within the collection
        #[arg(long)]
        sort: Option<i64>,

        #[arg(long)]
        description: Option<String>,
    },

    /// List formula definitions
    List {
        /// Only this collection
        collection: Option<String>,
    },

    /// Remove the formula of a calculated field
    Remove {
        collection: String,
        field: String,
    },

    /// Compile a formula and evaluate it against sample data
    Test {
        formula: String,

        /// Sample record as a JSON object
        #[arg(long, default_value = "{}")]
        data: String,
    },
}

pub fn run(cmd: FormulaCommands, output: &Output) -> Result<()> {
    match cmd {
        FormulaCommands::Add {
            collection,
            field,
            formula,
            status,
            sort,
            description,
        } => add(output, collection, field, formula, &status, sort, description),
        FormulaCommands::List { collection } => list(output, collection.as_deref()),
        FormulaCommands::Remove { collection, field } => remove(output, &collection, &field),
        FormulaCommands::Test { formula, data } => test(output, &formula, &parse_record(&data)?),
    }
}

fn add(
    output: &Output,
    collection: String,
    field: String,
    formula: String,
    status: &str,
    sort: Option<i64>,
    description: Option<String>,
) -> Result<()> {
    let project = Project::open_current()?;
    let status: FormulaStatus = status.parse().map_err(anyhow::Error::msg)?;

    dsl::compile(&formula)?;

    let mut definition = FormulaDefinition::new(collection, field, formula).with_status(status);
    definition.sort_order = sort;
    definition.description = description;
    if !definition.is_complete() {
        bail!("Collection, field and formula must not be empty");
    }

    let local = scope::is_local(&definition.formula);
    let label = format!("{}.{}", definition.collection, definition.field);
    let replaced = project
        .formula_store()
        .upsert(definition.clone())
        .with_context(|| format!("Failed to save formula for {}", label))?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "collection": definition.collection,
            "field": definition.field,
            "status": definition.status,
            "replaced": replaced,
            "is_local": local,
        }));
    } else {
        let verb = if replaced { "Updated" } else { "Added" };
        output.success(&format!("{} formula for {}", verb, label));
        if !local {
            println!("Note: formula uses relations or aggregations and will not be computed locally");
        }
    }

    Ok(())
}

fn list(output: &Output, collection: Option<&str>) -> Result<()> {
    let project = Project::open_current()?;
    let store = project.formula_store();
    let mut definitions = match collection {
        Some(c) => store.for_collection(c)?,
        None => store.read_all()?,
    };
    definitions.sort_by(|a, b| {
        (a.collection.as_str(), a.sort_order.is_none(), a.sort_order, a.field.as_str()).cmp(&(
            b.collection.as_str(),
            b.sort_order.is_none(),
            b.sort_order,
            b.field.as_str(),
        ))
    });

    if output.is_json() {
        output.data(&definitions);
        return Ok(());
    }

    if definitions.is_empty() {
        println!("No formulas defined");
        return Ok(());
    }

    println!("{:<16} {:<20} {:<10} FORMULA", "COLLECTION", "FIELD", "STATUS");
    println!("{}", "-".repeat(70));
    for def in &definitions {
        println!(
            "{:<16} {:<20} {:<10} {}",
            def.collection, def.field, def.status, def.formula
        );
    }

    Ok(())
}

fn remove(output: &Output, collection: &str, field: &str) -> Result<()> {
    let project = Project::open_current()?;

    if !project.formula_store().remove(collection, field)? {
        bail!("No formula for {}.{}", collection, field);
    }

    output.success(&format!("Removed formula for {}.{}", collection, field));
    Ok(())
}

fn test(output: &Output, formula: &str, sample: &Record) -> Result<()> {
    let validation = dsl::validate(formula, sample);

    if output.is_json() {
        output.data(&validation);
    } else if validation.valid {
        println!("{}", validation.message);
        if !validation.fields.is_empty() {
            println!("Fields: {}", validation.fields.join(", "));
        }
    }

    if !validation.valid {
        bail!("{}", validation.message);
    }
    Ok(())
}
