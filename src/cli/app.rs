//! Main CLI application structure

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use super::formula::{self, FormulaCommands};
use super::output::{Output, OutputFormat};
use super::record::{self, RecordCommands};
use super::watch;
use crate::domain::value::record_from_json;
use crate::domain::Record;
use crate::engine::{
    recalculate_collection, stable_reload, BatchOptions, BatchReport, FormulaRegistry,
    RecalcError, ReloadReport, Snapshot,
};
use crate::storage::{Config, Project};
use tracing::warn;

#[derive(Parser)]
#[command(name = "recalc")]
#[command(author, version, about = "Calculated fields for JSON records, kept up to date by formula")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global `default_format`, else text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new recalc project
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Manage formula definitions
    #[command(subcommand)]
    Formula(FormulaCommands),

    /// Show calculation order, levels and cycles per collection
    Analyze {
        /// Only this collection
        collection: Option<String>,

        /// Also print each field's dependencies and dependents
        #[arg(long)]
        graph: bool,
    },

    /// Compute the updates a record would receive, without storing anything
    Compute {
        collection: String,

        /// Record as a JSON object
        #[arg(long)]
        data: String,

        /// Fields that changed (recompute only what they affect)
        #[arg(long, value_delimiter = ',')]
        changed: Option<Vec<String>>,

        /// Fields to produce (recompute only what they need)
        #[arg(long, value_delimiter = ',')]
        fields: Option<Vec<String>>,
    },

    /// Read and write records
    #[command(subcommand)]
    Record(RecordCommands),

    /// Recompute every record of a collection
    Run {
        /// Collection to recompute
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        collection: Option<String>,

        /// Recompute every collection that has formulas
        #[arg(long)]
        all: bool,

        /// Fields to produce (with everything they need)
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,

        /// Only records matching this JSON object (field equality)
        #[arg(long)]
        filter: Option<String>,

        /// Records per page (1 to 500)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Count would-be updates without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Reload formula definitions until they are stable and report the result
    Reload,

    /// Watch formula definitions and reload on change
    Watch,
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let format = match cli.format {
        Some(format) => format,
        None => Config::load()?.global.default_format.into(),
    };
    let output = Output::new(format);

    match cli.command {
        Commands::Init { path } => {
            let project = Project::init(&path)?;
            tracing::debug!(dir = %project.recalc_dir().display(), "Created project directory");
            output.success(&format!("Initialized recalc project at {}", project.root().display()));
        }

        Commands::Formula(cmd) => formula::run(cmd, &output)?,

        Commands::Analyze { collection, graph } => analyze(&output, collection.as_deref(), graph)?,

        Commands::Compute {
            collection,
            data,
            changed,
            fields,
        } => compute(&output, &collection, &data, changed, fields)?,

        Commands::Record(cmd) => record::run(cmd, &output)?,

        Commands::Run {
            collection,
            all,
            fields,
            filter,
            batch_size,
            dry_run,
        } => run_batch(&output, collection, all, fields, filter, batch_size, dry_run)?,

        Commands::Reload => {
            let project = Project::open_current()?;
            let registry = FormulaRegistry::new();
            let report = stable_reload(
                &registry,
                &project.formula_store(),
                project.config().project.reload.options(),
            )?;
            print_reload(&output, &report);
        }

        Commands::Watch => watch::run(&output)?,
    }

    Ok(())
}

/// Logs go to stderr: WARN by default, DEBUG with `--verbose`, `RUST_LOG` on top
fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install logger")?;
    Ok(())
}

/// Parses a JSON object argument into a record
pub(crate) fn parse_record(json: &str) -> Result<Record> {
    let value: serde_json::Value =
        serde_json::from_str(json).with_context(|| format!("Invalid JSON: {}", json))?;
    if !value.is_object() {
        bail!("Expected a JSON object, got: {}", json);
    }
    Ok(record_from_json(value))
}

/// Loads the project's current formula set in one read
pub(crate) fn load_snapshot(project: &Project) -> Result<Snapshot> {
    let definitions = project
        .formula_store()
        .read_all()
        .context("Failed to load formula definitions")?;
    Ok(FormulaRegistry::new().build(definitions))
}

pub(crate) fn print_reload(output: &Output, report: &ReloadReport) {
    if output.is_json() {
        output.data(report);
        return;
    }

    let state = if report.stabilized {
        format!("stabilized after {} attempt(s)", report.attempts_used)
    } else {
        format!("not stable after {} attempt(s), using last load", report.attempts_used)
    };
    println!("Formulas reloaded ({})", state);
    println!("{}", report.message());
    if report.skipped_non_local > 0 {
        println!("Skipped {} non-local formula(s)", report.skipped_non_local);
    }
    if report.failed > 0 {
        println!("{} formula(s) failed to compile", report.failed);
    }
}

fn analyze(output: &Output, collection: Option<&str>, graph: bool) -> Result<()> {
    let project = Project::open_current()?;
    let snapshot = load_snapshot(&project)?;

    let collections: Vec<_> = match collection {
        Some(name) => match snapshot.collection(name) {
            Some(c) => vec![c],
            None => bail!("No local formulas for collection {}", name),
        },
        None => snapshot.collections().collect(),
    };

    if output.is_json() {
        let items: Vec<_> = collections
            .iter()
            .map(|c| {
                let mut item = serde_json::to_value(c.summary()).unwrap_or_default();
                if graph {
                    item["graph"] = serde_json::Value::String(c.graph().visualize());
                }
                item
            })
            .collect();
        output.data(&serde_json::json!({
            "collections": items,
            "report": snapshot.report(),
        }));
        return Ok(());
    }

    if collections.is_empty() {
        println!("No local formulas defined");
    }

    for c in &collections {
        let analysis = c.analysis();
        println!("{} ({} formula(s))", c.name, c.len());
        println!("  order:  {}", analysis.order.join(" → "));
        let levels: Vec<String> = analysis
            .order
            .iter()
            .map(|f| format!("{}={}", f, analysis.levels.get(f).copied().unwrap_or(0)))
            .collect();
        println!("  levels: {}", levels.join(", "));
        if analysis.has_cycles() {
            for warning in analysis.cycle_warnings() {
                println!("  cycle:  {}", warning);
            }
        } else {
            println!("  cycles: none");
        }
        if graph {
            println!();
            print!("{}", c.graph().visualize());
        }
        println!();
    }

    let report = snapshot.report();
    for skipped in &report.skipped_non_local {
        println!("Skipped {}.{}: {}", skipped.collection, skipped.field, skipped.reason);
    }
    for failed in &report.failed {
        println!("Failed {}.{}: {}", failed.collection, failed.field, failed.reason);
    }

    Ok(())
}

fn compute(
    output: &Output,
    collection: &str,
    data: &str,
    changed: Option<Vec<String>>,
    fields: Option<Vec<String>>,
) -> Result<()> {
    let project = Project::open_current()?;
    let snapshot = load_snapshot(&project)?;
    let record = parse_record(data)?;

    let outcome = snapshot.compute_updates(collection, &record, changed.as_deref(), fields.as_deref());

    if output.is_json() {
        output.data(&outcome);
        return Ok(());
    }

    if !outcome.has_changes {
        println!("No changes");
    }
    for (field, value) in &outcome.updates {
        println!("{} = {}", field, value);
    }
    for err in &outcome.errors {
        println!("{}: error: {}", err.field, err.error);
    }

    Ok(())
}

fn run_batch(
    output: &Output,
    collection: Option<String>,
    all: bool,
    fields: Vec<String>,
    filter: Option<String>,
    batch_size: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    let project = Project::open_current()?;
    let snapshot = load_snapshot(&project)?;
    let store = project.record_store();

    let filter = match filter {
        Some(json) => parse_record(&json)?,
        None => Record::new(),
    };

    let collections = if all {
        snapshot.collection_names()
    } else {
        collection.into_iter().collect()
    };

    let mut reports: Vec<BatchReport> = Vec::new();
    let mut skipped = 0;
    for name in collections {
        let options = BatchOptions {
            collection: name,
            target_fields: fields.clone(),
            filter: filter.clone(),
            batch_size: batch_size.unwrap_or(project.config().project.batch.batch_size),
            dry_run,
        };
        let report = match recalculate_collection(&snapshot, &store, &options) {
            Ok(report) => report,
            // With --all, a collection that none of the fields belong to is not an error
            Err(RecalcError::NoMatchingFields { collection, .. }) if all => {
                warn!(collection = %collection, fields = ?fields, "Skipping collection: no requested field is a local formula");
                if !output.is_json() {
                    println!("{}: skipped, no requested field is a local formula", collection);
                }
                skipped += 1;
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        if !output.is_json() {
            println!("{}: {}", report.collection, report.message);
        }
        reports.push(report);
    }

    if reports.is_empty() && skipped > 0 {
        bail!(
            "None of the requested fields ({}) match local formulas in any collection.",
            fields.join(", ")
        );
    }

    if output.is_json() {
        if all {
            output.data(&reports);
        } else if let Some(report) = reports.first() {
            output.data(report);
        }
    } else if reports.is_empty() {
        println!("No local formulas defined");
    }

    Ok(())
}
