//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Project management | `init` |
//! | Formula | Definition lifecycle | `formula add`, `formula list`, `formula test` |
//! | Engine | Recalculation | `compute`, `run`, `analyze` |
//! | Records | Data with live recompute | `record put`, `record get` |
//! | Reload | Formula set refresh | `reload`, `watch` |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug logs on stderr; `RUST_LOG` works too:
//! ```bash
//! recalc --verbose run invoices --dry-run
//! ```

mod app;
mod formula;
mod output;
mod record;
mod watch;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
