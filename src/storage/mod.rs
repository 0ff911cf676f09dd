//! # Storage Layer
//!
//! Persistence for formula definitions, records and configuration, in
//! plain files that diff well.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Formulas | JSONL (one definition per line) | `.recalc/formulas.jsonl` |
//! | Records | JSONL (one record per line) | `.recalc/data/<collection>.jsonl` |
//! | Config | TOML | `.recalc/config.toml` |
//!
//! ## Concurrency Safety
//!
//! - Reads take a shared `fs2` lock, writes an exclusive one
//! - All writes are atomic (temp file + rename)
//!
//! ## Key Types
//!
//! - [`Project`] - Entry point for accessing a recalc project
//! - [`FormulaStore`] - Read/write formula definitions
//! - [`RecordStore`] - Record read/write capability used by batch recompute
//! - [`Config`] - Project and global configuration

mod config;
mod formulas;
mod jsonl;
mod project;
mod records;

pub use config::{
    BatchConfig, Config, ConfigError, GlobalConfig, OutputFormat, ProjectConfig, ReloadConfig,
    PROJECT_DIR,
};
pub use formulas::FormulaStore;
pub use project::{Project, ProjectError};
pub use records::{
    record_id, JsonlRecordStore, MemoryRecordStore, RecordQuery, RecordStore, ID_FIELD,
};
