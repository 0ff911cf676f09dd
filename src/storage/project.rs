//! Project management
//!
//! Handles project initialization and provides access to stores.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use super::config::PROJECT_DIR;
use super::{Config, FormulaStore, JsonlRecordStore};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not in a recalc project. Run 'recalc init' first.")]
    NotInProject,
}

/// A recalc project: `.recalc/` with formulas, data and config
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Opens an existing project at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.join(PROJECT_DIR).is_dir() {
            return Err(ProjectError::NotInProject.into());
        }

        let config = Config::for_project(&root)?;

        Ok(Self { root, config })
    }

    /// Opens the project at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_project_root().ok_or(ProjectError::NotInProject)?;

        Self::open(root)
    }

    /// Initializes a new project at the given path
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let recalc_dir = root.join(PROJECT_DIR);

        let data_dir = recalc_dir.join("data");
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let config_path = recalc_dir.join("config.toml");
        if !config_path.exists() {
            let default_config = r#"# recalc configuration

[reload]
# Reads of formulas.jsonl before the last one is taken as is
attempts = 3
# Pause between two reads
settle_delay_ms = 700
# Quiet period before `recalc watch` reloads after an edit
debounce_ms = 5000

[batch]
# Records per page for `recalc run` (1 to 500)
batch_size = 100
"#;
            fs::write(&config_path, default_config)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let formulas_path = recalc_dir.join("formulas.jsonl");
        if !formulas_path.exists() {
            fs::write(&formulas_path, "").with_context(|| {
                format!("Failed to create formula store: {}", formulas_path.display())
            })?;
        }

        Self::open(root)
    }

    /// Returns the project root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .recalc directory path
    pub fn recalc_dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR)
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the formula store
    pub fn formula_store(&self) -> FormulaStore {
        FormulaStore::for_project(&self.root)
    }

    /// Returns the record store
    pub fn record_store(&self) -> JsonlRecordStore {
        JsonlRecordStore::for_project(&self.root)
    }
}
