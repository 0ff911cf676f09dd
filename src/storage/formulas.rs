//! JSONL storage for formula definitions
//!
//! Definitions live in `.recalc/formulas.jsonl`, one per line, keyed by
//! (collection, field).

use std::path::{Path, PathBuf};

use anyhow::Result;

use super::config::PROJECT_DIR;
use super::jsonl::JsonlFile;
use crate::domain::FormulaDefinition;
use crate::engine::FormulaSource;

/// Store for formula definitions in JSONL format
#[derive(Debug, Clone)]
pub struct FormulaStore {
    file: JsonlFile,
}

impl FormulaStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonlFile::new(path, "formula"),
        }
    }

    /// Creates the default store for a project
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(PROJECT_DIR).join("formulas.jsonl"))
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Reads every stored definition, whatever its status
    pub fn read_all(&self) -> Result<Vec<FormulaDefinition>> {
        self.file.read_all()
    }

    /// Inserts `definition` or replaces the one with the same identity.
    /// Returns true when an existing definition was replaced.
    pub fn upsert(&self, definition: FormulaDefinition) -> Result<bool> {
        let mut definitions = self.read_all()?;
        let existing = definitions
            .iter_mut()
            .find(|d| d.key() == definition.key());

        let replaced = match existing {
            Some(slot) => {
                *slot = definition;
                true
            }
            None => {
                definitions.push(definition);
                false
            }
        };

        self.write_sorted(definitions)?;
        Ok(replaced)
    }

    /// Removes the definition for (collection, field)
    pub fn remove(&self, collection: &str, field: &str) -> Result<bool> {
        let mut definitions = self.read_all()?;
        let before = definitions.len();
        definitions.retain(|d| d.key() != (collection, field));

        let removed = definitions.len() != before;
        if removed {
            self.write_sorted(definitions)?;
        }
        Ok(removed)
    }

    /// Definitions of one collection
    pub fn for_collection(&self, collection: &str) -> Result<Vec<FormulaDefinition>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|d| d.collection == collection)
            .collect())
    }

    fn write_sorted(&self, mut definitions: Vec<FormulaDefinition>) -> Result<()> {
        // Sort by identity for stable diffs
        definitions.sort_by(|a, b| a.key().cmp(&b.key()));
        self.file.write_all(&definitions)
    }
}

impl FormulaSource for FormulaStore {
    fn load_definitions(&self) -> Result<Vec<FormulaDefinition>> {
        self.read_all()
    }
}
