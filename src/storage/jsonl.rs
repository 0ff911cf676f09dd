//! Locked JSONL files
//!
//! One JSON value per line. Reads take a shared lock, rewrites go through
//! an exclusively locked temp file and an atomic rename.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A JSONL file holding values of one kind
#[derive(Debug, Clone)]
pub struct JsonlFile {
    path: PathBuf,
    /// What a line holds, for error messages ("formula", "record")
    kind: &'static str,
}

impl JsonlFile {
    pub fn new(path: impl Into<PathBuf>, kind: &'static str) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every line; a missing file reads as empty
    pub fn read_all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open {} store: {}", self.kind, self.path.display()))?;

        file.lock_shared()
            .with_context(|| format!("Failed to acquire read lock on {} store", self.kind))?;

        let reader = BufReader::new(&file);
        let mut items = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read line {}", line_num + 1))?;

            if line.trim().is_empty() {
                continue;
            }

            let item: T = serde_json::from_str(&line).with_context(|| {
                format!(
                    "Failed to parse {} at line {} of {}",
                    self.kind,
                    line_num + 1,
                    self.path.display()
                )
            })?;
            items.push(item);
        }

        // Lock is released when file is dropped
        Ok(items)
    }

    /// Replaces the file content with `items`
    pub fn write_all<T: Serialize>(&self, items: &[T]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let temp_path = self.path.with_extension("jsonl.tmp");

        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

            file.lock_exclusive()
                .with_context(|| format!("Failed to acquire write lock on {} store", self.kind))?;

            let mut writer = BufWriter::new(&file);
            for item in items {
                let line = serde_json::to_string(item)
                    .with_context(|| format!("Failed to serialize {}", self.kind))?;
                writeln!(writer, "{}", line).with_context(|| format!("Failed to write {}", self.kind))?;
            }

            writer
                .flush()
                .with_context(|| format!("Failed to flush {} store", self.kind))?;
        }

        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        Ok(())
    }
}
