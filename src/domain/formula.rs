//! Formula definitions as persisted by the host platform
//!
//! The persisted field names (`collection_cible`, `champ_cible`, `formula`,
//! `status`, `sort`, `description`) are the external contract; Rust-side
//! names are free.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Publication status of a formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FormulaStatus {
    #[default]
    Published,
    Draft,
    Archived,
}

impl FormulaStatus {
    /// Only published formulas are loaded into the engine
    pub fn is_active(&self) -> bool {
        matches!(self, FormulaStatus::Published)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FormulaStatus::Published => "published",
            FormulaStatus::Draft => "draft",
            FormulaStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for FormulaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormulaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "published" => Ok(FormulaStatus::Published),
            "draft" => Ok(FormulaStatus::Draft),
            "archived" => Ok(FormulaStatus::Archived),
            other => Err(format!(
                "Invalid status '{}': expected published, draft or archived",
                other
            )),
        }
    }
}

/// Rows written by hand or by the host may carry explicit nulls
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A calculated-field definition. Identity is (collection, field).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaDefinition {
    /// Collection holding the calculated field
    #[serde(rename = "collection_cible", default, deserialize_with = "null_as_default")]
    pub collection: String,

    /// The calculated field
    #[serde(rename = "champ_cible", default, deserialize_with = "null_as_default")]
    pub field: String,

    /// Formula source text
    #[serde(rename = "formula", default, deserialize_with = "null_as_default")]
    pub formula: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub status: FormulaStatus,

    /// Suggested execution order within the collection
    #[serde(rename = "sort", default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FormulaDefinition {
    /// Creates a published definition
    pub fn new(
        collection: impl Into<String>,
        field: impl Into<String>,
        formula: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            field: field.into(),
            formula: formula.into(),
            status: FormulaStatus::Published,
            sort_order: None,
            description: None,
        }
    }

    /// Sets the sort order
    pub fn with_sort(mut self, sort: i64) -> Self {
        self.sort_order = Some(sort);
        self
    }

    /// Sets the status
    pub fn with_status(mut self, status: FormulaStatus) -> Self {
        self.status = status;
        self
    }

    /// Returns the (collection, field) identity
    pub fn key(&self) -> (&str, &str) {
        (&self.collection, &self.field)
    }

    /// Returns true when collection, field and formula text are all present
    pub fn is_complete(&self) -> bool {
        !self.collection.trim().is_empty()
            && !self.field.trim().is_empty()
            && !self.formula.trim().is_empty()
    }
}
