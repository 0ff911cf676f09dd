use thiserror::Error;

/// Failure of a collection-level engine operation
#[derive(Debug, Error)]
pub enum RecalcError {
    #[error("None of the requested fields ({}) match local formulas for collection {collection}.", requested.join(", "))]
    NoMatchingFields {
        collection: String,
        requested: Vec<String>,
    },

    #[error("Failed to read records of collection {collection}: {message}")]
    Read { collection: String, message: String },
}

impl RecalcError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RecalcError::NoMatchingFields { .. } => "no_matching_fields",
            RecalcError::Read { .. } => "read_failed",
        }
    }
}
