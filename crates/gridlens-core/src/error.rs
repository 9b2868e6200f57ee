//! Error types for Gridlens core.
//!
//! Only conditions that stop a whole operation live here. Damage inside a
//! workbook (bad merges, failing detectors, unavailable label recovery) is
//! recorded as a `Diagnostic` and the analysis carries on.

use thiserror::Error;

/// Errors that can occur while loading, analysing or diffing workbooks.
#[derive(Error, Debug)]
pub enum GridlensError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unreadable workbook: {0}")]
    Workbook(String),

    #[error("Workbook has no sheets")]
    NoSheets,

    #[error("Unsupported workbook format: {0}")]
    UnsupportedFormat(String),

    #[error("Sheet not found: {0}")]
    UnknownSheet(String),

    #[error("Invalid key column: {0}")]
    InvalidKeyColumn(String),

    #[error("At least one key column is required")]
    EmptyKeyColumns,

    #[error("Config error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GridlensError>;
