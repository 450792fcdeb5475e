use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("column {column} is not {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
    },

    #[error("null value in required column {column} at row {row}")]
    NullValue { column: String, row: usize },

    #[error("unknown payload: {0}")]
    UnknownPayload(String),

    #[error("payload {name} is {actual} bytes, descriptor says {expected}")]
    PayloadSize {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("history file not found: {0}")]
    HistoryNotFound(PathBuf),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] notescore_core::CoreError),
}
