//! Error types for the credit risk pipeline

use polars::prelude::PolarsError;
use thiserror::Error;

/// Errors raised by the pipeline stages.
///
/// Only parse and schema violations reach the caller. Imputation and
/// encoding recover locally and never produce an error of their own.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Cannot parse timestamp {value:?} at row {row}")]
    Parse { row: usize, value: String },

    #[error("Column {column} has zero range and cannot be min-max normalized")]
    DegenerateColumn { column: String },

    #[error("No customer aggregate for customer {customer_id}")]
    MergeConsistency { customer_id: String },

    #[error("Column {column} is not {expected}")]
    ColumnType { column: String, expected: &'static str },

    #[error("Missing value in column {column} at row {row}")]
    MissingValue { column: String, row: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Data frame error: {0}")]
    Polars(#[from] PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<linfa::Error> for PipelineError {
    fn from(e: linfa::Error) -> Self {
        PipelineError::Model(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
