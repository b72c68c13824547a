//! RFMS credit risk labeling for transaction logs.
//!
//! Raw transactions are enriched with time fields and per-customer
//! aggregates, imputed, encoded and normalized, then scored on Recency,
//! Frequency, Monetary and Stability. The score is thresholded into
//! `Risk_Label`, banded into `RFMS_Binned` and summarised as a Weight of
//! Evidence table.

pub mod aggregates;
pub mod config;
pub mod csv_reader;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod frame;
pub mod model;
pub mod rfms;
pub mod scoring;
pub mod split;
pub mod time_features;
pub mod woe;

pub use error::{PipelineError, Result};
