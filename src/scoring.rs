//! End-to-end fit of the labeling pipeline and reuse of its fitted state.

use std::fs;
use std::path::Path;

use log::info;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::aggregates::create_aggregate_features;
use crate::config::PipelineConfig;
use crate::csv_reader::{transactions_to_frame, Transaction, FRAUD_RESULT};
use crate::error::Result;
use crate::features::{merge_aggregate_and_time_features, reorder_columns, FeatureTransformer};
use crate::rfms::{process_rfms_binning, RfmsModel};
use crate::time_features::extract_transaction_time_features;
use crate::woe::WoeTable;

// Raw records -> time fields -> customer aggregates -> merged frame with
// FraudResult last. Nothing here is fitted.
pub fn engineer_features(transactions: &[Transaction]) -> Result<DataFrame> {
    let raw = transactions_to_frame(transactions)?;
    let aggregates = create_aggregate_features(&raw)?;
    let with_time = extract_transaction_time_features(&raw)?;
    let merged = merge_aggregate_and_time_features(&with_time, &aggregates)?;
    reorder_columns(&merged, FRAUD_RESULT)
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub features: DataFrame,
    pub woe: WoeTable,
}

/// Fitted state of the whole pipeline, serializable to JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringPipeline {
    pub config: PipelineConfig,
    pub transformer: FeatureTransformer,
    pub rfms: RfmsModel,
}

impl ScoringPipeline {
    pub fn fit(transactions: &[Transaction], config: &PipelineConfig) -> Result<(Self, PipelineOutput)> {
        config.validate()?;
        let engineered = engineer_features(transactions)?;
        info!(
            "Engineered {} rows x {} columns",
            engineered.height(),
            engineered.width()
        );

        let (transformer, normalized) = FeatureTransformer::fit_transform(&engineered, config.degenerate_policy)?;
        let rfms = process_rfms_binning(&normalized, config)?;

        let pipeline = ScoringPipeline {
            config: config.clone(),
            transformer,
            rfms: rfms.model,
        };
        Ok((
            pipeline,
            PipelineOutput {
                features: rfms.frame,
                woe: rfms.woe,
            },
        ))
    }

    /// Label new transactions with the statistics fitted at training time.
    /// Customer aggregates come from the given batch.
    pub fn score(&self, transactions: &[Transaction]) -> Result<DataFrame> {
        let engineered = engineer_features(transactions)?;
        let normalized = self.transformer.transform(&engineered)?;
        self.rfms.apply(&normalized)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Saved fitted pipeline state to {}", path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
