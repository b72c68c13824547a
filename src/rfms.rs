//! RFMS scoring, risk labeling and score banding.
//!
//! Recency is the customer's latest `Transaction_Year`, Frequency the
//! transaction count, Monetary the total amount and Stability the amount
//! standard deviation. All four depend only on the customer, so customers
//! with the same aggregate behavior get the same score whatever the row
//! order.

use log::{debug, info};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::aggregates::{CUSTOMER_ID, STD_DEVIATION_TRANSACTION_AMOUNT, TOTAL_TRANSACTION_AMOUNT, TRANSACTION_COUNT};
use crate::config::{DegeneratePolicy, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::features::MinMaxScaler;
use crate::frame::{dense_f64, f64_values, relocate_last};
use crate::time_features::TRANSACTION_YEAR;
use crate::woe::{apply_woe_binning, WoeTable};

pub const RECENCY: &str = "Recency";
pub const FREQUENCY: &str = "Frequency";
pub const MONETARY: &str = "Monetary";
pub const STABILITY: &str = "Stability";
pub const RFMS_COMPONENTS: [&str; 4] = [RECENCY, FREQUENCY, MONETARY, STABILITY];
pub const RFMS_SCORE: &str = "RFMS_Score";
pub const RISK_LABEL: &str = "Risk_Label";
pub const RFMS_BINNED: &str = "RFMS_Binned";

// Tolerance added to a score before it is compared with the bin edges,
// so a score sitting on an edge up to rounding lands in the upper band.
const BIN_RTOL: f64 = 1e-5;
const BIN_ATOL: f64 = 1e-8;

// Appends the un-normalized components. Recency takes the max year over
// all rows of the customer.
fn raw_components(df: &DataFrame) -> Result<DataFrame> {
    Ok(df
        .clone()
        .lazy()
        .with_columns([
            col(TRANSACTION_YEAR).max().over([col(CUSTOMER_ID)]).alias(RECENCY),
            col(TRANSACTION_COUNT).alias(FREQUENCY),
            col(TOTAL_TRANSACTION_AMOUNT).alias(MONETARY),
            col(STD_DEVIATION_TRANSACTION_AMOUNT).alias(STABILITY),
        ])
        .collect()?)
}

// A component's contribution must stay inside [0, 1]: a constant
// replacement is clamped, and a skipped constant component is left out of
// the score instead of entering it unscaled.
fn component_policy(policy: DegeneratePolicy) -> DegeneratePolicy {
    match policy {
        DegeneratePolicy::Constant(c) => DegeneratePolicy::Constant(c.clamp(0.0, 1.0)),
        other => other,
    }
}

fn scale_components(raw: &DataFrame, scaler: &MinMaxScaler) -> Result<DataFrame> {
    let mut scaled = scaler.transform(raw)?;
    if scaler.policy != DegeneratePolicy::Skip {
        return Ok(scaled);
    }
    for name in RFMS_COMPONENTS {
        if scaler.ranges.get(name).is_some_and(|range| range.is_degenerate()) {
            debug!("{} is constant, left out of {}", name, RFMS_SCORE);
            scaled.with_column(Series::full_null(name.into(), scaled.height(), &DataType::Float64))?;
        }
    }
    Ok(scaled)
}

// Mean of the components present on each row. A row with none present
// has no score.
fn append_score(df: &DataFrame) -> Result<DataFrame> {
    let components = RFMS_COMPONENTS
        .iter()
        .map(|name| f64_values(df, name))
        .collect::<Result<Vec<_>>>()?;

    let scores = (0..df.height())
        .map(|row| {
            let present: Vec<f64> = components.iter().filter_map(|c| c[row]).collect();
            if present.is_empty() {
                return Err(PipelineError::MissingValue {
                    column: RFMS_SCORE.to_string(),
                    row,
                });
            }
            Ok(present.iter().sum::<f64>() / present.len() as f64)
        })
        .collect::<Result<Vec<f64>>>()?;

    let mut out = df.clone();
    out.with_column(Series::new(RFMS_SCORE.into(), scores))?;
    Ok(out)
}

/// Appends `Recency`, `Frequency`, `Monetary`, `Stability` (min-max
/// normalized over this frame) and `RFMS_Score`. Returns the fitted
/// component scaler alongside the frame.
pub fn calculate_rfms_components(df: &DataFrame, policy: DegeneratePolicy) -> Result<(DataFrame, MinMaxScaler)> {
    let raw = raw_components(df)?;
    let scaler = MinMaxScaler::fit_columns(&raw, &RFMS_COMPONENTS[..], component_policy(policy))?;
    let scored = append_score(&scale_components(&raw, &scaler)?)?;
    Ok((scored, scaler))
}

/// Same column delta as [`calculate_rfms_components`], using ranges fitted
/// on another frame.
pub fn apply_rfms_components(df: &DataFrame, scaler: &MinMaxScaler) -> Result<DataFrame> {
    let raw = raw_components(df)?;
    append_score(&scale_components(&raw, scaler)?)
}

/// 1 ("low risk") when the score is strictly above the threshold.
pub fn risk_label(score: f64, threshold: f64) -> u8 {
    if score > threshold {
        1
    } else {
        0
    }
}

/// Appends `Risk_Label` as the last column.
pub fn apply_risk_label(df: &DataFrame, threshold: f64) -> Result<DataFrame> {
    let labels: Vec<f64> = dense_f64(df, RFMS_SCORE)?
        .into_iter()
        .map(|score| risk_label(score, threshold) as f64)
        .collect();
    let mut out = df.clone();
    out.with_column(Series::new(RISK_LABEL.into(), labels))?;
    relocate_last(&out, RISK_LABEL)
}

/// Equal-width bin edges over the observed score range.
///
/// Edges depend on the data they were fitted on; persist them to band
/// scores from another dataset the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinEdges {
    pub edges: Vec<f64>,
}

impl BinEdges {
    // A constant column collapses to a single band. Without finite values
    // the nominal [0, 1] score range is used.
    pub fn fit(values: &[f64], n_bins: usize) -> Self {
        let n_bins = n_bins.max(1);
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let (min, max) = if finite.is_empty() {
            (0.0, 1.0)
        } else {
            finite.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            })
        };
        if max - min == 0.0 {
            return BinEdges { edges: vec![min, max] };
        }
        let edges = (0..=n_bins)
            .map(|i| min + (max - min) * i as f64 / n_bins as f64)
            .collect();
        BinEdges { edges }
    }

    pub fn n_bins(&self) -> usize {
        self.edges.len().saturating_sub(1).max(1)
    }

    /// Number of interior edges at or below `value` (plus a small
    /// tolerance), clipped to the last band.
    pub fn bin(&self, value: f64) -> usize {
        let interior = if self.edges.len() > 2 {
            &self.edges[1..self.edges.len() - 1]
        } else {
            &[][..]
        };
        let shifted = value + BIN_ATOL + BIN_RTOL * value.abs();
        interior
            .iter()
            .filter(|edge| **edge <= shifted)
            .count()
            .min(self.n_bins() - 1)
    }

    /// Appends `RFMS_Binned`.
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let bins: Vec<f64> = dense_f64(df, RFMS_SCORE)?
            .into_iter()
            .map(|score| self.bin(score) as f64)
            .collect();
        let mut out = df.clone();
        out.with_column(Series::new(RFMS_BINNED.into(), bins))?;
        Ok(out)
    }
}

pub fn bin_rfms_score(df: &DataFrame, n_bins: usize) -> Result<(DataFrame, BinEdges)> {
    let edges = BinEdges::fit(&dense_f64(df, RFMS_SCORE)?, n_bins);
    debug!("RFMS bin edges: {:?}", edges.edges);
    Ok((edges.transform(df)?, edges))
}

/// Everything fitted by [`process_rfms_binning`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfmsModel {
    pub scaler: MinMaxScaler,
    pub threshold: f64,
    pub edges: BinEdges,
}

impl RfmsModel {
    /// Score, label and band a new frame without refitting.
    pub fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let scored = apply_rfms_components(df, &self.scaler)?;
        let labeled = apply_risk_label(&scored, self.threshold)?;
        relocate_last(&self.edges.transform(&labeled)?, RISK_LABEL)
    }
}

#[derive(Debug, Clone)]
pub struct RfmsOutput {
    pub frame: DataFrame,
    pub woe: WoeTable,
    pub model: RfmsModel,
}

// Components -> score -> label -> bands -> WoE.
// Inputs: enriched frame and the pipeline config
// Outputs: labeled frame (Risk_Label last), WoE table, fitted state
pub fn process_rfms_binning(df: &DataFrame, config: &PipelineConfig) -> Result<RfmsOutput> {
    let (scored, scaler) = calculate_rfms_components(df, config.degenerate_policy)?;
    let labeled = apply_risk_label(&scored, config.risk_threshold)?;
    let (binned, edges) = bin_rfms_score(&labeled, config.n_bins)?;
    let binned = relocate_last(&binned, RISK_LABEL)?;
    let woe = apply_woe_binning(&binned, RFMS_BINNED, RISK_LABEL)?;

    let low_risk = dense_f64(&binned, RISK_LABEL)?
        .iter()
        .filter(|l| **l == 1.0)
        .count();
    info!(
        "RFMS labeling: {} rows, {} low risk, {} high risk, {} bands populated",
        binned.height(),
        low_risk,
        binned.height() - low_risk,
        woe.len()
    );

    Ok(RfmsOutput {
        frame: binned,
        woe,
        model: RfmsModel {
            scaler,
            threshold: config.risk_threshold,
            edges,
        },
    })
}
