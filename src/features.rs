//! Joining, imputing, encoding and normalizing the enriched transaction frame.
//!
//! Each step is split into a `fit` that captures the statistics it needs
//! and a `transform` that only applies them, so a frame scored later goes
//! through exactly the transforms fitted on the training data.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::aggregates::{AGGREGATE_COLUMNS, CUSTOMER_ID, TRANSACTION_COUNT};
use crate::config::DegeneratePolicy;
use crate::error::{PipelineError, Result};
use crate::frame::{column_keys, column_names, numeric_column_names, relocate_last};

/// Nominal fields expanded to indicator columns.
pub const ONE_HOT_COLUMNS: [&str; 3] = ["ProductCategory", "ChannelId", "CurrencyCode"];
/// Fields replaced by integer codes in first-seen order.
pub const LABEL_COLUMNS: [&str; 3] = ["ProviderId", "PricingStrategy", "CountryCode"];

const ROW_INDEX: &str = "__row";

// Left join of the per-customer aggregates onto every transaction, in the
// input row order. A transaction whose customer has no aggregate is a
// MergeConsistency error.
pub fn merge_aggregate_and_time_features(df: &DataFrame, aggregates: &DataFrame) -> Result<DataFrame> {
    let mut keep = vec![col(CUSTOMER_ID)];
    keep.extend(AGGREGATE_COLUMNS.iter().map(|name| col(*name)));

    let mut merged = df
        .clone()
        .lazy()
        .with_row_index(ROW_INDEX, None)
        .left_join(aggregates.clone().lazy().select(keep), col(CUSTOMER_ID), col(CUSTOMER_ID))
        .collect()?
        .sort([ROW_INDEX], SortMultipleOptions::default())?;
    merged.drop_in_place(ROW_INDEX)?;

    let unmatched = merged
        .column(TRANSACTION_COUNT)?
        .f64()?
        .into_iter()
        .position(|count| count.is_none());
    if let Some(row) = unmatched {
        let customer_id = column_keys(merged.column(CUSTOMER_ID)?)?
            .swap_remove(row)
            .unwrap_or_default();
        return Err(PipelineError::MergeConsistency { customer_id });
    }
    Ok(merged)
}

/// Move the target column to the end of the frame.
pub fn reorder_columns(df: &DataFrame, target: &str) -> Result<DataFrame> {
    relocate_last(df, target)
}

// Smallest of the most frequent values of a column.
fn mode(column: &Column) -> Result<Option<String>> {
    let keys = Column::new(column.name().clone(), column_keys(column)?);
    let modes = DataFrame::new(vec![keys])?
        .lazy()
        .select([col(column.name().clone())
            .drop_nulls()
            .mode()
            .sort(SortOptions::default())
            .first()])
        .collect()?;
    let first = modes.get_columns()[0].str()?.get(0).map(str::to_owned);
    Ok(first)
}

/// Median / mode imputation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Imputer {
    pub medians: BTreeMap<String, f64>,
    pub modes: BTreeMap<String, String>,
}

impl Imputer {
    pub fn fit(df: &DataFrame) -> Result<Self> {
        let mut imputer = Imputer::default();
        for column in df.get_columns() {
            let name = column.name().to_string();
            match column.dtype() {
                DataType::Float64 => {
                    if let Some(m) = column.f64()?.median() {
                        imputer.medians.insert(name, m);
                    }
                }
                DataType::String => {
                    if let Some(m) = mode(column)? {
                        imputer.modes.insert(name, m);
                    }
                }
                _ => {}
            }
        }
        Ok(imputer)
    }

    // Columns with no fitted statistic (all missing at fit time) are left
    // as they are.
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut fills = Vec::new();
        for column in df.get_columns() {
            let missing = column.null_count();
            if missing == 0 {
                continue;
            }
            let name = column.name().as_str();
            match column.dtype() {
                DataType::Float64 => {
                    if let Some(m) = self.medians.get(name) {
                        debug!("Imputing {} missing values in {} with median {}", missing, name, m);
                        fills.push(col(name).fill_null(lit(*m)));
                    }
                }
                DataType::String => {
                    if let Some(m) = self.modes.get(name) {
                        debug!("Imputing {} missing values in {} with mode {}", missing, name, m);
                        fills.push(col(name).fill_null(lit(m.clone())));
                    }
                }
                _ => {}
            }
        }
        if fills.is_empty() {
            return Ok(df.clone());
        }
        Ok(df.clone().lazy().with_columns(fills).collect()?)
    }
}

pub fn handle_missing_values(df: &DataFrame) -> Result<DataFrame> {
    Imputer::fit(df)?.transform(df)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotColumn {
    pub column: String,
    /// Categories that get an indicator column; the first sorted category
    /// is dropped and is implied by all indicators being 0.
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelColumn {
    pub column: String,
    /// Classes in first-seen order; a class's code is its index.
    pub classes: Vec<String>,
    /// Code used for values not seen at fit time.
    pub fallback: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    pub one_hot: Vec<OneHotColumn>,
    pub label: Vec<LabelColumn>,
}

impl CategoricalEncoder {
    pub fn fit(df: &DataFrame) -> Result<Self> {
        let mut encoder = CategoricalEncoder::default();

        for name in ONE_HOT_COLUMNS {
            let Ok(column) = df.column(name) else { continue };
            let categories: BTreeSet<String> = column_keys(column)?.into_iter().flatten().collect();
            encoder.one_hot.push(OneHotColumn {
                column: name.to_string(),
                categories: categories.into_iter().skip(1).collect(),
            });
        }

        for name in LABEL_COLUMNS {
            let Ok(column) = df.column(name) else { continue };
            let mut classes: Vec<String> = Vec::new();
            for key in column_keys(column)?.into_iter().flatten() {
                if !classes.contains(&key) {
                    classes.push(key);
                }
            }
            let fallback = mode(column)?
                .and_then(|m| classes.iter().position(|c| *c == m))
                .unwrap_or(0);
            encoder.label.push(LabelColumn {
                column: name.to_string(),
                classes,
                fallback,
            });
        }

        Ok(encoder)
    }

    // One-hot columns are replaced in place by `<Column>_<category>`
    // indicators; label columns are replaced by numeric codes.
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut out = df.clone();

        for encoding in &self.label {
            let Ok(column) = df.column(&encoding.column) else { continue };
            let codes: Vec<Option<f64>> = column_keys(column)?
                .into_iter()
                .map(|key| {
                    key.map(|key| {
                        encoding
                            .classes
                            .iter()
                            .position(|c| *c == key)
                            .unwrap_or(encoding.fallback) as f64
                    })
                })
                .collect();
            out.with_column(Series::new(encoding.column.as_str().into(), codes))?;
        }

        for encoding in &self.one_hot {
            let Ok(column) = out.column(&encoding.column) else { continue };
            let keys = column_keys(column)?;
            let indicators: Vec<String> = encoding
                .categories
                .iter()
                .map(|category| format!("{}_{}", encoding.column, category))
                .collect();

            let mut order = Vec::with_capacity(out.width() + indicators.len());
            for name in column_names(&out) {
                if name == encoding.column {
                    order.extend(indicators.iter().cloned());
                } else {
                    order.push(name);
                }
            }
            for (category, name) in encoding.categories.iter().zip(&indicators) {
                let hits: Vec<f64> = keys
                    .iter()
                    .map(|key| if key.as_deref() == Some(category.as_str()) { 1.0 } else { 0.0 })
                    .collect();
                out.with_column(Series::new(name.as_str().into(), hits))?;
            }
            out = out.select(order.iter().map(String::as_str))?;
        }

        Ok(out)
    }
}

pub fn encode_features(df: &DataFrame) -> Result<DataFrame> {
    CategoricalEncoder::fit(df)?.transform(df)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnRange {
    pub min: f64,
    pub max: f64,
}

impl ColumnRange {
    pub fn is_degenerate(&self) -> bool {
        self.max - self.min == 0.0
    }
}

/// Min-max scaler over a fixed set of numeric columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub ranges: BTreeMap<String, ColumnRange>,
    pub policy: DegeneratePolicy,
}

impl MinMaxScaler {
    /// Fit on every numeric column of the frame.
    pub fn fit(df: &DataFrame, policy: DegeneratePolicy) -> Result<Self> {
        let names = numeric_column_names(df);
        Self::fit_columns(df, names.as_slice(), policy)
    }

    pub fn fit_columns<S: AsRef<str>>(df: &DataFrame, columns: &[S], policy: DegeneratePolicy) -> Result<Self> {
        let mut ranges = BTreeMap::new();
        for name in columns {
            let name = name.as_ref();
            let values = df.column(name)?.f64()?;
            let (Some(min), Some(max)) = (values.min(), values.max()) else {
                debug!("Column {} has no values, not scaled", name);
                continue;
            };
            let range = ColumnRange { min, max };
            if range.is_degenerate() {
                if policy == DegeneratePolicy::Fail {
                    return Err(PipelineError::DegenerateColumn {
                        column: name.to_string(),
                    });
                }
                warn!("Column {} is constant ({}), applying {:?}", name, min, policy);
            }
            ranges.insert(name.to_string(), range);
        }
        Ok(MinMaxScaler { ranges, policy })
    }

    // Fitted columns absent from the frame are skipped (scored data has
    // no target column). Values outside the fitted range are not clipped.
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut scaled = Vec::with_capacity(self.ranges.len());
        for (name, range) in &self.ranges {
            if df.get_column_index(name).is_none() {
                debug!("Scaled column {} not present, skipping", name);
                continue;
            }
            let name = name.as_str();
            if !range.is_degenerate() {
                scaled.push(((col(name) - lit(range.min)) / lit(range.max - range.min)).alias(name));
                continue;
            }
            match self.policy {
                // Multiplying by zero keeps missing cells missing.
                DegeneratePolicy::Constant(c) => scaled.push((col(name) * lit(0.0) + lit(c)).alias(name)),
                DegeneratePolicy::Skip => {}
                DegeneratePolicy::Fail => {
                    return Err(PipelineError::DegenerateColumn {
                        column: name.to_string(),
                    })
                }
            }
        }
        if scaled.is_empty() {
            return Ok(df.clone());
        }
        Ok(df.clone().lazy().with_columns(scaled).collect()?)
    }
}

pub fn normalize_features(df: &DataFrame, policy: DegeneratePolicy) -> Result<DataFrame> {
    MinMaxScaler::fit(df, policy)?.transform(df)
}

/// Imputation, encoding and scaling fitted together on one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTransformer {
    pub imputer: Imputer,
    pub encoder: CategoricalEncoder,
    pub scaler: MinMaxScaler,
}

impl FeatureTransformer {
    pub fn fit_transform(df: &DataFrame, policy: DegeneratePolicy) -> Result<(Self, DataFrame)> {
        let imputer = Imputer::fit(df)?;
        let imputed = imputer.transform(df)?;
        let encoder = CategoricalEncoder::fit(&imputed)?;
        let encoded = encoder.transform(&imputed)?;
        let scaler = MinMaxScaler::fit(&encoded, policy)?;
        let scaled = scaler.transform(&encoded)?;
        debug!(
            "Fitted feature transformer: {} medians, {} modes, {} scaled columns",
            imputer.medians.len(),
            imputer.modes.len(),
            scaler.ranges.len()
        );
        Ok((
            FeatureTransformer {
                imputer,
                encoder,
                scaler,
            },
            scaled,
        ))
    }

    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let imputed = self.imputer.transform(df)?;
        let encoded = self.encoder.transform(&imputed)?;
        self.scaler.transform(&encoded)
    }
}
