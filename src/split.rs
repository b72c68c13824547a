use std::collections::BTreeMap;

use log::info;
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{PipelineError, Result};
use crate::frame::{dense_f64, numeric_column_names};
use crate::rfms::{RFMS_SCORE, RISK_LABEL};

// Identifier, outcome and score columns kept out of the feature matrix
pub const NON_FEATURE_COLUMNS: [&str; 12] = [
    "TransactionId",
    "BatchId",
    "AccountId",
    "SubscriptionId",
    "CustomerId",
    "CountryCode",
    "ProviderId",
    "ProductId",
    "FraudResult",
    "TransactionStartTime",
    RFMS_SCORE,
    RISK_LABEL,
];

#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub features: Array2<f64>,
    pub targets: Array1<usize>,
    pub feature_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HoldoutSplit {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<usize>,
    pub y_test: Array1<usize>,
    pub feature_names: Vec<String>,
}

// Every numeric column not listed in NON_FEATURE_COLUMNS becomes a feature.
// A missing cell anywhere in the matrix is a schema error.
pub fn feature_matrix(df: &DataFrame, target: &str) -> Result<FeatureMatrix> {
    let feature_names: Vec<String> = numeric_column_names(df)
        .into_iter()
        .filter(|name| name != target && !NON_FEATURE_COLUMNS.contains(&name.as_str()))
        .collect();

    let n_samples = df.height();
    let mut features = Array2::zeros((n_samples, feature_names.len()));
    for (j, name) in feature_names.iter().enumerate() {
        for (i, value) in dense_f64(df, name)?.into_iter().enumerate() {
            features[[i, j]] = value;
        }
    }

    let targets = dense_f64(df, target)?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            if v == 0.0 || v == 1.0 {
                Ok(v as usize)
            } else {
                Err(PipelineError::ColumnType {
                    column: format!("{} (row {})", target, row),
                    expected: "a 0/1 label",
                })
            }
        })
        .collect::<Result<Vec<usize>>>()?;

    Ok(FeatureMatrix {
        features,
        targets: Array1::from(targets),
        feature_names,
    })
}

/// Indices of the train and test rows, stratified by class.
///
/// Each class sends `round(n * test_fraction)` shuffled rows to the test
/// set, keeping at least one row on each side when the class has two or
/// more rows. Both index lists come back sorted.
pub fn stratified_indices(targets: &[usize], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, class) in targets.iter().enumerate() {
        by_class.entry(*class).or_default().push(i);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();
    for (_, mut rows) in by_class {
        rows.shuffle(&mut rng);
        let n = rows.len();
        let mut n_test = (n as f64 * test_fraction).round() as usize;
        if n >= 2 {
            n_test = n_test.clamp(1, n - 1);
        } else {
            n_test = 0;
        }
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

// Holdout split of the labeled frame with Risk_Label as the target.
pub fn split_data(df: &DataFrame, test_fraction: f64, seed: u64) -> Result<HoldoutSplit> {
    let matrix = feature_matrix(df, RISK_LABEL)?;
    let targets: Vec<usize> = matrix.targets.to_vec();
    let (train, test) = stratified_indices(&targets, test_fraction, seed);

    let split = HoldoutSplit {
        x_train: matrix.features.select(Axis(0), &train),
        x_test: matrix.features.select(Axis(0), &test),
        y_train: matrix.targets.select(Axis(0), &train),
        y_test: matrix.targets.select(Axis(0), &test),
        feature_names: matrix.feature_names,
    };
    info!("Training set size: {} samples", split.x_train.nrows());
    info!("Testing set size: {} samples", split.x_test.nrows());
    Ok(split)
}
