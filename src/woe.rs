//! Weight of Evidence per band of a discretized feature.

use std::fs::File;
use std::path::Path;

use log::{info, warn};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::frame::dense_f64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WoeRow {
    pub bin: i64,
    pub count: usize,
    /// Sum of the target over the band.
    pub sum: usize,
    /// Rows with target 1, equal to `sum`.
    pub good: usize,
    pub bad: usize,
    pub woe: f64,
    /// Set when good or bad is zero and `woe` was forced to 0.
    pub low_confidence: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WoeTable {
    pub feature: String,
    pub target: String,
    pub rows: Vec<WoeRow>,
}

impl WoeTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, bin: i64) -> Option<&WoeRow> {
        self.rows.iter().find(|r| r.bin == bin)
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut wtr = csv::Writer::from_writer(File::create(path)?);
        for row in &self.rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        info!("Wrote WoE table ({} bins) to {}", self.rows.len(), path.display());
        Ok(())
    }
}

/// ln(good / bad), with the one-class singularities mapped to 0.
pub fn weight_of_evidence(good: usize, bad: usize) -> (f64, bool) {
    if good == 0 || bad == 0 {
        (0.0, true)
    } else {
        ((good as f64 / bad as f64).ln(), false)
    }
}

// Groups rows by the integral values of `feature`, counting rows and
// summing the 0/1 target in each group. Good is the sum, bad the rest.
// Inputs: frame with a numeric banded feature and a 0/1 numeric target
// Outputs: one WoeRow per distinct band, ordered by band
pub fn calculate_woe(df: &DataFrame, feature: &str, target: &str) -> Result<WoeTable> {
    if dense_f64(df, feature)?.iter().any(|b| !b.is_finite() || b.fract() != 0.0) {
        return Err(PipelineError::ColumnType {
            column: feature.to_string(),
            expected: "integral",
        });
    }
    if dense_f64(df, target)?.iter().any(|l| *l != 0.0 && *l != 1.0) {
        return Err(PipelineError::ColumnType {
            column: target.to_string(),
            expected: "0/1",
        });
    }

    let grouped = df
        .clone()
        .lazy()
        .group_by([col(feature)])
        .agg([
            col(target).len().cast(DataType::Float64).alias("count"),
            col(target).sum().alias("sum"),
        ])
        .sort([feature], SortMultipleOptions::default())
        .collect()?;

    let bins = dense_f64(&grouped, feature)?;
    let counts = dense_f64(&grouped, "count")?;
    let sums = dense_f64(&grouped, "sum")?;

    let rows = bins
        .iter()
        .zip(counts.iter().zip(sums.iter()))
        .map(|(bin, (count, sum))| {
            let bin = *bin as i64;
            let (count, sum) = (*count as usize, *sum as usize);
            let (good, bad) = (sum, count - sum);
            let (woe, low_confidence) = weight_of_evidence(good, bad);
            if low_confidence {
                warn!(
                    "Bin {} of {} has good={} bad={}, WoE set to 0 (low confidence)",
                    bin, feature, good, bad
                );
            }
            WoeRow {
                bin,
                count,
                sum,
                good,
                bad,
                woe,
                low_confidence,
            }
        })
        .collect();

    Ok(WoeTable {
        feature: feature.to_string(),
        target: target.to_string(),
        rows,
    })
}

pub fn apply_woe_binning(df: &DataFrame, feature: &str, target: &str) -> Result<WoeTable> {
    calculate_woe(df, feature, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn table(bins: &[f64], labels: &[f64]) -> DataFrame {
        df!("RFMS_Binned" => bins, "Risk_Label" => labels).unwrap()
    }

    #[test]
    fn test_three_row_woe() {
        let woe = calculate_woe(&table(&[0.0, 0.0, 1.0], &[1.0, 0.0, 1.0]), "RFMS_Binned", "Risk_Label").unwrap();
        assert_eq!(woe.len(), 2);

        let bin0 = woe.get(0).unwrap();
        assert_eq!((bin0.count, bin0.sum, bin0.good, bin0.bad), (2, 1, 1, 1));
        assert_abs_diff_eq!(bin0.woe, 0.0, epsilon = 1e-12);
        assert!(!bin0.low_confidence);

        let bin1 = woe.get(1).unwrap();
        assert_eq!((bin1.count, bin1.sum, bin1.good, bin1.bad), (1, 1, 1, 0));
        assert_eq!(bin1.woe, 0.0);
        assert!(bin1.low_confidence);
    }

    #[test]
    fn test_finite_woe_value() {
        let woe = calculate_woe(
            &table(&[2.0, 2.0, 2.0, 2.0], &[1.0, 1.0, 1.0, 0.0]),
            "RFMS_Binned",
            "Risk_Label",
        )
        .unwrap();
        assert_abs_diff_eq!(woe.get(2).unwrap().woe, 3f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_all_bad_bin_is_flagged() {
        assert_eq!(weight_of_evidence(0, 4), (0.0, true));
        assert_eq!(weight_of_evidence(4, 0), (0.0, true));
    }

    #[test]
    fn test_bands_ordered_and_csv_has_sum() {
        let woe = calculate_woe(
            &table(&[3.0, 1.0, 3.0, 1.0, 1.0], &[0.0, 1.0, 1.0, 0.0, 1.0]),
            "RFMS_Binned",
            "Risk_Label",
        )
        .unwrap();
        let bins: Vec<i64> = woe.rows.iter().map(|r| r.bin).collect();
        assert_eq!(bins, vec![1, 3]);
        assert_eq!((woe.rows[0].sum, woe.rows[0].bad), (2, 1));

        let path = std::env::temp_dir().join(format!("woe_{}.csv", std::process::id()));
        woe.write_csv(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(written.starts_with("bin,count,sum,good,bad,woe,low_confidence"));
        assert_eq!(written.lines().count(), 3);
    }

    #[test]
    fn test_non_integral_band_rejected() {
        let result = calculate_woe(&table(&[0.5], &[1.0]), "RFMS_Binned", "Risk_Label");
        assert!(matches!(result, Err(PipelineError::ColumnType { .. })));
    }

    #[test]
    fn test_non_binary_target_rejected() {
        let result = calculate_woe(&table(&[0.0], &[0.7]), "RFMS_Binned", "Risk_Label");
        assert!(matches!(
            result,
            Err(PipelineError::ColumnType { expected: "0/1", .. })
        ));
    }
}
