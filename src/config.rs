//! Pipeline configuration.
//!
//! Every policy constant of the labeling pipeline lives here with its
//! default, and the whole struct can be overridden from a JSON file.

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub const DEFAULT_RISK_THRESHOLD: f64 = 0.5;
pub const DEFAULT_N_BINS: usize = 5;
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_SEED: u64 = 42;

/// What min-max normalization does with a column whose max equals its min.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Replace every present value with the constant.
    Constant(f64),
    /// Leave the column untouched.
    Skip,
    /// Return `PipelineError::DegenerateColumn`.
    Fail,
}

impl Default for DegeneratePolicy {
    fn default() -> Self {
        DegeneratePolicy::Constant(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Scores strictly above this get `Risk_Label = 1`.
    pub risk_threshold: f64,
    pub n_bins: usize,
    pub test_fraction: f64,
    pub seed: u64,
    pub degenerate_policy: DegeneratePolicy,
    pub output_dir: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            risk_threshold: DEFAULT_RISK_THRESHOLD,
            n_bins: DEFAULT_N_BINS,
            test_fraction: DEFAULT_TEST_FRACTION,
            seed: DEFAULT_SEED,
            degenerate_policy: DegeneratePolicy::default(),
            output_dir: "output".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load a config from a JSON file. Fields absent from the file keep
    /// their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        info!("Loaded pipeline config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_bins == 0 {
            return Err(PipelineError::Config("n_bins must be at least 1".into()));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(PipelineError::Config(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if !self.risk_threshold.is_finite() {
            return Err(PipelineError::Config("risk_threshold must be finite".into()));
        }
        Ok(())
    }
}
