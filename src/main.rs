// Entry point for RFMS credit risk labeling. Loads transactions, builds the
// labeled feature frame and WoE table, and trains baseline classifiers.
use std::error::Error;
use std::fs;
use std::path::Path;

use credit_risk::aggregates::create_aggregate_features;
use credit_risk::config::PipelineConfig;
use credit_risk::csv_reader::{read_transactions, transactions_to_frame};
use credit_risk::error::Result as PipelineResult;
use credit_risk::frame::{describe, write_csv};
use credit_risk::model::{
    train_and_evaluate_decision_tree, train_and_evaluate_logistic_regression, train_and_evaluate_random_forest,
    ModelReport,
};
use credit_risk::scoring::ScoringPipeline;
use credit_risk::split::{split_data, HoldoutSplit};
use log::{info, warn};
use polars::prelude::DataFrame;

const DEFAULT_CSV_FILE_PATH: &str = "data/data.csv";
const FEATURES_FILE: &str = "features.csv";
const WOE_FILE: &str = "woe.csv";
const CUSTOMERS_FILE: &str = "customers.csv";
const PIPELINE_STATE_FILE: &str = "pipeline.json";

// Logs the shape, first rows, missing counts and numeric ranges of the raw frame
fn dataset_overview(df: &DataFrame) -> PipelineResult<()> {
    info!("Dataset: {} rows x {} columns", df.height(), df.width());
    info!("First rows:\n{}", df.head(Some(5)));
    info!("Column summary:\n{}", describe(df)?);
    Ok(())
}

// Prints train and test metrics for one classifier
fn print_model_report(report: &ModelReport) {
    println!("\n{}", report.name);
    for (split, metrics) in [("Train", &report.train), ("Test", &report.test)] {
        println!(
            "  {:<5} accuracy={:.4} precision={:.4} recall={:.4} f1={:.4} roc_auc={:.4}",
            split, metrics.accuracy, metrics.precision, metrics.recall, metrics.f1, metrics.roc_auc
        );
        println!("        confusion={:?}", metrics.confusion_matrix);
    }
}

// Main entry point for the credit risk pipeline
// Inputs: optional CSV path and optional JSON config path as arguments
// Outputs: Result indicating success or error
// Key steps:
// 1. Load transaction data and config
// 2. Fit the labeling pipeline
// 3. Write feature frame, WoE table and fitted state
// 4. Split and train baseline classifiers
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let data_path = args.get(1).map(String::as_str).unwrap_or(DEFAULT_CSV_FILE_PATH);
    let config = match args.get(2) {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };

    // Load and validate transaction data
    let transactions = read_transactions(data_path)?;
    if transactions.is_empty() {
        warn!("No transactions in {}", data_path);
        return Ok(());
    }
    let raw = transactions_to_frame(&transactions)?;
    dataset_overview(&raw)?;

    // Fit aggregation, encoding, normalization, RFMS labeling and WoE
    let (pipeline, output) = ScoringPipeline::fit(&transactions, &config)?;

    let out_dir = Path::new(&config.output_dir);
    fs::create_dir_all(out_dir)?;
    write_csv(&output.features, out_dir.join(FEATURES_FILE))?;
    output.woe.write_csv(out_dir.join(WOE_FILE))?;
    write_csv(&create_aggregate_features(&raw)?, out_dir.join(CUSTOMERS_FILE))?;
    pipeline.save(out_dir.join(PIPELINE_STATE_FILE))?;

    println!("WoE by RFMS band:");
    for row in &output.woe.rows {
        println!(
            "  bin {} count={} sum={} good={} bad={} woe={:.4}{}",
            row.bin,
            row.count,
            row.sum,
            row.good,
            row.bad,
            row.woe,
            if row.low_confidence { " (low confidence)" } else { "" }
        );
    }

    // Train baseline classifiers on the stratified holdout split
    let split = split_data(&output.features, config.test_fraction, config.seed)?;
    let trainers: [fn(&HoldoutSplit) -> PipelineResult<ModelReport>; 3] = [
        train_and_evaluate_logistic_regression,
        train_and_evaluate_random_forest,
        train_and_evaluate_decision_tree,
    ];
    for train in trainers {
        match train(&split) {
            Ok(report) => print_model_report(&report),
            Err(e) => warn!("Skipping model: {}", e),
        }
    }

    Ok(())
}
