use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::frame::column_keys;

pub const CUSTOMER_ID: &str = "CustomerId";
pub const AMOUNT: &str = "Amount";
pub const TOTAL_TRANSACTION_AMOUNT: &str = "Total_Transaction_Amount";
pub const AVERAGE_TRANSACTION_AMOUNT: &str = "Average_Transaction_Amount";
pub const TRANSACTION_COUNT: &str = "Transaction_Count";
pub const STD_DEVIATION_TRANSACTION_AMOUNT: &str = "Std_Deviation_Transaction_Amount";

/// Columns appended to every transaction by the merge step.
pub const AGGREGATE_COLUMNS: [&str; 4] = [
    TOTAL_TRANSACTION_AMOUNT,
    AVERAGE_TRANSACTION_AMOUNT,
    TRANSACTION_COUNT,
    STD_DEVIATION_TRANSACTION_AMOUNT,
];

// Groups rows by CustomerId and summarises Amount per group.
// Inputs: transaction frame with CustomerId and a numeric Amount
// Outputs: one row per distinct customer, ordered by customer id
// Missing amounts are skipped by sum, mean and std but still counted as
// transactions. Std is the sample std (ddof 1), missing for one amount.
pub fn create_aggregate_features(df: &DataFrame) -> Result<DataFrame> {
    let customers = column_keys(df.column(CUSTOMER_ID)?)?;
    if let Some(row) = customers.iter().position(Option::is_none) {
        return Err(PipelineError::MissingValue {
            column: CUSTOMER_ID.to_string(),
            row,
        });
    }

    let aggregates = df
        .clone()
        .lazy()
        .group_by([col(CUSTOMER_ID)])
        .agg([
            col(AMOUNT).sum().alias(TOTAL_TRANSACTION_AMOUNT),
            col(AMOUNT).mean().alias(AVERAGE_TRANSACTION_AMOUNT),
            col(AMOUNT).len().cast(DataType::Float64).alias(TRANSACTION_COUNT),
            col(AMOUNT).std(1).alias(STD_DEVIATION_TRANSACTION_AMOUNT),
        ])
        .sort([CUSTOMER_ID], SortMultipleOptions::default())
        .collect()?;
    Ok(aggregates)
}
