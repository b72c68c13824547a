//! Small accessors over polars data frames shared by the pipeline stages.
//!
//! Every numeric column the pipeline produces is `Float64` and every text
//! column is `String`, so stages read cells through these helpers instead
//! of matching on dtypes themselves.

use std::fs::File;
use std::path::Path;

use log::info;
use polars::prelude::*;

use crate::error::{PipelineError, Result};

pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    Ok(df.column(name)?.f64()?.into_iter().collect())
}

/// Numeric column with every cell required to be present.
pub fn dense_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    f64_values(df, name)?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| PipelineError::MissingValue {
                column: name.to_string(),
                row,
            })
        })
        .collect()
}

pub fn str_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    Ok(df
        .column(name)?
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_owned))
        .collect())
}

// Text form of each cell, used for grouping and label encoding.
// Whole floats print without a trailing ".0".
pub fn column_keys(column: &Column) -> Result<Vec<Option<String>>> {
    match column.dtype() {
        DataType::Float64 => Ok(column
            .f64()?
            .into_iter()
            .map(|v| v.map(|x| x.to_string()))
            .collect()),
        DataType::String => Ok(column
            .str()?
            .into_iter()
            .map(|v| v.map(str::to_owned))
            .collect()),
        _ => {
            let cast = column.cast(&DataType::String)?;
            Ok(cast.str()?.into_iter().map(|v| v.map(str::to_owned)).collect())
        }
    }
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_columns().iter().map(|c| c.name().to_string()).collect()
}

pub fn numeric_column_names(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|c| c.dtype() == &DataType::Float64)
        .map(|c| c.name().to_string())
        .collect()
}

/// Copy of the frame with `name` moved to the last position.
/// Frames without that column come back unchanged.
pub fn relocate_last(df: &DataFrame, name: &str) -> Result<DataFrame> {
    if df.get_column_index(name).is_none() {
        return Ok(df.clone());
    }
    let mut order: Vec<String> = column_names(df).into_iter().filter(|n| n != name).collect();
    order.push(name.to_string());
    Ok(df.select(order.iter().map(String::as_str))?)
}

/// One row per column: dtype, missing count and the numeric range.
pub fn describe(df: &DataFrame) -> Result<DataFrame> {
    let columns = df.get_columns();
    let mut names = Vec::with_capacity(columns.len());
    let mut dtypes = Vec::with_capacity(columns.len());
    let mut missing = Vec::with_capacity(columns.len());
    let mut mins = Vec::with_capacity(columns.len());
    let mut maxs = Vec::with_capacity(columns.len());
    let mut means = Vec::with_capacity(columns.len());

    for column in columns {
        names.push(column.name().to_string());
        dtypes.push(column.dtype().to_string());
        missing.push(column.null_count() as u64);
        match column.f64() {
            Ok(ca) => {
                mins.push(ca.min());
                maxs.push(ca.max());
                means.push(ca.mean());
            }
            Err(_) => {
                mins.push(None);
                maxs.push(None);
                means.push(None);
            }
        }
    }

    Ok(df!(
        "column" => names,
        "dtype" => dtypes,
        "missing" => missing,
        "min" => mins,
        "max" => maxs,
        "mean" => means,
    )?)
}

pub fn write_csv(df: &DataFrame, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut file = File::create(path)?;
    let mut out = df.clone();
    CsvWriter::new(&mut file).include_header(true).finish(&mut out)?;
    info!("Wrote {} rows x {} columns to {}", df.height(), df.width(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        df!(
            "CustomerId" => [Some("c1"), Some("c2"), None],
            "Amount" => [Some(10.0), None, Some(-5.5)],
            "FraudResult" => [0.0, 1.0, 0.0],
        )
        .unwrap()
    }

    #[test]
    fn test_value_accessors() {
        let df = sample();
        assert_eq!(f64_values(&df, "Amount").unwrap(), vec![Some(10.0), None, Some(-5.5)]);
        assert_eq!(str_values(&df, "CustomerId").unwrap()[2], None);
        assert!(matches!(
            dense_f64(&df, "Amount"),
            Err(PipelineError::MissingValue { row: 1, .. })
        ));
        assert!(f64_values(&df, "CustomerId").is_err());
        assert!(f64_values(&df, "Nope").is_err());
    }

    #[test]
    fn test_relocate_last_leaves_input_untouched() {
        let df = sample();
        let moved = relocate_last(&df, "CustomerId").unwrap();
        assert_eq!(column_names(&moved), vec!["Amount", "FraudResult", "CustomerId"]);
        assert_eq!(column_names(&df), vec!["CustomerId", "Amount", "FraudResult"]);
        assert!(relocate_last(&df, "Missing").unwrap().equals_missing(&df));
    }

    #[test]
    fn test_column_keys_format_whole_numbers() {
        let df = df!("Code" => [Some(3001.0), Some(2.5), None]).unwrap();
        let keys = column_keys(df.column("Code").unwrap()).unwrap();
        assert_eq!(keys, vec![Some("3001".to_string()), Some("2.5".to_string()), None]);
    }

    #[test]
    fn test_describe_counts_missing() {
        let summary = describe(&sample()).unwrap();
        assert_eq!(summary.height(), 3);
        assert_eq!(str_values(&summary, "column").unwrap()[1].as_deref(), Some("Amount"));
        let missing: Vec<Option<u64>> = summary.column("missing").unwrap().u64().unwrap().into_iter().collect();
        assert_eq!(missing, vec![Some(1), Some(1), Some(0)]);
        assert_eq!(f64_values(&summary, "min").unwrap()[1], Some(-5.5));
        assert_eq!(f64_values(&summary, "max").unwrap()[1], Some(10.0));
        assert_eq!(f64_values(&summary, "min").unwrap()[0], None);
    }

    #[test]
    fn test_numeric_column_names() {
        assert_eq!(numeric_column_names(&sample()), vec!["Amount", "FraudResult"]);
    }
}
