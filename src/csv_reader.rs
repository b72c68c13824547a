use std::fs::File;
use std::path::Path;

use log::info;
use polars::prelude::*;
use serde::Deserialize;

use crate::error::Result;

pub const FRAUD_RESULT: &str = "FraudResult";

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Transaction {
    #[serde(rename = "TransactionId")]
    pub transaction_id: String,
    #[serde(rename = "BatchId")]
    pub batch_id: Option<String>,
    #[serde(rename = "AccountId")]
    pub account_id: Option<String>,
    #[serde(rename = "SubscriptionId")]
    pub subscription_id: Option<String>,
    #[serde(rename = "CustomerId")]
    pub customer_id: String,
    #[serde(rename = "CurrencyCode")]
    pub currency_code: Option<String>,
    #[serde(rename = "CountryCode")]
    pub country_code: Option<f64>,
    #[serde(rename = "ProviderId")]
    pub provider_id: Option<String>,
    #[serde(rename = "ProductId")]
    pub product_id: Option<String>,
    #[serde(rename = "ProductCategory")]
    pub product_category: Option<String>,
    #[serde(rename = "ChannelId")]
    pub channel_id: Option<String>,
    #[serde(rename = "Amount")]
    pub amount: Option<f64>,
    #[serde(rename = "Value")]
    pub value: Option<f64>,
    #[serde(rename = "TransactionStartTime")]
    pub transaction_start_time: Option<String>,
    #[serde(rename = "PricingStrategy")]
    pub pricing_strategy: Option<f64>,
    // Known outcome, only present in historical extracts
    #[serde(rename = "FraudResult", default)]
    pub fraud_result: Option<f64>,
}

pub fn read_transactions(file_path: impl AsRef<Path>) -> Result<Vec<Transaction>> {
    let file_path = file_path.as_ref();
    let file = File::open(file_path)?;
    let mut rdr = csv::Reader::from_reader(file);

    let transactions: Vec<Transaction> = rdr
        .deserialize()
        .collect::<std::result::Result<Vec<Transaction>, csv::Error>>()?;

    info!("Loaded {} transactions from {}", transactions.len(), file_path.display());
    Ok(transactions)
}

// Builds the raw transaction frame in CSV column order.
// FraudResult is only added when at least one record carries it.
pub fn transactions_to_frame(transactions: &[Transaction]) -> Result<DataFrame> {
    fn text<F>(transactions: &[Transaction], name: &str, f: F) -> Column
    where
        F: Fn(&Transaction) -> Option<String>,
    {
        Column::new(name.into(), transactions.iter().map(f).collect::<Vec<_>>())
    }
    fn number<F>(transactions: &[Transaction], name: &str, f: F) -> Column
    where
        F: Fn(&Transaction) -> Option<f64>,
    {
        Column::new(name.into(), transactions.iter().map(f).collect::<Vec<_>>())
    }

    let mut columns = vec![
        text(transactions, "TransactionId", |t| Some(t.transaction_id.clone())),
        text(transactions, "BatchId", |t| t.batch_id.clone()),
        text(transactions, "AccountId", |t| t.account_id.clone()),
        text(transactions, "SubscriptionId", |t| t.subscription_id.clone()),
        text(transactions, "CustomerId", |t| Some(t.customer_id.clone())),
        text(transactions, "CurrencyCode", |t| t.currency_code.clone()),
        number(transactions, "CountryCode", |t| t.country_code),
        text(transactions, "ProviderId", |t| t.provider_id.clone()),
        text(transactions, "ProductId", |t| t.product_id.clone()),
        text(transactions, "ProductCategory", |t| t.product_category.clone()),
        text(transactions, "ChannelId", |t| t.channel_id.clone()),
        number(transactions, "Amount", |t| t.amount),
        number(transactions, "Value", |t| t.value),
        text(transactions, "TransactionStartTime", |t| t.transaction_start_time.clone()),
        number(transactions, "PricingStrategy", |t| t.pricing_strategy),
    ];
    if transactions.iter().any(|t| t.fraud_result.is_some()) {
        columns.push(number(transactions, FRAUD_RESULT, |t| t.fraud_result));
    }

    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "TransactionId,BatchId,AccountId,SubscriptionId,CustomerId,CurrencyCode,CountryCode,ProviderId,ProductId,ProductCategory,ChannelId,Amount,Value,TransactionStartTime,PricingStrategy,FraudResult";

    fn write_temp(name: &str, body: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("credit_risk_{}_{}.csv", name, std::process::id()));
        let mut file = File::create(&path).unwrap();
        writeln!(file, "{}", HEADER).unwrap();
        write!(file, "{}", body).unwrap();
        path
    }

    #[test]
    fn test_read_transactions_with_missing_cells() {
        let path = write_temp(
            "read",
            "TransactionId_1,BatchId_1,AccountId_1,SubscriptionId_1,CustomerId_1,UGX,256,ProviderId_6,ProductId_10,airtime,ChannelId_3,1000.0,1000,2018-11-15T02:18:49Z,2,0\n\
             TransactionId_2,BatchId_2,AccountId_2,SubscriptionId_2,CustomerId_1,UGX,256,ProviderId_4,ProductId_6,,ChannelId_2,,20,2018-11-15T02:19:08Z,2,0\n",
        );
        let transactions = read_transactions(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].customer_id, "CustomerId_1");
        assert_eq!(transactions[0].amount, Some(1000.0));
        assert_eq!(transactions[1].amount, None);
        assert_eq!(transactions[1].product_category, None);
        assert_eq!(transactions[1].fraud_result, Some(0.0));
    }

    #[test]
    fn test_read_transactions_rejects_bad_number() {
        let path = write_temp(
            "bad",
            "TransactionId_1,BatchId_1,AccountId_1,SubscriptionId_1,CustomerId_1,UGX,256,ProviderId_6,ProductId_10,airtime,ChannelId_3,abc,1000,2018-11-15T02:18:49Z,2,0\n",
        );
        let result = read_transactions(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err(), "Non-numeric Amount is a schema violation");
    }

    #[test]
    fn test_table_omits_fraud_result_when_absent() {
        let path = write_temp(
            "table",
            "TransactionId_1,BatchId_1,AccountId_1,SubscriptionId_1,CustomerId_1,UGX,256,ProviderId_6,ProductId_10,airtime,ChannelId_3,1000.0,1000,2018-11-15T02:18:49Z,2,\n",
        );
        let transactions = read_transactions(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let df = transactions_to_frame(&transactions).unwrap();
        assert_eq!(df.height(), 1);
        assert!(df.get_column_index(FRAUD_RESULT).is_none());
        assert_eq!(df.column("Amount").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("CustomerId").unwrap().dtype(), &DataType::String);
        assert_eq!(crate::frame::f64_values(&df, "Amount").unwrap(), vec![Some(1000.0)]);
    }
}
