use crate::types::CustomerId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),

    #[error("Frame error: {0}")]
    Frame(#[from] polars::prelude::PolarsError),

    #[error("Missing required column '{column}'")]
    MissingColumn { column: String },

    #[error("Invalid value '{value}' in column '{column}' at line {line}: {reason}")]
    InvalidField {
        line:   u64,
        column: String,
        value:  String,
        reason: String,
    },

    #[error("No data: {context} has no rows")]
    EmptySubset { context: String },

    #[error("Retention baseline is zero: every transaction in the subset is a return")]
    ZeroRetentionBaseline,

    #[error("Negative cohort age {age} for customer {customer_id} on invoice {invoice_no}")]
    NegativeCohortAge {
        customer_id: CustomerId,
        invoice_no:  String,
        age:         i64,
    },

    #[error("Parameter '{name}' = {value} outside [{min}, {max}]")]
    InvalidParameter {
        name:  String,
        value: f64,
        min:   f64,
        max:   f64,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AnalyticsError {
    pub fn empty(context: impl Into<String>) -> Self {
        AnalyticsError::EmptySubset { context: context.into() }
    }
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
