//! The canonical, validated transaction dataset.
//!
//! RULE: a Dataset is immutable once built. Engines read it and derive
//! their own working structures; filtering returns a new Dataset.
//!
//! Acquisition months are computed once, over the full history, when the
//! dataset is first built. Filtered copies carry them unchanged so cohort
//! ages stay well-defined after any row-level filtering.

use crate::{
    config::ContinentMap,
    filter::TransactionFilter,
    types::{first_of_month, month_start, CohortLabel, CustomerId},
};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

// Column names shared by the columnar views.
pub const CUSTOMER_ID: &str = "CustomerID";
pub const INVOICE_NO: &str = "InvoiceNo";
pub const INVOICE_TS: &str = "InvoiceTs";
pub const AMOUNT_NET: &str = "AmountNet";

/// One invoice line in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub invoice_no:        String,
    pub stock_code:        Option<String>,
    pub description:       Option<String>,
    pub customer_id:       CustomerId,
    pub invoice_date:      NaiveDateTime,
    pub quantity:          i64,
    pub unit_price:        f64,
    pub amount:            f64,
    pub amount_net:        f64,
    pub is_return:         bool,
    pub invoice_month:     NaiveDate,
    pub acquisition_month: CohortLabel,
    pub country:           String,
    pub continent:         String,
}

impl Transaction {
    /// Build a line from its primary fields, deriving everything else.
    ///
    /// `amount_net` is `amount` negated for credit notes. The acquisition
    /// month is provisional (the invoice month) and the continent is
    /// blank until the line is placed in a Dataset.
    pub fn new(
        invoice_no: &str,
        customer_id: CustomerId,
        invoice_date: NaiveDateTime,
        quantity: i64,
        unit_price: f64,
        country: &str,
    ) -> Self {
        let is_return = is_credit_note(invoice_no);
        let amount = quantity as f64 * unit_price;
        let amount_net = if is_return { -amount } else { amount };
        let invoice_month = month_start(invoice_date);
        Self {
            invoice_no: invoice_no.to_string(),
            stock_code: None,
            description: None,
            customer_id,
            invoice_date,
            quantity,
            unit_price,
            amount,
            amount_net,
            is_return,
            invoice_month,
            acquisition_month: invoice_month,
            country: country.to_string(),
            continent: String::new(),
        }
    }
}

/// Credit notes carry a leading "C" on the invoice number.
pub fn is_credit_note(invoice_no: &str) -> bool {
    invoice_no.starts_with('C')
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    transactions: Vec<Transaction>,
}

impl Dataset {
    /// Build the full-history dataset, assigning each customer's
    /// acquisition month as the minimum invoice month over all of
    /// their lines. Blank continents come from the built-in lookup.
    pub fn from_transactions(transactions: Vec<Transaction>) -> Self {
        Self::from_transactions_with(transactions, &ContinentMap::default())
    }

    /// As [`Dataset::from_transactions`], filling blank continents from
    /// `continents`.
    pub fn from_transactions_with(mut transactions: Vec<Transaction>, continents: &ContinentMap) -> Self {
        let acquisition = acquisition_months(&transactions);
        let mut corrected = 0usize;
        for txn in &mut transactions {
            txn.invoice_month = first_of_month(txn.invoice_month);
            if let Some(&acq) = acquisition.get(&txn.customer_id) {
                if txn.acquisition_month != acq {
                    corrected += 1;
                }
                txn.acquisition_month = acq;
            }
            if txn.continent.is_empty() {
                txn.continent = continents.continent_of(&txn.country).to_string();
            }
        }
        if corrected > 0 {
            log::debug!("Assigned acquisition month on {corrected} lines");
        }
        Self { transactions }
    }

    /// A working copy restricted to the lines the filter accepts.
    /// Acquisition months are not recomputed.
    pub fn filter(&self, filter: &TransactionFilter) -> Dataset {
        Dataset {
            transactions: self
                .transactions
                .iter()
                .filter(|t| filter.matches(t))
                .cloned()
                .collect(),
        }
    }

    /// A working copy without credit notes.
    pub fn without_returns(&self) -> Dataset {
        Dataset {
            transactions: self
                .transactions
                .iter()
                .filter(|t| !t.is_return)
                .cloned()
                .collect(),
        }
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn customer_count(&self) -> usize {
        self.transactions
            .iter()
            .map(|t| t.customer_id)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn total_net(&self) -> f64 {
        self.transactions.iter().map(|t| t.amount_net).sum()
    }

    /// Earliest and latest invoice timestamps, or None when empty.
    pub fn period(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let min = self.transactions.iter().map(|t| t.invoice_date).min()?;
        let max = self.transactions.iter().map(|t| t.invoice_date).max()?;
        Some((min, max))
    }

    /// Distinct acquisition months, ascending.
    pub fn cohort_labels(&self) -> Vec<CohortLabel> {
        self.transactions
            .iter()
            .map(|t| t.acquisition_month)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn countries(&self) -> Vec<String> {
        self.transactions
            .iter()
            .map(|t| t.country.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Earliest invoice timestamp per customer.
    pub fn first_purchases(&self) -> HashMap<CustomerId, NaiveDateTime> {
        let mut out: HashMap<CustomerId, NaiveDateTime> = HashMap::new();
        for txn in &self.transactions {
            out.entry(txn.customer_id)
                .and_modify(|d| *d = (*d).min(txn.invoice_date))
                .or_insert(txn.invoice_date);
        }
        out
    }

    /// Columnar view for group-by aggregation: `CustomerID` (i64),
    /// `InvoiceNo` (str), `InvoiceTs` (i64, seconds since the epoch),
    /// `AmountNet` (f64).
    pub fn to_frame(&self) -> PolarsResult<DataFrame> {
        let customer_ids: Vec<i64> = self.transactions.iter().map(|t| t.customer_id).collect();
        let invoices: Vec<&str> = self.transactions.iter().map(|t| t.invoice_no.as_str()).collect();
        let timestamps: Vec<i64> = self
            .transactions
            .iter()
            .map(|t| t.invoice_date.and_utc().timestamp())
            .collect();
        let amounts: Vec<f64> = self.transactions.iter().map(|t| t.amount_net).collect();
        DataFrame::new(vec![
            Series::new(CUSTOMER_ID, customer_ids),
            Series::new(INVOICE_NO, invoices),
            Series::new(INVOICE_TS, timestamps),
            Series::new(AMOUNT_NET, amounts),
        ])
    }

    pub fn continents(&self) -> Vec<String> {
        self.transactions
            .iter()
            .map(|t| t.continent.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Minimum invoice month per customer.
pub fn acquisition_months(transactions: &[Transaction]) -> HashMap<CustomerId, CohortLabel> {
    let mut out: HashMap<CustomerId, CohortLabel> = HashMap::new();
    for txn in transactions {
        let month = first_of_month(txn.invoice_month);
        out.entry(txn.customer_id)
            .and_modify(|m| {
                if month < *m {
                    *m = month;
                }
            })
            .or_insert(month);
    }
    out
}
