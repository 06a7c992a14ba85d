//! Explicit filter parameter objects.
//!
//! Every engine call takes the dataset plus one of these; there is no
//! ambient "current selection".

use crate::{dataset::Transaction, types::CohortLabel};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum Geography {
    #[default]
    All,
    Continent { name: String },
    /// An empty list keeps every country.
    Countries { names: Vec<String> },
}

impl Geography {
    fn matches(&self, txn: &Transaction) -> bool {
        match self {
            Geography::All => true,
            Geography::Continent { name } => txn.continent == *name,
            Geography::Countries { names } => {
                names.is_empty() || names.iter().any(|n| *n == txn.country)
            }
        }
    }
}

/// Row-level selection applied after acquisition months are known.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionFilter {
    #[serde(default)]
    pub geography: Geography,
    /// Inclusive lower bound on the acquisition month.
    #[serde(default)]
    pub acquisition_from: Option<CohortLabel>,
    /// Inclusive upper bound on the acquisition month.
    #[serde(default)]
    pub acquisition_to: Option<CohortLabel>,
    /// Explicit cohort inclusion set; None keeps every cohort.
    #[serde(default)]
    pub cohorts: Option<BTreeSet<CohortLabel>>,
    /// Inclusive calendar-date bounds on the invoice date.
    #[serde(default)]
    pub invoice_from: Option<NaiveDate>,
    #[serde(default)]
    pub invoice_to: Option<NaiveDate>,
}

impl TransactionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn single_cohort(label: CohortLabel) -> Self {
        Self {
            cohorts: Some(BTreeSet::from([label])),
            ..Self::default()
        }
    }

    pub fn matches(&self, txn: &Transaction) -> bool {
        if !self.geography.matches(txn) {
            return false;
        }
        if self.acquisition_from.is_some_and(|from| txn.acquisition_month < from) {
            return false;
        }
        if self.acquisition_to.is_some_and(|to| txn.acquisition_month > to) {
            return false;
        }
        if let Some(cohorts) = &self.cohorts {
            if !cohorts.contains(&txn.acquisition_month) {
                return false;
            }
        }
        let day = txn.invoice_date.date();
        if self.invoice_from.is_some_and(|from| day < from) {
            return false;
        }
        if self.invoice_to.is_some_and(|to| day > to) {
            return false;
        }
        true
    }
}
