//! Cohort engine: cohort ages, retention matrix and revenue curves.
//!
//! Cohort = acquisition month (first invoice month of the customer over
//! the full history). Cohort age = whole months between a line's invoice
//! month and its cohort.
//!
//! Ordering: acquisition months are fixed when the full dataset is
//! built, so a filtered working copy still yields correct ages. A
//! negative age can only come from an inconsistent dataset and is
//! reported as an error rather than silently kept.
//!
//! Retention and revenue curves are polars group-bys over the frame's
//! columnar view.

use crate::{
    dataset::{Dataset, AMOUNT_NET, CUSTOMER_ID},
    error::{AnalyticsError, AnalyticsResult},
    types::{months_between, CohortAge, CohortLabel, CustomerId},
};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

const COHORT: &str = "Cohort";
const COHORT_AGE: &str = "CohortAge";

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgedTransaction {
    pub customer_id:       CustomerId,
    pub invoice_no:        String,
    pub invoice_date:      NaiveDateTime,
    pub invoice_month:     NaiveDate,
    pub acquisition_month: CohortLabel,
    pub cohort_age:        CohortAge,
    pub amount_net:        f64,
}

/// A dataset with a cohort age on every line.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CohortFrame {
    rows: Vec<AgedTransaction>,
}

impl CohortFrame {
    pub fn rows(&self) -> &[AgedTransaction] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Columnar view: `CustomerID` (i64), `Cohort` (i32, days from CE of
    /// the acquisition month), `CohortAge` (u32), `AmountNet` (f64).
    pub fn to_frame(&self) -> PolarsResult<DataFrame> {
        let customer_ids: Vec<i64> = self.rows.iter().map(|r| r.customer_id).collect();
        let cohorts: Vec<i32> = self.rows.iter().map(|r| r.acquisition_month.num_days_from_ce()).collect();
        let ages: Vec<u32> = self.rows.iter().map(|r| r.cohort_age).collect();
        let amounts: Vec<f64> = self.rows.iter().map(|r| r.amount_net).collect();
        DataFrame::new(vec![
            Series::new(CUSTOMER_ID, customer_ids),
            Series::new(COHORT, cohorts),
            Series::new(COHORT_AGE, ages),
            Series::new(AMOUNT_NET, amounts),
        ])
    }
}

/// Retention rates keyed by acquisition month × cohort age.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetentionMatrix {
    /// Distinct customers active at age 0, per cohort.
    pub cohort_sizes: BTreeMap<CohortLabel, usize>,
    pub rates:        BTreeMap<CohortLabel, BTreeMap<CohortAge, f64>>,
}

impl RetentionMatrix {
    pub fn rate(&self, cohort: CohortLabel, age: CohortAge) -> Option<f64> {
        self.rates.get(&cohort)?.get(&age).copied()
    }

    pub fn cohorts(&self) -> Vec<CohortLabel> {
        self.rates.keys().copied().collect()
    }

    /// Largest age with a cell in any cohort.
    pub fn max_age(&self) -> Option<CohortAge> {
        self.rates
            .values()
            .filter_map(|row| row.keys().next_back().copied())
            .max()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

// ── Operations ───────────────────────────────────────────────────────────────

/// Derive the cohort age of every line.
pub fn assign_cohort_age(dataset: &Dataset) -> AnalyticsResult<CohortFrame> {
    let rows = dataset
        .iter()
        .map(|txn| {
            let age = months_between(txn.acquisition_month, txn.invoice_month);
            if age < 0 {
                return Err(AnalyticsError::NegativeCohortAge {
                    customer_id: txn.customer_id,
                    invoice_no:  txn.invoice_no.clone(),
                    age,
                });
            }
            Ok(AgedTransaction {
                customer_id:       txn.customer_id,
                invoice_no:        txn.invoice_no.clone(),
                invoice_date:      txn.invoice_date,
                invoice_month:     txn.invoice_month,
                acquisition_month: txn.acquisition_month,
                cohort_age:        age as CohortAge,
                amount_net:        txn.amount_net,
            })
        })
        .collect::<AnalyticsResult<Vec<_>>>()?;
    Ok(CohortFrame { rows })
}

fn cohort_label(days_from_ce: i32) -> AnalyticsResult<CohortLabel> {
    NaiveDate::from_num_days_from_ce_opt(days_from_ce)
        .ok_or_else(|| AnalyticsError::Other(anyhow::anyhow!("cohort day {days_from_ce} out of range")))
}

/// Distinct customers per (cohort, age), counting only customers who are
/// active at age 0 in this frame. Rows come back ordered by cohort, age.
fn active_counts(frame: &CohortFrame) -> AnalyticsResult<Vec<(CohortLabel, CohortAge, usize)>> {
    if frame.is_empty() {
        return Ok(Vec::new());
    }
    let active = frame
        .to_frame()?
        .lazy()
        .filter(col(COHORT_AGE).min().over([col(CUSTOMER_ID)]).eq(lit(0u32)))
        .group_by([col(COHORT), col(COHORT_AGE)])
        .agg([col(CUSTOMER_ID).n_unique().alias("Active")])
        .sort([COHORT, COHORT_AGE], SortMultipleOptions::default())
        .collect()?;

    let cohorts = active.column(COHORT)?.i32()?;
    let ages = active.column(COHORT_AGE)?.u32()?;
    let counts = active.column("Active")?.cast(&DataType::UInt64)?;
    let counts = counts.u64()?;
    cohorts
        .into_no_null_iter()
        .zip(ages.into_no_null_iter())
        .zip(counts.into_no_null_iter())
        .map(|((cohort, age), n)| Ok((cohort_label(cohort)?, age, n as usize)))
        .collect()
}

/// Distinct customers at cohort age 0, per acquisition month.
pub fn cohort_sizes(frame: &CohortFrame) -> AnalyticsResult<BTreeMap<CohortLabel, usize>> {
    Ok(active_counts(frame)?
        .into_iter()
        .filter(|(_, age, _)| *age == 0)
        .map(|(cohort, _, n)| (cohort, n))
        .collect())
}

/// Retention rate = distinct customers of the cohort's age-0 set active
/// at (cohort, age), divided by the size of that set. Rates stay in
/// [0, 1] whatever rows the frame is missing.
///
/// Cohorts with no age-0 activity in the frame (possible after a
/// geographic filter) have no size and are left out of the matrix.
pub fn retention_matrix(frame: &CohortFrame) -> AnalyticsResult<RetentionMatrix> {
    let active = active_counts(frame)?;
    let sizes: BTreeMap<CohortLabel, usize> = active
        .iter()
        .filter(|(_, age, _)| *age == 0)
        .map(|(cohort, _, n)| (*cohort, *n))
        .collect();

    let mut rates: BTreeMap<CohortLabel, BTreeMap<CohortAge, f64>> = BTreeMap::new();
    for (cohort, age, n) in &active {
        if let Some(&size) = sizes.get(cohort) {
            rates.entry(*cohort).or_default().insert(*age, *n as f64 / size as f64);
        }
    }
    let dropped = frame
        .rows
        .iter()
        .map(|r| r.acquisition_month)
        .collect::<BTreeSet<_>>()
        .difference(&sizes.keys().copied().collect())
        .count();
    if dropped > 0 {
        log::debug!("{dropped} cohorts without age-0 activity left out of retention");
    }

    Ok(RetentionMatrix { cohort_sizes: sizes, rates })
}

fn revenue_frame(frame: &CohortFrame, cohort: Option<CohortLabel>) -> AnalyticsResult<BTreeMap<CohortAge, f64>> {
    if frame.is_empty() {
        return Ok(BTreeMap::new());
    }
    let mut rows = frame.to_frame()?.lazy();
    if let Some(label) = cohort {
        rows = rows.filter(col(COHORT).eq(lit(label.num_days_from_ce())));
    }
    let summed = rows
        .group_by([col(COHORT_AGE)])
        .agg([col(AMOUNT_NET).sum()])
        .collect()?;
    let ages = summed.column(COHORT_AGE)?.u32()?;
    let amounts = summed.column(AMOUNT_NET)?.f64()?;
    Ok(ages.into_no_null_iter().zip(amounts.into_no_null_iter()).collect())
}

/// Net revenue per cohort age, all cohorts pooled.
pub fn revenue_by_age(frame: &CohortFrame) -> AnalyticsResult<BTreeMap<CohortAge, f64>> {
    revenue_frame(frame, None)
}

/// Net revenue per cohort age for a single cohort.
pub fn cohort_revenue_by_age(
    frame: &CohortFrame,
    cohort: CohortLabel,
) -> AnalyticsResult<BTreeMap<CohortAge, f64>> {
    revenue_frame(frame, Some(cohort))
}

/// Mean retention across the cohorts that reached `age`; None if none did.
pub fn retention_at_age(matrix: &RetentionMatrix, age: CohortAge) -> Option<f64> {
    let values: Vec<f64> = matrix
        .rates
        .values()
        .filter_map(|row| row.get(&age).copied())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
