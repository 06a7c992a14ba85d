//! Headline KPIs for the overview and cohort pages.

use crate::{
    cohort_engine::{assign_cohort_age, retention_at_age, revenue_by_age, RetentionMatrix},
    config::AnalyticsConfig,
    dataset::Dataset,
    error::{AnalyticsError, AnalyticsResult},
    rfm_engine::compute_rfm,
    types::CustomerId,
};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewKpis {
    pub active_clients:  usize,
    /// Customers with an RFM score (positive net spend).
    pub rfm_count:       usize,
    /// Total net revenue / active clients.
    pub clv_baseline:    f64,
    /// Mean over cohort ages of per-age total net revenue.
    pub avg_rev_per_age: f64,
    /// Mean net revenue per customer within the window after first purchase.
    pub north_star:      f64,
    pub period_start:    NaiveDateTime,
    pub period_end:      NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortKpis {
    /// Mean per-customer net revenue.
    pub clv_mean:                   f64,
    /// Mean per-customer net revenue within the window after the
    /// acquisition month starts; None when no line falls in the window.
    pub early_revenue_per_customer: Option<f64>,
    /// Mean retention (%) at the checkpoint age; None when no cohort
    /// reached it.
    pub retention_checkpoint_pct:   Option<f64>,
    /// Closed-form CLV from configured margin, retention and discount.
    pub clv_formula:                f64,
}

/// Headline KPIs over `dataset`. First purchases come from
/// `first_purchases` so a filtered dataset can still anchor the North
/// Star window on each customer's full-history first invoice.
pub fn compute_overview(
    dataset: &Dataset,
    first_purchases: &HashMap<CustomerId, NaiveDateTime>,
    config: &AnalyticsConfig,
) -> AnalyticsResult<OverviewKpis> {
    let (period_start, period_end) = dataset
        .period()
        .ok_or_else(|| AnalyticsError::empty("overview"))?;

    let active_clients = dataset.customer_count();
    let clv_baseline = dataset.total_net() / active_clients as f64;
    let rfm_count = compute_rfm(dataset, true)?.len();

    let frame = assign_cohort_age(dataset)?;
    let by_age = revenue_by_age(&frame)?;
    let avg_rev_per_age = if by_age.is_empty() {
        0.0
    } else {
        by_age.values().sum::<f64>() / by_age.len() as f64
    };

    Ok(OverviewKpis {
        active_clients,
        rfm_count,
        clv_baseline,
        avg_rev_per_age,
        north_star: north_star_from(dataset, first_purchases, config.north_star_window_days),
        period_start,
        period_end,
    })
}

/// North Star with first purchases taken from `dataset` itself.
pub fn north_star(dataset: &Dataset, window_days: i64) -> f64 {
    north_star_from(dataset, &dataset.first_purchases(), window_days)
}

/// Net revenue from lines within `window_days` of each customer's first
/// purchase, divided by the customers having at least one such line.
/// Customers missing from `first` are skipped. Returns 0 when no
/// customer qualifies.
pub fn north_star_from(
    dataset: &Dataset,
    first: &HashMap<CustomerId, NaiveDateTime>,
    window_days: i64,
) -> f64 {
    let window = Duration::days(window_days);
    let mut revenue = 0.0;
    let mut customers = BTreeSet::new();
    for txn in dataset.iter() {
        let Some(&start) = first.get(&txn.customer_id) else {
            continue;
        };
        if txn.invoice_date <= start + window {
            revenue += txn.amount_net;
            customers.insert(txn.customer_id);
        }
    }

    if customers.is_empty() {
        0.0
    } else {
        revenue / customers.len() as f64
    }
}

/// Net revenue per invoice month.
pub fn monthly_revenue(dataset: &Dataset) -> BTreeMap<NaiveDate, f64> {
    let mut out: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for txn in dataset.iter() {
        *out.entry(txn.invoice_month).or_insert(0.0) += txn.amount_net;
    }
    out
}

pub fn cohort_kpis(
    dataset: &Dataset,
    matrix: &RetentionMatrix,
    config: &AnalyticsConfig,
) -> AnalyticsResult<CohortKpis> {
    if dataset.is_empty() {
        return Err(AnalyticsError::empty("cohort KPIs"));
    }

    let mut per_customer: BTreeMap<CustomerId, f64> = BTreeMap::new();
    let mut early: BTreeMap<CustomerId, f64> = BTreeMap::new();
    for txn in dataset.iter() {
        *per_customer.entry(txn.customer_id).or_insert(0.0) += txn.amount_net;

        let cohort_start = txn.acquisition_month.and_time(NaiveTime::MIN);
        if (txn.invoice_date - cohort_start).num_days() <= config.early_revenue_window_days {
            *early.entry(txn.customer_id).or_insert(0.0) += txn.amount_net;
        }
    }

    let clv_mean = per_customer.values().sum::<f64>() / per_customer.len() as f64;
    let early_revenue_per_customer = if early.is_empty() {
        None
    } else {
        Some(early.values().sum::<f64>() / early.len() as f64)
    };

    Ok(CohortKpis {
        clv_mean,
        early_revenue_per_customer,
        retention_checkpoint_pct: retention_at_age(matrix, config.retention_checkpoint_age)
            .map(|r| r * 100.0),
        clv_formula: config.clv_formula.clv(),
    })
}
