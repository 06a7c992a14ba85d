//! Scenario simulator: what-if projection of CLV, CA and retention.
//!
//! Baseline KPIs come from the unmodified subset. The scenario applies a
//! per-line price adjustment
//!
//!   amount_adj = amount_net × (1 + margin/100) × (1 − discount/100)
//!
//! then scales CLV and CA by retention_scenario / retention_baseline.
//! That proportional scaling is a revenue simplification, not a cohort
//! survival model.
//!
//! retention_scenario is clamped above at 1 and NOT clamped below at 0.
//! Within the accepted retention_pct range it cannot go negative.

use crate::{
    dataset::{Dataset, Transaction},
    error::{AnalyticsError, AnalyticsResult},
    filter::TransactionFilter,
    types::{CohortLabel, CustomerId},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet},
};

pub const MARGIN_PCT_RANGE: (f64, f64) = (-50.0, 50.0);
pub const DISCOUNT_PCT_RANGE: (f64, f64) = (0.0, 50.0);
pub const RETENTION_PCT_RANGE: (f64, f64) = (-50.0, 20.0);

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioParams {
    #[serde(default)]
    pub margin_pct:    f64,
    #[serde(default)]
    pub discount_pct:  f64,
    #[serde(default)]
    pub retention_pct: f64,
    /// Restrict the simulation to one acquisition cohort.
    #[serde(default)]
    pub cohort:        Option<CohortLabel>,
}

impl ScenarioParams {
    pub fn validate(&self) -> AnalyticsResult<()> {
        check_range("margin_pct", self.margin_pct, MARGIN_PCT_RANGE)?;
        check_range("discount_pct", self.discount_pct, DISCOUNT_PCT_RANGE)?;
        check_range("retention_pct", self.retention_pct, RETENTION_PCT_RANGE)?;
        Ok(())
    }

    /// Per-line price adjustment factor.
    pub fn price_factor(&self) -> (f64, f64) {
        (1.0 + self.margin_pct / 100.0, 1.0 - self.discount_pct / 100.0)
    }
}

fn check_range(name: &str, value: f64, (min, max): (f64, f64)) -> AnalyticsResult<()> {
    if value.is_nan() || value < min || value > max {
        return Err(AnalyticsError::InvalidParameter {
            name: name.to_string(),
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScenarioKpis {
    /// Mean per-customer net revenue.
    pub clv:       f64,
    /// Total net revenue.
    pub ca:        f64,
    /// Share of lines that are not returns.
    pub retention: f64,
}

impl ScenarioKpis {
    fn minus(&self, other: &ScenarioKpis) -> ScenarioKpis {
        ScenarioKpis {
            clv:       self.clv - other.clv,
            ca:        self.ca - other.ca,
            retention: self.retention - other.retention,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyScenarioPoint {
    pub month:        NaiveDate,
    pub ca_baseline:  f64,
    pub ca_scenario:  f64,
    /// Month CA divided by distinct customers active that month.
    pub clv_baseline: f64,
    pub clv_scenario: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioOutcome {
    pub params:           ScenarioParams,
    pub transactions:     usize,
    pub customers:        usize,
    pub baseline:         ScenarioKpis,
    pub scenario:         ScenarioKpis,
    pub delta:            ScenarioKpis,
    /// retention_scenario / retention_baseline.
    pub retention_factor: f64,
    /// Price-adjusted only; retention scaling is not applied per month.
    pub monthly:          Vec<MonthlyScenarioPoint>,
}

// ── Operations ───────────────────────────────────────────────────────────────

fn customer_mean<F>(dataset: &Dataset, value: F) -> f64
where
    F: Fn(&Transaction) -> f64,
{
    let mut per_customer: BTreeMap<CustomerId, f64> = BTreeMap::new();
    for txn in dataset.iter() {
        *per_customer.entry(txn.customer_id).or_insert(0.0) += value(txn);
    }
    per_customer.values().sum::<f64>() / per_customer.len() as f64
}

fn total<F>(dataset: &Dataset, value: F) -> f64
where
    F: Fn(&Transaction) -> f64,
{
    dataset.iter().map(value).sum()
}

/// KPIs of the unmodified subset. Fails on an empty subset.
pub fn baseline_kpis(dataset: &Dataset) -> AnalyticsResult<ScenarioKpis> {
    if dataset.is_empty() {
        return Err(AnalyticsError::empty("scenario baseline"));
    }
    let sales = dataset.iter().filter(|t| !t.is_return).count();
    Ok(ScenarioKpis {
        clv:       customer_mean(dataset, |t| t.amount_net),
        ca:        total(dataset, |t| t.amount_net),
        retention: sales as f64 / dataset.len() as f64,
    })
}

pub fn adjusted_amount(amount_net: f64, params: &ScenarioParams) -> f64 {
    let (margin, discount) = params.price_factor();
    amount_net * margin * discount
}

/// The lines a scenario runs on: the whole dataset, or one cohort.
pub fn scenario_subset<'a>(dataset: &'a Dataset, params: &ScenarioParams) -> Cow<'a, Dataset> {
    match params.cohort {
        Some(label) => Cow::Owned(dataset.filter(&TransactionFilter::single_cohort(label))),
        None => Cow::Borrowed(dataset),
    }
}

pub fn simulate(dataset: &Dataset, params: &ScenarioParams) -> AnalyticsResult<ScenarioOutcome> {
    params.validate()?;

    let subset = scenario_subset(dataset, params);
    let subset = subset.as_ref();

    let baseline = baseline_kpis(subset)?;
    if baseline.retention == 0.0 {
        return Err(AnalyticsError::ZeroRetentionBaseline);
    }

    let retention = (baseline.retention * (1.0 + params.retention_pct / 100.0)).min(1.0);
    let retention_factor = retention / baseline.retention;

    let scenario = ScenarioKpis {
        clv: customer_mean(subset, |t| adjusted_amount(t.amount_net, params)) * retention_factor,
        ca:  total(subset, |t| adjusted_amount(t.amount_net, params)) * retention_factor,
        retention,
    };

    log::debug!(
        "Scenario margin={} discount={} retention={} on {} lines: CA {:.2} → {:.2}",
        params.margin_pct,
        params.discount_pct,
        params.retention_pct,
        subset.len(),
        baseline.ca,
        scenario.ca
    );

    Ok(ScenarioOutcome {
        params: params.clone(),
        transactions: subset.len(),
        customers: subset.customer_count(),
        delta: scenario.minus(&baseline),
        baseline,
        scenario,
        retention_factor,
        monthly: monthly_series(subset, params),
    })
}

#[derive(Default)]
struct MonthAcc {
    ca_baseline: f64,
    ca_scenario: f64,
    customers:   BTreeSet<CustomerId>,
}

fn monthly_series(dataset: &Dataset, params: &ScenarioParams) -> Vec<MonthlyScenarioPoint> {
    let mut months: BTreeMap<NaiveDate, MonthAcc> = BTreeMap::new();
    for txn in dataset.iter() {
        let acc = months.entry(txn.invoice_month).or_default();
        acc.ca_baseline += txn.amount_net;
        acc.ca_scenario += adjusted_amount(txn.amount_net, params);
        acc.customers.insert(txn.customer_id);
    }
    months
        .into_iter()
        .map(|(month, acc)| {
            let n = acc.customers.len() as f64;
            MonthlyScenarioPoint {
                month,
                ca_baseline:  acc.ca_baseline,
                ca_scenario:  acc.ca_scenario,
                clv_baseline: acc.ca_baseline / n,
                clv_scenario: acc.ca_scenario / n,
            }
        })
        .collect()
}
