//! Dashboard facade: the entry points the presentation layer calls.
//!
//! Each page is a pure function of (loaded dataset, query struct):
//!   1. overview: headline KPIs + monthly revenue
//!   2. cohorts : retention matrix, revenue curves, cohort KPIs
//!   3. segments: RFM table, segment metrics, priorities, scatter sample
//!   4. scenario: baseline vs scenario KPI comparison
//!
//! RULES:
//!   - The dataset is shared read-only; every call filters into its own
//!     working copy.
//!   - No call keeps state between invocations.

use crate::{
    cohort_engine::{
        assign_cohort_age, cohort_revenue_by_age, retention_matrix, revenue_by_age,
        RetentionMatrix,
    },
    config::AnalyticsConfig,
    dataset::Dataset,
    error::AnalyticsResult,
    filter::TransactionFilter,
    kpi_summary::{cohort_kpis, compute_overview, monthly_revenue, CohortKpis, OverviewKpis},
    rfm_engine::{compute_rfm, scatter_sample, segment, SegmentedCustomer},
    scenario_simulator::{simulate, ScenarioOutcome, ScenarioParams},
    segment_metrics::{
        compute_segment_metrics, segment_overview, top_priorities, SegmentMetrics,
        SegmentOverview,
    },
    types::{CohortAge, CohortLabel},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};

/// Number of segments highlighted as activation priorities.
pub const TOP_PRIORITY_COUNT: usize = 3;

// ── Queries ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CohortQuery {
    #[serde(default)]
    pub filter: TransactionFilter,
    /// Cohort to break down by age on its own.
    #[serde(default)]
    pub focus:  Option<CohortLabel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentQuery {
    #[serde(default)]
    pub filter:          TransactionFilter,
    #[serde(default = "default_include_returns")]
    pub include_returns: bool,
}

fn default_include_returns() -> bool {
    true
}

impl Default for SegmentQuery {
    fn default() -> Self {
        Self {
            filter:          TransactionFilter::default(),
            include_returns: default_include_returns(),
        }
    }
}

// ── Reports ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewReport {
    pub kpis:            OverviewKpis,
    pub monthly_revenue: BTreeMap<NaiveDate, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortFocus {
    pub cohort:         CohortLabel,
    pub revenue_by_age: BTreeMap<CohortAge, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortReport {
    pub cohorts:        Vec<CohortLabel>,
    pub retention:      RetentionMatrix,
    pub revenue_by_age: BTreeMap<CohortAge, f64>,
    pub focus:          Option<CohortFocus>,
    pub kpis:           CohortKpis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentReport {
    pub customers:       Vec<SegmentedCustomer>,
    pub metrics:         Vec<SegmentMetrics>,
    pub overview:        SegmentOverview,
    pub top_priorities:  Vec<SegmentMetrics>,
    pub scatter_sample:  Vec<SegmentedCustomer>,
}

// ── Facade ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Dashboard {
    dataset: Arc<Dataset>,
    config:  AnalyticsConfig,
}

impl Dashboard {
    pub fn new(dataset: Arc<Dataset>, config: AnalyticsConfig) -> Self {
        Self { dataset, config }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn overview(&self, filter: &TransactionFilter) -> AnalyticsResult<OverviewReport> {
        let working = self.dataset.filter(filter);
        let first_purchases = self.dataset.first_purchases();
        Ok(OverviewReport {
            kpis:            compute_overview(&working, &first_purchases, &self.config)?,
            monthly_revenue: monthly_revenue(&working),
        })
    }

    pub fn cohorts(&self, query: &CohortQuery) -> AnalyticsResult<CohortReport> {
        let working = self.dataset.filter(&query.filter);
        let frame = assign_cohort_age(&working)?;
        let retention = retention_matrix(&frame)?;
        let kpis = cohort_kpis(&working, &retention, &self.config)?;

        Ok(CohortReport {
            cohorts: working.cohort_labels(),
            revenue_by_age: revenue_by_age(&frame)?,
            focus: query
                .focus
                .map(|cohort| {
                    cohort_revenue_by_age(&frame, cohort)
                        .map(|revenue_by_age| CohortFocus { cohort, revenue_by_age })
                })
                .transpose()?,
            retention,
            kpis,
        })
    }

    pub fn segments(&self, query: &SegmentQuery) -> AnalyticsResult<SegmentReport> {
        let working = self.dataset.filter(&query.filter);
        let customers = segment(compute_rfm(&working, query.include_returns)?);
        let metrics =
            compute_segment_metrics(&working, &customers, &self.config.segment_priorities)?;
        let overview = segment_overview(&working, &customers, &metrics)?;
        let top = top_priorities(&metrics, TOP_PRIORITY_COUNT)
            .into_iter()
            .cloned()
            .collect();
        let sample = scatter_sample(
            &customers,
            self.config.rfm.sample_cap,
            self.config.rfm.sample_seed,
        );

        Ok(SegmentReport {
            customers,
            metrics,
            overview,
            top_priorities: top,
            scatter_sample: sample,
        })
    }

    pub fn scenario(&self, params: &ScenarioParams) -> AnalyticsResult<ScenarioOutcome> {
        simulate(&self.dataset, params)
    }
}
