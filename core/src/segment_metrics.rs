//! Segment metrics: business roll-up of transactions by RFM segment.
//!
//! Transactions are inner-joined to their customer's segment: customers
//! absent from the RFM output (net returners) drop out silently.

use crate::{
    config::SegmentPriorityTable,
    dataset::Dataset,
    error::{AnalyticsError, AnalyticsResult},
    rfm_engine::{Segment, SegmentedCustomer},
    types::CustomerId,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentMetrics {
    pub segment:      Segment,
    /// Distinct customers.
    pub clients:      usize,
    /// Total net revenue.
    pub ca_total:     f64,
    /// Mean net amount per invoice line.
    pub panier_moyen: f64,
    /// Distinct invoices.
    pub transactions: usize,
    /// Share of the joined total net revenue, in percent.
    pub part_ca:      f64,
    pub priority:     u8,
    pub action:       String,
}

/// Headline figures shown above the segment table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentOverview {
    pub total_clients:   usize,
    pub ca_total:        f64,
    /// Mean of per-invoice net totals over the whole dataset.
    pub panier_moyen:    f64,
    pub active_segments: usize,
}

#[derive(Debug, Default)]
struct SegmentAcc {
    customers: BTreeSet<CustomerId>,
    invoices:  BTreeSet<String>,
    total:     f64,
    lines:     usize,
}

/// Per-segment metrics, sorted by priority rank (1 first).
pub fn compute_segment_metrics(
    dataset: &Dataset,
    customers: &[SegmentedCustomer],
    priorities: &SegmentPriorityTable,
) -> AnalyticsResult<Vec<SegmentMetrics>> {
    let segment_of: HashMap<CustomerId, Segment> = customers
        .iter()
        .map(|c| (c.rfm.customer_id, c.segment))
        .collect();

    let mut acc: BTreeMap<Segment, SegmentAcc> = BTreeMap::new();
    for txn in dataset.iter() {
        let Some(&segment) = segment_of.get(&txn.customer_id) else {
            continue;
        };
        let a = acc.entry(segment).or_default();
        a.customers.insert(txn.customer_id);
        a.invoices.insert(txn.invoice_no.clone());
        a.total += txn.amount_net;
        a.lines += 1;
    }

    if acc.is_empty() {
        return Err(AnalyticsError::empty("segment metrics join"));
    }

    let grand_total: f64 = acc.values().map(|a| a.total).sum();
    if grand_total == 0.0 {
        log::warn!("Segment revenue sums to zero; revenue shares reported as 0");
    }

    let mut metrics = acc
        .into_iter()
        .map(|(segment, a)| {
            let meta = priorities.get(segment)?;
            Ok(SegmentMetrics {
                segment,
                clients:      a.customers.len(),
                ca_total:     a.total,
                panier_moyen: a.total / a.lines as f64,
                transactions: a.invoices.len(),
                part_ca:      if grand_total != 0.0 { a.total / grand_total * 100.0 } else { 0.0 },
                priority:     meta.priority,
                action:       meta.action.clone(),
            })
        })
        .collect::<AnalyticsResult<Vec<_>>>()?;

    metrics.sort_by_key(|m| m.priority);
    Ok(metrics)
}

pub fn segment_overview(
    dataset: &Dataset,
    customers: &[SegmentedCustomer],
    metrics: &[SegmentMetrics],
) -> AnalyticsResult<SegmentOverview> {
    let mut per_invoice: HashMap<&str, f64> = HashMap::new();
    for txn in dataset.iter() {
        *per_invoice.entry(txn.invoice_no.as_str()).or_insert(0.0) += txn.amount_net;
    }
    if per_invoice.is_empty() {
        return Err(AnalyticsError::empty("segment overview"));
    }
    let panier_moyen = per_invoice.values().sum::<f64>() / per_invoice.len() as f64;

    Ok(SegmentOverview {
        total_clients:   customers.len(),
        ca_total:        metrics.iter().map(|m| m.ca_total).sum(),
        panier_moyen,
        active_segments: customers
            .iter()
            .map(|c| c.segment)
            .collect::<BTreeSet<_>>()
            .len(),
    })
}

/// The `n` highest-priority segments present in `metrics`.
pub fn top_priorities(metrics: &[SegmentMetrics], n: usize) -> Vec<&SegmentMetrics> {
    let mut sorted: Vec<&SegmentMetrics> = metrics.iter().collect();
    sorted.sort_by_key(|m| m.priority);
    sorted.truncate(n);
    sorted
}
