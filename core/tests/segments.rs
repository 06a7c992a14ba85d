use chrono::{Duration, NaiveDate, NaiveDateTime};
use retail_analytics_core::{
    config::{AnalyticsConfig, SegmentPriorityTable},
    dashboard::{Dashboard, SegmentQuery},
    dataset::{Dataset, Transaction},
    rfm_engine::{compute_rfm, segment},
    segment_metrics::{compute_segment_metrics, segment_overview, top_priorities},
};
use std::{collections::BTreeSet, sync::Arc};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn day(offset: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2011, 3, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        + Duration::days(offset)
}

/// Thirty buying customers with varied habits, plus customer 999 who
/// returned more than they bought.
fn customer_base() -> Dataset {
    let mut rows = Vec::new();
    for i in 1..=30i64 {
        let invoices = (i * 7) % 5 + 1;
        for k in 0..invoices {
            rows.push(Transaction::new(
                &format!("{}", 100_000 + i * 100 + k),
                i,
                day((i * 13) % 90 - k * 3),
                (i % 4) + 1,
                2.5 * i as f64,
                if i % 3 == 0 { "Germany" } else { "United Kingdom" },
            ));
        }
    }
    rows.push(Transaction::new("300001", 999, day(10), 1, 20.0, "France"));
    rows.push(Transaction::new("C300002", 999, day(11), 4, 20.0, "France"));
    Dataset::from_transactions(rows)
}

fn positive_customers(dataset: &Dataset) -> usize {
    let mut net = std::collections::BTreeMap::new();
    for t in dataset.iter() {
        *net.entry(t.customer_id).or_insert(0.0) += t.amount_net;
    }
    net.values().filter(|&&v| v > 0.0).count()
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// Segment client counts add up to at most the positive-monetary customers.
#[test]
fn clients_sum_bounded_by_positive_customers() {
    let dataset = customer_base();
    let customers = segment(compute_rfm(&dataset, true).unwrap());
    let metrics =
        compute_segment_metrics(&dataset, &customers, &SegmentPriorityTable::default()).unwrap();

    let clients: usize = metrics.iter().map(|m| m.clients).sum();
    let positive = positive_customers(&dataset);
    assert!(clients <= positive, "clients={clients} positive={positive}");
    assert_eq!(clients, 30, "every buying customer lands in exactly one segment");
}

/// Rows come out in priority order, 1 first.
#[test]
fn metrics_sorted_by_priority() {
    let dataset = customer_base();
    let customers = segment(compute_rfm(&dataset, true).unwrap());
    let metrics =
        compute_segment_metrics(&dataset, &customers, &SegmentPriorityTable::default()).unwrap();

    let ranks: Vec<u8> = metrics.iter().map(|m| m.priority).collect();
    let mut sorted = ranks.clone();
    sorted.sort_unstable();
    assert_eq!(ranks, sorted);
    assert!(ranks.iter().all(|r| (1..=10).contains(r)));
}

/// Revenue shares add up to 100 and each segment's figures are
/// consistent with the joined transactions.
#[test]
fn revenue_shares_sum_to_hundred() {
    let dataset = customer_base();
    let customers = segment(compute_rfm(&dataset, true).unwrap());
    let metrics =
        compute_segment_metrics(&dataset, &customers, &SegmentPriorityTable::default()).unwrap();

    let share: f64 = metrics.iter().map(|m| m.part_ca).sum();
    assert!((share - 100.0).abs() < 1e-9, "shares sum to {share}");

    for m in &metrics {
        assert!(m.transactions >= m.clients, "{}: fewer invoices than clients", m.segment);
        assert!(m.ca_total > 0.0);
        assert!(!m.action.is_empty());
    }
}

/// The net returner's lines drop out of the join.
#[test]
fn net_returner_lines_drop_out() {
    let dataset = customer_base();
    let customers = segment(compute_rfm(&dataset, true).unwrap());
    assert!(customers.iter().all(|c| c.rfm.customer_id != 999));

    let metrics =
        compute_segment_metrics(&dataset, &customers, &SegmentPriorityTable::default()).unwrap();
    let joined: f64 = metrics.iter().map(|m| m.ca_total).sum();
    let buyers: f64 = dataset
        .iter()
        .filter(|t| t.customer_id != 999)
        .map(|t| t.amount_net)
        .sum();
    assert!((joined - buyers).abs() < 1e-6, "joined={joined} buyers={buyers}");
}

/// Overview figures and the top-priority pick.
#[test]
fn overview_and_top_priorities() {
    let dataset = customer_base();
    let customers = segment(compute_rfm(&dataset, true).unwrap());
    let metrics =
        compute_segment_metrics(&dataset, &customers, &SegmentPriorityTable::default()).unwrap();
    let overview = segment_overview(&dataset, &customers, &metrics).unwrap();

    assert_eq!(overview.total_clients, customers.len());
    let distinct: BTreeSet<_> = customers.iter().map(|c| c.segment).collect();
    assert_eq!(overview.active_segments, distinct.len());
    assert_eq!(overview.active_segments, metrics.len());

    let top = top_priorities(&metrics, 3);
    assert_eq!(top.len(), metrics.len().min(3));
    for (picked, row) in top.iter().zip(metrics.iter()) {
        assert_eq!(picked.segment, row.segment);
    }
}

/// The segment page runs RFM, metrics, overview and sample in one call.
#[test]
fn segment_report_via_dashboard() {
    let mut config = AnalyticsConfig::default();
    config.rfm.sample_cap = 10;
    let board = Dashboard::new(Arc::new(customer_base()), config);

    let report = board.segments(&SegmentQuery::default()).unwrap();
    assert_eq!(report.customers.len(), 30);
    assert_eq!(report.scatter_sample.len(), 10);
    assert!(report.top_priorities.len() <= 3);
    assert_eq!(
        report.metrics.iter().map(|m| m.clients).sum::<usize>(),
        report.overview.total_clients
    );
}
