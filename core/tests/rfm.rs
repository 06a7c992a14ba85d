use chrono::{Duration, NaiveDate, NaiveDateTime};
use retail_analytics_core::{
    dataset::{Dataset, Transaction},
    error::AnalyticsError,
    rfm_engine::{compute_rfm, scatter_sample, segment, Segment},
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn day(offset: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2010, 1, 1)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
        + Duration::days(offset)
}

/// Twenty customers with spread-out recency, frequency and spend.
/// Customer i places (i % 6) + 1 invoices of 10·i each, the last one
/// 5·i days into the year.
fn population() -> Dataset {
    let mut rows = Vec::new();
    for i in 1..=20i64 {
        let invoices = (i % 6) + 1;
        for k in 0..invoices {
            rows.push(Transaction::new(
                &format!("5{i:02}{k:02}"),
                i,
                day(5 * i - k),
                1,
                10.0 * i as f64,
                "United Kingdom",
            ));
        }
    }
    Dataset::from_transactions(rows)
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// Every RFM score is three digits in 1..=5 and rfm_total is their sum.
#[test]
fn scores_are_three_digits_between_one_and_five() {
    let records = compute_rfm(&population(), true).unwrap();
    assert_eq!(records.len(), 20);

    for r in &records {
        assert_eq!(r.rfm_score.len(), 3, "rfm_score '{}' must be 3 characters", r.rfm_score);
        assert!(
            r.rfm_score.chars().all(|c| ('1'..='5').contains(&c)),
            "rfm_score '{}' has a digit outside 1..5",
            r.rfm_score
        );
        assert_eq!(r.rfm_total, r.r_score + r.f_score + r.m_score);
        assert_eq!(r.rfm_score, format!("{}{}{}", r.r_score, r.f_score, r.m_score));
    }
}

/// Records come back in ascending customer order.
#[test]
fn records_sorted_by_customer() {
    let records = compute_rfm(&population(), true).unwrap();
    let ids: Vec<i64> = records.iter().map(|r| r.customer_id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
}

/// Recency is measured from the day after the latest invoice, so the
/// most recent customer sits at 1 day and scores R=5.
#[test]
fn recency_counts_from_snapshot_date() {
    let records = compute_rfm(&population(), true).unwrap();
    let latest = records.iter().find(|r| r.customer_id == 20).unwrap();
    assert_eq!(latest.recency, 1);
    assert_eq!(latest.r_score, 5);

    let oldest = records.iter().find(|r| r.customer_id == 1).unwrap();
    assert_eq!(oldest.r_score, 1, "customer 1 bought longest ago");
}

/// Higher spend never gets a lower M score.
#[test]
fn monetary_score_is_monotone() {
    let mut records = compute_rfm(&population(), true).unwrap();
    records.sort_by(|a, b| a.monetary.total_cmp(&b.monetary));
    for pair in records.windows(2) {
        assert!(
            pair[0].m_score <= pair[1].m_score,
            "monetary {} scored {} above monetary {} scored {}",
            pair[0].monetary,
            pair[0].m_score,
            pair[1].monetary,
            pair[1].m_score
        );
    }
}

/// Running the engine twice on the same snapshot gives identical output.
#[test]
fn compute_rfm_is_idempotent() {
    let dataset = population();
    let first = compute_rfm(&dataset, true).unwrap();
    let second = compute_rfm(&dataset, true).unwrap();
    assert_eq!(first, second);
}

/// Customers whose net spend is ≤ 0 are not scored.
#[test]
fn net_returners_are_excluded() {
    let dataset = Dataset::from_transactions(vec![
        Transaction::new("6001", 1, day(0), 1, 50.0, "France"),
        Transaction::new("6002", 2, day(1), 1, 10.0, "France"),
        Transaction::new("C6003", 2, day(2), 3, 10.0, "France"),
        Transaction::new("6004", 3, day(3), 2, 10.0, "France"),
    ]);

    let records = compute_rfm(&dataset, true).unwrap();
    let ids: Vec<i64> = records.iter().map(|r| r.customer_id).collect();
    assert_eq!(ids, vec![1, 3], "customer 2 returned more than bought");
    assert!(records.iter().all(|r| r.monetary > 0.0));
}

/// Excluding returns drops credit notes from both the snapshot and the
/// per-customer aggregates.
#[test]
fn excluding_returns_changes_monetary() {
    let dataset = Dataset::from_transactions(vec![
        Transaction::new("7001", 1, day(0), 10, 10.0, "Spain"),
        Transaction::new("C7002", 1, day(5), 3, 10.0, "Spain"),
        Transaction::new("7003", 2, day(1), 1, 40.0, "Spain"),
    ]);

    let with_returns = compute_rfm(&dataset, true).unwrap();
    let without = compute_rfm(&dataset, false).unwrap();

    let m = |records: &[retail_analytics_core::rfm_engine::RfmRecord]| {
        records.iter().find(|r| r.customer_id == 1).unwrap().monetary
    };
    assert_eq!(m(&with_returns), 70.0);
    assert_eq!(m(&without), 100.0);

    let f = |records: &[retail_analytics_core::rfm_engine::RfmRecord]| {
        records.iter().find(|r| r.customer_id == 1).unwrap().frequency
    };
    assert_eq!(f(&with_returns), 2, "the credit note is a distinct invoice");
    assert_eq!(f(&without), 1);
}

/// Identical customers collapse R and M to a single bucket instead of
/// failing; F still spreads because ties are broken by position.
#[test]
fn degenerate_values_reduce_buckets() {
    let rows = (1..=5)
        .map(|i| Transaction::new(&format!("800{i}"), i, day(10), 1, 25.0, "Italy"))
        .collect();
    let records = compute_rfm(&Dataset::from_transactions(rows), true).unwrap();

    assert!(records.iter().all(|r| r.r_score == 5), "single recency bucket maps to R=5");
    assert!(records.iter().all(|r| r.m_score == 1), "single monetary bucket maps to M=1");
    let f: Vec<u8> = records.iter().map(|r| r.f_score).collect();
    assert_eq!(f, vec![1, 2, 3, 4, 5]);
}

/// An empty snapshot has no snapshot date.
#[test]
fn empty_snapshot_is_an_error() {
    let err = compute_rfm(&Dataset::default(), true).unwrap_err();
    assert!(matches!(err, AnalyticsError::EmptySubset { .. }), "got {err:?}");

    // Only credit notes, with returns excluded: nothing left.
    let returns_only = Dataset::from_transactions(vec![
        Transaction::new("C9001", 1, day(0), 1, 5.0, "Germany"),
    ]);
    assert!(compute_rfm(&returns_only, false).is_err());
    assert!(compute_rfm(&returns_only, true).unwrap().is_empty());
}

/// Segment assignment follows the rule table on the computed scores.
#[test]
fn segment_uses_score_triple() {
    let customers = segment(compute_rfm(&population(), true).unwrap());
    for c in &customers {
        assert_eq!(
            c.segment,
            Segment::classify(c.rfm.r_score, c.rfm.f_score, c.rfm.m_score)
        );
    }
}

/// The scatter sample is capped, deterministic and keeps input order.
#[test]
fn scatter_sample_is_capped_and_stable() {
    let customers = segment(compute_rfm(&population(), true).unwrap());

    let all = scatter_sample(&customers, 1000, 42);
    assert_eq!(all, customers, "under the cap every customer is returned");

    let a = scatter_sample(&customers, 7, 42);
    let b = scatter_sample(&customers, 7, 42);
    assert_eq!(a.len(), 7);
    assert_eq!(a, b);
    let ids: Vec<i64> = a.iter().map(|c| c.rfm.customer_id).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}
