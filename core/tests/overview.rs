use chrono::{NaiveDate, NaiveDateTime};
use retail_analytics_core::{
    config::AnalyticsConfig,
    dashboard::Dashboard,
    dataset::{Dataset, Transaction},
    error::AnalyticsError,
    filter::{Geography, TransactionFilter},
    kpi_summary::{compute_overview, monthly_revenue, north_star, OverviewKpis},
};
use std::sync::Arc;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(8, 15, 0).unwrap()
}

/// Customer 1 buys on day 0 and again 120 days later; customer 2 buys
/// twice within a month; customer 3 buys once and returns part of it.
fn shop() -> Dataset {
    Dataset::from_transactions(vec![
        Transaction::new("1", 1, at(2010, 1, 1), 1, 100.0, "United Kingdom"),
        Transaction::new("2", 1, at(2010, 5, 1), 1, 50.0, "United Kingdom"),
        Transaction::new("3", 2, at(2010, 2, 10), 2, 30.0, "USA"),
        Transaction::new("4", 2, at(2010, 3, 1), 1, 40.0, "USA"),
        Transaction::new("5", 3, at(2010, 3, 5), 1, 80.0, "Japan"),
        Transaction::new("C6", 3, at(2010, 3, 20), 1, 20.0, "Japan"),
    ])
}

fn overview_of(dataset: &Dataset) -> OverviewKpis {
    compute_overview(dataset, &dataset.first_purchases(), &AnalyticsConfig::default()).unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// Active clients and the baseline CLV over net revenue.
#[test]
fn headline_kpis() {
    let kpis = overview_of(&shop());

    assert_eq!(kpis.active_clients, 3);
    assert_eq!(kpis.rfm_count, 3, "every customer has positive net spend");
    // (100 + 50 + 60 + 40 + 80 − 20) / 3
    assert!((kpis.clv_baseline - 310.0 / 3.0).abs() < 1e-9, "clv={}", kpis.clv_baseline);
    assert_eq!(kpis.period_start, at(2010, 1, 1));
    assert_eq!(kpis.period_end, at(2010, 5, 1));
}

/// North Star counts only lines within 90 days of each first purchase.
#[test]
fn north_star_uses_first_purchase_window() {
    // Customer 1: 100 (the May line is 120 days out); customer 2: 100;
    // customer 3: 80 − 20.
    let value = north_star(&shop(), 90);
    assert!((value - 260.0 / 3.0).abs() < 1e-9, "north_star={value}");

    // With a 1-day window only the first-day lines remain.
    let tight = north_star(&shop(), 1);
    assert!((tight - (100.0 + 60.0 + 80.0) / 3.0).abs() < 1e-9, "tight={tight}");
}

/// An empty dataset gives a North Star of 0 rather than NaN.
#[test]
fn north_star_zero_without_customers() {
    assert_eq!(north_star(&Dataset::default(), 90), 0.0);
}

/// Average revenue per cohort age is the mean of the per-age totals.
#[test]
fn average_revenue_per_age() {
    // Age 0: 100 + 60 + 80 − 20 = 220; age 1: 40; age 4: 50.
    let kpis = overview_of(&shop());
    assert!((kpis.avg_rev_per_age - 310.0 / 3.0).abs() < 1e-9, "avg={}", kpis.avg_rev_per_age);
}

/// Monthly revenue is net of returns and keyed by invoice month.
#[test]
fn monthly_revenue_series() {
    let series = monthly_revenue(&shop());
    let march = NaiveDate::from_ymd_opt(2010, 3, 1).unwrap();
    assert_eq!(series.len(), 4);
    assert_eq!(series.get(&march), Some(&100.0));
}

/// The overview on an empty selection reports "no data".
#[test]
fn empty_selection_is_an_error() {
    let board = Dashboard::new(Arc::new(shop()), AnalyticsConfig::default());
    let filter = TransactionFilter {
        geography: Geography::Countries { names: vec!["Brazil".into()] },
        ..TransactionFilter::all()
    };
    let err = board.overview(&filter).unwrap_err();
    assert!(matches!(err, AnalyticsError::EmptySubset { .. }), "got {err:?}");
}

/// Continent filtering feeds the overview report.
#[test]
fn overview_report_for_one_continent() {
    let board = Dashboard::new(Arc::new(shop()), AnalyticsConfig::default());
    let report = board
        .overview(&TransactionFilter {
            geography: Geography::Continent { name: "America".into() },
            ..TransactionFilter::all()
        })
        .unwrap();

    assert_eq!(report.kpis.active_clients, 1);
    assert_eq!(report.kpis.clv_baseline, 100.0);
    assert_eq!(report.monthly_revenue.len(), 2);
}

/// Customers whose returns outweigh their purchases are active but not
/// profiled by RFM.
#[test]
fn rfm_count_skips_net_returners() {
    let mut rows = shop().transactions().to_vec();
    rows.push(Transaction::new("C7", 4, at(2010, 4, 2), 1, 15.0, "France"));
    let kpis = overview_of(&Dataset::from_transactions(rows));

    assert_eq!(kpis.active_clients, 4);
    assert_eq!(kpis.rfm_count, 3);
}

/// Under an invoice-date filter the North Star window still starts at
/// each customer's first purchase over the whole history.
#[test]
fn north_star_anchors_on_full_history() {
    let config = AnalyticsConfig {
        north_star_window_days: 10,
        ..AnalyticsConfig::default()
    };
    let board = Dashboard::new(Arc::new(shop()), config);
    let report = board
        .overview(&TransactionFilter {
            invoice_from: Some(NaiveDate::from_ymd_opt(2010, 3, 1).unwrap()),
            ..TransactionFilter::all()
        })
        .unwrap();

    // Customers 1 and 2 first bought before March, outside the window
    // of every remaining line; customer 3's 80 is the only line inside.
    assert!(
        (report.kpis.north_star - 80.0).abs() < 1e-9,
        "north_star={}",
        report.kpis.north_star
    );
}
