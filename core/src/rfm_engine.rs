//! RFM engine: per-customer Recency / Frequency / Monetary scoring and
//! rule-based segment classification.
//!
//! Execution: pure function of the dataset snapshot passed in.
//! Snapshot date = latest invoice timestamp in that snapshot + 1 day.
//!
//! Scoring:
//!   R: quantile buckets of recency, inverted (most recent → 5)
//!   F: quantile buckets of first-tie-broken frequency rank
//!   M: quantile buckets of monetary, ascending
//! Customers with monetary ≤ 0 (net returners) are not scored.
//!
//! The per-customer aggregation (last purchase, distinct invoices, net
//! sum) runs as a polars group-by over the snapshot's columnar view.

use crate::{
    dataset::{Dataset, AMOUNT_NET, CUSTOMER_ID, INVOICE_NO, INVOICE_TS},
    error::{AnalyticsError, AnalyticsResult},
    quantile::{qcut, rank_first},
    rng::{sample_indices, SampleRng},
    types::CustomerId,
};
use chrono::Duration;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Number of score levels per dimension.
pub const SCORE_LEVELS: usize = 5;

const SECONDS_PER_DAY: i64 = 86_400;

// ── Segments ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Segment {
    Champions,
    Loyaux,
    #[serde(rename = "Potentiels Loyaux")]
    PotentielsLoyaux,
    Nouveaux,
    Prometteurs,
    #[serde(rename = "Besoin d'Attention")]
    BesoinAttention,
    #[serde(rename = "À Risque")]
    ARisque,
    Hibernants,
    Perdus,
    Autres,
}

impl Segment {
    pub const ALL: [Segment; 10] = [
        Segment::Champions,
        Segment::Loyaux,
        Segment::PotentielsLoyaux,
        Segment::Nouveaux,
        Segment::Prometteurs,
        Segment::BesoinAttention,
        Segment::ARisque,
        Segment::Hibernants,
        Segment::Perdus,
        Segment::Autres,
    ];

    /// Segments exported as the activation list for campaigns.
    pub const ACTIVATION: [Segment; 4] = [
        Segment::Champions,
        Segment::Loyaux,
        Segment::PotentielsLoyaux,
        Segment::BesoinAttention,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Segment::Champions        => "Champions",
            Segment::Loyaux           => "Loyaux",
            Segment::PotentielsLoyaux => "Potentiels Loyaux",
            Segment::Nouveaux         => "Nouveaux",
            Segment::Prometteurs      => "Prometteurs",
            Segment::BesoinAttention  => "Besoin d'Attention",
            Segment::ARisque          => "À Risque",
            Segment::Hibernants       => "Hibernants",
            Segment::Perdus           => "Perdus",
            Segment::Autres           => "Autres",
        }
    }

    /// Rule table, evaluated top to bottom. Conditions overlap; the first
    /// match wins.
    pub fn classify(r: u8, f: u8, m: u8) -> Segment {
        if r >= 4 && f >= 4 && m >= 4 {
            Segment::Champions
        } else if r >= 3 && f >= 4 && m >= 4 {
            Segment::Loyaux
        } else if r >= 4 && f >= 3 && m >= 3 {
            Segment::PotentielsLoyaux
        } else if r >= 4 && f <= 2 {
            Segment::Nouveaux
        } else if r >= 3 && f <= 2 && m >= 3 {
            Segment::Prometteurs
        } else if r == 3 && f >= 3 && m >= 3 {
            Segment::BesoinAttention
        } else if r <= 2 && f >= 3 && m >= 3 {
            Segment::ARisque
        } else if r <= 2 && f <= 2 && m >= 3 {
            Segment::Hibernants
        } else if r <= 2 && f <= 2 && m <= 2 {
            Segment::Perdus
        } else {
            Segment::Autres
        }
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ── Records ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfmRecord {
    pub customer_id: CustomerId,
    /// Days between the snapshot date and the customer's last purchase.
    pub recency:     i64,
    /// Distinct invoices.
    pub frequency:   u32,
    /// Sum of net amounts. Always > 0 for scored customers.
    pub monetary:    f64,
    pub r_score:     u8,
    pub f_score:     u8,
    pub m_score:     u8,
    /// The three digits concatenated, e.g. "545".
    pub rfm_score:   String,
    /// r + f + m, used as a numeric sort key.
    pub rfm_total:   u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentedCustomer {
    #[serde(flatten)]
    pub rfm:     RfmRecord,
    pub segment: Segment,
}

// ── Operations ───────────────────────────────────────────────────────────────

/// Score every customer in the snapshot.
///
/// Returns `EmptySubset` when the snapshot (after optional return
/// exclusion) has no rows, since the snapshot date is then undefined.
/// Records are ordered by ascending customer id.
pub fn compute_rfm(dataset: &Dataset, include_returns: bool) -> AnalyticsResult<Vec<RfmRecord>> {
    let filtered;
    let snapshot_rows = if include_returns {
        dataset
    } else {
        filtered = dataset.without_returns();
        &filtered
    };

    let (_, latest) = snapshot_rows
        .period()
        .ok_or_else(|| AnalyticsError::empty("RFM snapshot"))?;
    let snapshot_ts = (latest + Duration::days(1)).and_utc().timestamp();

    let per_customer = snapshot_rows
        .to_frame()?
        .lazy()
        .group_by([col(CUSTOMER_ID)])
        .agg([
            col(INVOICE_TS).max().alias("LastPurchase"),
            col(INVOICE_NO).n_unique().alias("Frequency"),
            col(AMOUNT_NET).sum().alias("Monetary"),
        ])
        .with_columns([(lit(snapshot_ts) - col("LastPurchase"))
            .floor_div(lit(SECONDS_PER_DAY))
            .alias("Recency")])
        .filter(col("Monetary").gt(lit(0.0)))
        .sort([CUSTOMER_ID], SortMultipleOptions::default())
        .collect()?;

    if per_customer.height() == 0 {
        log::debug!("No customer with positive monetary value in snapshot");
        return Ok(Vec::new());
    }

    let customer_ids: Vec<CustomerId> = per_customer
        .column(CUSTOMER_ID)?
        .i64()?
        .into_no_null_iter()
        .collect();
    let recency: Vec<i64> = per_customer
        .column("Recency")?
        .i64()?
        .into_no_null_iter()
        .collect();
    let frequency: Vec<u32> = per_customer
        .column("Frequency")?
        .cast(&DataType::UInt32)?
        .u32()?
        .into_no_null_iter()
        .collect();
    let monetary: Vec<f64> = per_customer
        .column("Monetary")?
        .f64()?
        .into_no_null_iter()
        .collect();

    let recency_values: Vec<f64> = recency.iter().map(|&r| r as f64).collect();
    let frequency_values: Vec<f64> = frequency.iter().map(|&f| f64::from(f)).collect();

    let (r_bins, r_buckets) = qcut(&recency_values, SCORE_LEVELS)?;
    let (f_bins, f_buckets) = qcut(&rank_first(&frequency_values)?, SCORE_LEVELS)?;
    let (m_bins, m_buckets) = qcut(&monetary, SCORE_LEVELS)?;
    log::debug!(
        "RFM buckets for {} customers: R={} F={} M={}",
        customer_ids.len(),
        r_bins.bucket_count(),
        f_bins.bucket_count(),
        m_bins.bucket_count()
    );

    let raw = customer_ids
        .into_iter()
        .zip(recency)
        .zip(frequency)
        .zip(monetary)
        .map(|(((id, r), f), m)| (id, r, f, m));

    let records = raw
        .enumerate()
        .map(|(i, (customer_id, recency, frequency, monetary))| {
            let r_score = (SCORE_LEVELS - r_buckets[i]) as u8;
            let f_score = (f_buckets[i] + 1) as u8;
            let m_score = (m_buckets[i] + 1) as u8;
            RfmRecord {
                customer_id,
                recency,
                frequency,
                monetary,
                r_score,
                f_score,
                m_score,
                rfm_score: format!("{r_score}{f_score}{m_score}"),
                rfm_total: r_score + f_score + m_score,
            }
        })
        .collect();

    Ok(records)
}

/// Attach a segment to each scored customer.
pub fn segment(records: Vec<RfmRecord>) -> Vec<SegmentedCustomer> {
    records
        .into_iter()
        .map(|rfm| {
            let segment = Segment::classify(rfm.r_score, rfm.f_score, rfm.m_score);
            SegmentedCustomer { rfm, segment }
        })
        .collect()
}

/// Deterministic subset of at most `cap` customers, in input order.
/// Used to keep scatter views bounded on large customer bases.
pub fn scatter_sample(
    customers: &[SegmentedCustomer],
    cap: usize,
    seed: u64,
) -> Vec<SegmentedCustomer> {
    if customers.len() <= cap {
        return customers.to_vec();
    }
    let mut rng = SampleRng::new(seed);
    sample_indices(customers.len(), cap, &mut rng)
        .into_iter()
        .map(|i| customers[i].clone())
        .collect()
}
