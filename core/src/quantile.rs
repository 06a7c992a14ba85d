//! Equal-population quantile binning.
//!
//! Edges are linear-interpolated quantiles of the input, computed by
//! polars. When the input has too few distinct values for `target`
//! strictly increasing edges, the bucket count is reduced one at a time
//! until the edges are unique. Binning never fails on degenerate input;
//! errors only come from the frame layer.

use crate::error::AnalyticsResult;
use polars::prelude::*;

fn strictly_increasing(edges: &[f64]) -> bool {
    edges.windows(2).all(|w| w[1] > w[0])
}

fn edges_for(values: &Float64Chunked, buckets: usize) -> AnalyticsResult<Vec<f64>> {
    let mut edges = Vec::with_capacity(buckets + 1);
    for i in 0..=buckets {
        let p = i as f64 / buckets as f64;
        if let Some(edge) = values.quantile(p, QuantileInterpolOptions::Linear)? {
            edges.push(edge);
        }
    }
    Ok(edges)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bins {
    /// `buckets + 1` strictly increasing edges (a single edge when every
    /// value is identical).
    pub edges: Vec<f64>,
}

impl Bins {
    /// Fit up to `target` buckets on `values`. NaN values are ignored.
    pub fn fit(values: &[f64], target: usize) -> AnalyticsResult<Self> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if finite.is_empty() {
            return Ok(Self { edges: Vec::new() });
        }
        let column = Float64Chunked::from_slice("value", &finite);

        for buckets in (1..=target.max(1)).rev() {
            let edges = edges_for(&column, buckets)?;
            if strictly_increasing(&edges) && edges.len() == buckets + 1 {
                if buckets < target {
                    log::debug!("Quantile binning reduced from {target} to {buckets} buckets");
                }
                return Ok(Self { edges });
            }
        }

        // All values identical: one bucket holding everything.
        log::debug!("Quantile binning collapsed to a single bucket");
        Ok(Self { edges: vec![finite[0]] })
    }

    pub fn bucket_count(&self) -> usize {
        self.edges.len().saturating_sub(1).max(usize::from(!self.edges.is_empty()))
    }

    /// Zero-based bucket of `value`. Buckets are right-closed intervals
    /// `(e[i], e[i+1]]`, with the lowest edge included in bucket 0.
    pub fn bucket_of(&self, value: f64) -> usize {
        if self.edges.len() < 2 {
            return 0;
        }
        let upper = &self.edges[1..];
        let idx = upper.partition_point(|&e| e < value);
        idx.min(upper.len() - 1)
    }
}

/// Bucket every value: `(bins, bucket index per value)`.
pub fn qcut(values: &[f64], target: usize) -> AnalyticsResult<(Bins, Vec<usize>)> {
    let bins = Bins::fit(values, target)?;
    let buckets = values.iter().map(|&v| bins.bucket_of(v)).collect();
    Ok((bins, buckets))
}

/// 1-based ranks in input order, ties broken by position ("first").
pub fn rank_first(values: &[f64]) -> AnalyticsResult<Vec<f64>> {
    let ranks = Series::new("value", values)
        .rank(
            RankOptions {
                method:     RankMethod::Ordinal,
                descending: false,
            },
            None,
        )
        .cast(&DataType::Float64)?;
    Ok(ranks.f64()?.into_no_null_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_distinct_values_form_five_buckets_of_two() {
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        let (bins, buckets) = qcut(&values, 5).unwrap();
        assert_eq!(bins.bucket_count(), 5);
        assert_eq!(buckets, vec![0, 0, 1, 1, 2, 2, 3, 3, 4, 4]);
    }

    #[test]
    fn edges_interpolate_linearly() {
        let bins = Bins::fit(&[1.0, 2.0, 3.0, 4.0, 5.0], 4).unwrap();
        assert_eq!(bins.edges, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let bins = Bins::fit(&[0.0, 10.0], 5).unwrap();
        let expected = [0.0, 2.0, 4.0, 6.0, 8.0, 10.0];
        assert_eq!(bins.edges.len(), expected.len());
        for (edge, want) in bins.edges.iter().zip(expected) {
            assert!((edge - want).abs() < 1e-9, "edge {edge} != {want}");
        }
    }

    #[test]
    fn lowest_value_lands_in_first_bucket() {
        let (_, buckets) = qcut(&[3.0, 1.0, 2.0], 5).unwrap();
        assert_eq!(buckets[1], 0);
        assert_eq!(buckets[0], 4);
    }

    #[test]
    fn duplicate_edges_reduce_bucket_count() {
        // Heavy tie at 1: the 0.2/0.4/0.6 quantiles coincide.
        let values = [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 3.0, 4.0];
        let bins = Bins::fit(&values, 5).unwrap();
        assert!(bins.bucket_count() < 5);
        assert!(strictly_increasing(&bins.edges));
    }

    #[test]
    fn identical_values_collapse_to_one_bucket() {
        let (bins, buckets) = qcut(&[7.0, 7.0, 7.0], 5).unwrap();
        assert_eq!(bins.bucket_count(), 1);
        assert!(buckets.iter().all(|&b| b == 0));
    }

    #[test]
    fn rank_first_breaks_ties_by_position() {
        assert_eq!(rank_first(&[2.0, 1.0, 2.0, 1.0]).unwrap(), vec![3.0, 1.0, 4.0, 2.0]);
    }
}
