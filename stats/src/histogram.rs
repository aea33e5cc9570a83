//! Equi-height histograms (§3.2 `Histogram`, §4.6 construction). Bucket boundaries
//! use the filter layer's own `Literal` so the cross-type total order
//! `null < bool < int < float < string` (the one axiom the planner leans on) is a
//! single shared `PartialOrd` impl rather than re-derived here.

use serde::{Deserialize, Serialize};
use strata_ql::Literal;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bucket {
    pub lower: Literal,
    /// Exclusive, except on the last bucket of a histogram, which is inclusive (§3.2).
    pub upper: Literal,
    pub count: i64,
    pub distinct_count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Histogram {
    pub buckets: Vec<Bucket>,
}

impl Histogram {
    /// Builds an equi-height histogram from a pre-sorted sample of `(value, count of
    /// that exact value)` pairs, splitting into at most `bucket_count` buckets of
    /// roughly `total / bucket_count` rows each. `bucket_count` must already have
    /// been validated into `1..=10_000` by the caller.
    pub fn build(sorted_values: &[(Literal, i64)], bucket_count: usize) -> Self {
        if sorted_values.is_empty() || bucket_count == 0 {
            return Self::default();
        }
        let total: i64 = sorted_values.iter().map(|(_, c)| c).sum();
        if total == 0 {
            return Self::default();
        }
        let target_per_bucket = (total as f64 / bucket_count as f64).max(1.0);

        let mut buckets = Vec::with_capacity(bucket_count);
        let mut i = 0usize;
        while i < sorted_values.len() {
            let lower = sorted_values[i].0.clone();
            let mut count = 0i64;
            let mut distinct = 0i64;
            while i < sorted_values.len() && (count as f64) < target_per_bucket {
                count += sorted_values[i].1;
                distinct += 1;
                i += 1;
            }
            let upper = if i < sorted_values.len() { sorted_values[i].0.clone() } else { lower.clone() };
            buckets.push(Bucket { lower, upper, count, distinct_count: distinct });
        }
        // Last bucket's upper bound is inclusive of the true maximum (§3.2).
        if let Some(last) = buckets.last_mut() {
            last.upper = sorted_values.last().unwrap().0.clone();
        }
        Self { buckets }
    }

    /// Locates the bucket containing `value`, honoring the last bucket's inclusive
    /// upper bound (§4.6).
    pub fn bucket_for(&self, value: &Literal) -> Option<&Bucket> {
        let last_index = self.buckets.len().checked_sub(1)?;
        self.buckets.iter().enumerate().find(|(i, b)| {
            let above_lower = *value >= b.lower;
            let below_upper = if *i == last_index { *value <= b.upper } else { *value < b.upper };
            above_lower && below_upper
        }).map(|(_, b)| b)
    }

    pub fn total_count(&self) -> i64 { self.buckets.iter().map(|b| b.count).sum() }
}
