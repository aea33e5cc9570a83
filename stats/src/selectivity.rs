//! The selectivity API of §4.6: estimates the fraction of rows a filter passes,
//! using per-field index histograms where available and documented fallbacks
//! otherwise. Pure arithmetic over already-collected stats — never touches the KV.

use crate::index_stats::IndexStats;
use strata_ql::ast::{ComparisonOperator, Predicate};
use strata_ql::collation::{Collatable, RangeBound};
use strata_ql::Literal;

/// Selectivity assumed for an equality predicate when no index statistics exist at
/// all for the field (neither a histogram nor even a bare distinct count) — a
/// conservative guess rather than a hard failure, since the planner must still be
/// able to cost a plan over an un-analyzed table (§3.4: "stale statistics remain
/// usable; planner degrades gracefully").
const DEFAULT_EQ_SELECTIVITY: f64 = 0.1;
/// Selectivity assumed for an `IS NULL` / `IS NOT NULL` predicate absent any stats.
const DEFAULT_NULL_SELECTIVITY: f64 = 0.05;

/// Looks up the statistics the estimator needs for one field of one record type.
/// Implemented by the statistics manager's in-memory snapshot (§5); kept as a
/// trait here so this crate's arithmetic never depends on how stats are stored.
pub trait StatsSource {
    fn index_stats(&self, record_type: &str, field: &str) -> Option<&IndexStats>;
}

/// `selectivity(filter, record_type) -> f64 in [0, 1]` (§4.6).
pub fn selectivity(filter: &Predicate, record_type: &str, stats: &dyn StatsSource) -> f64 {
    let raw = match filter {
        Predicate::True => 1.0,
        Predicate::False => 0.0,
        Predicate::And(a, b) => selectivity(a, record_type, stats) * selectivity(b, record_type, stats),
        Predicate::Or(a, b) => {
            let sa = selectivity(a, record_type, stats);
            let sb = selectivity(b, record_type, stats);
            1.0 - (1.0 - sa) * (1.0 - sb)
        }
        Predicate::Not(p) => 1.0 - selectivity(p, record_type, stats),
        Predicate::IsNull { field, negated } => {
            let frac = match stats.index_stats(record_type, field) {
                Some(s) if s.histogram.total_count() > 0 => {
                    safe_div(s.null_count as f64, s.histogram.total_count() as f64, DEFAULT_NULL_SELECTIVITY)
                }
                _ => DEFAULT_NULL_SELECTIVITY,
            };
            if *negated { 1.0 - frac } else { frac }
        }
        Predicate::Comparison { field, op, value } => comparison_selectivity(field, *op, value, record_type, stats),
    };
    raw.clamp(0.0, 1.0)
}

fn comparison_selectivity(field: &str, op: ComparisonOperator, value: &Literal, record_type: &str, stats: &dyn StatsSource) -> f64 {
    let index_stats = stats.index_stats(record_type, field);

    if op == ComparisonOperator::NotEq {
        return 1.0 - comparison_selectivity(field, ComparisonOperator::Eq, value, record_type, stats);
    }

    if op == ComparisonOperator::Eq {
        return match index_stats {
            Some(s) if !s.histogram.buckets.is_empty() => {
                let total = s.histogram.total_count();
                match s.histogram.bucket_for(value) {
                    Some(bucket) => safe_div(bucket.count as f64, bucket.distinct_count as f64 * total as f64, DEFAULT_EQ_SELECTIVITY),
                    None => 0.0, // value provably outside the observed domain
                }
            }
            Some(s) if s.distinct_count > 0 => 1.0 / s.distinct_count as f64,
            _ => DEFAULT_EQ_SELECTIVITY,
        };
    }

    let Some(s) = index_stats else { return DEFAULT_EQ_SELECTIVITY };
    if s.histogram.buckets.is_empty() {
        return DEFAULT_EQ_SELECTIVITY;
    }
    let (lo, hi) = range_bounds(op, value);
    range_selectivity(s, &lo, &hi)
}

/// The `(op, value)` half-open interval, in the same shape the plan enumerator's
/// range-construction table (§4.9) builds for an index scan — reused here so the
/// selectivity estimate and the actual scan range agree on what "matches" means.
fn range_bounds(op: ComparisonOperator, value: &Literal) -> (RangeBound<Literal>, RangeBound<Literal>) {
    match op {
        ComparisonOperator::Lt => (RangeBound::Unbounded, RangeBound::Excluded(value.clone())),
        ComparisonOperator::LtEq => (RangeBound::Unbounded, RangeBound::Included(value.clone())),
        ComparisonOperator::Gt => (RangeBound::Excluded(value.clone()), RangeBound::Unbounded),
        ComparisonOperator::GtEq => (RangeBound::Included(value.clone()), RangeBound::Unbounded),
        ComparisonOperator::StartsWith => {
            if let Literal::String(s) = value {
                (RangeBound::Included(value.clone()), RangeBound::Excluded(Literal::String(strata_ql::collation::starts_with_upper_bound(s))))
            } else {
                (RangeBound::Unbounded, RangeBound::Unbounded)
            }
        }
        ComparisonOperator::Eq | ComparisonOperator::NotEq => unreachable!("handled by the caller"),
    }
}

/// Sums each bucket's overlap fraction with `[lo, hi)`, weighted by the bucket's
/// share of the total row count (§4.6).
fn range_selectivity(stats: &IndexStats, lo: &RangeBound<Literal>, hi: &RangeBound<Literal>) -> f64 {
    let total = stats.histogram.total_count();
    if total == 0 {
        return DEFAULT_EQ_SELECTIVITY;
    }
    let last_index = stats.histogram.buckets.len() - 1;
    let mut acc = 0.0;
    for (i, bucket) in stats.histogram.buckets.iter().enumerate() {
        let bucket_inclusive_upper = i == last_index;
        let overlap = bucket_overlap_fraction(&bucket.lower, &bucket.upper, bucket_inclusive_upper, lo, hi);
        acc += overlap * (bucket.count as f64 / total as f64);
    }
    acc
}

/// Overlap fraction of one bucket's `[lower, upper)` (or `[lower, upper]` if
/// `inclusive_upper`) against `[lo, hi)`, per the three cases in §4.6.
fn bucket_overlap_fraction(
    lower: &Literal,
    upper: &Literal,
    inclusive_upper: bool,
    lo: &RangeBound<Literal>,
    hi: &RangeBound<Literal>,
) -> f64 {
    let bucket_lo = RangeBound::Included(lower.clone());
    let bucket_hi = if inclusive_upper { RangeBound::Included(upper.clone()) } else { RangeBound::Excluded(upper.clone()) };

    if !ranges_intersect(&bucket_lo, &bucket_hi, lo, hi) {
        return 0.0;
    }
    if contains(lo, hi, &bucket_lo, &bucket_hi) {
        return 1.0;
    }

    match (lower, upper) {
        (Literal::I64(_), Literal::I64(_)) | (Literal::F64(_), Literal::F64(_)) | (Literal::I64(_), Literal::F64(_)) | (Literal::F64(_), Literal::I64(_)) => {
            let lower_f = as_f64(lower);
            let upper_f = as_f64(upper);
            let width = upper_f - lower_f;
            if width <= 0.0 {
                // Zero-width (single-point) bucket: fully in or fully out.
                return if value_in_range(lower, lo, hi) { 1.0 } else { 0.0 };
            }
            let clamped_lo = clamp_lower(lower_f, lo);
            let clamped_hi = clamp_upper(upper_f, hi);
            ((clamped_hi - clamped_lo) / width).clamp(0.0, 1.0)
        }
        _ => 0.5,
    }
}

fn as_f64(lit: &Literal) -> f64 {
    match lit {
        Literal::I64(v) => *v as f64,
        Literal::F64(v) => *v,
        _ => 0.0,
    }
}

fn clamp_lower(bucket_lower: f64, lo: &RangeBound<Literal>) -> f64 {
    match lo {
        RangeBound::Unbounded => bucket_lower,
        RangeBound::Included(v) | RangeBound::Excluded(v) => bucket_lower.max(as_f64(v)),
    }
}

fn clamp_upper(bucket_upper: f64, hi: &RangeBound<Literal>) -> f64 {
    match hi {
        RangeBound::Unbounded => bucket_upper,
        RangeBound::Included(v) | RangeBound::Excluded(v) => bucket_upper.min(as_f64(v)),
    }
}

fn value_in_range(value: &Literal, lo: &RangeBound<Literal>, hi: &RangeBound<Literal>) -> bool {
    value.is_in_range(lo, hi)
}

fn ranges_intersect(a_lo: &RangeBound<Literal>, a_hi: &RangeBound<Literal>, b_lo: &RangeBound<Literal>, b_hi: &RangeBound<Literal>) -> bool {
    !before(a_hi, b_lo) && !before(b_hi, a_lo)
}

/// Whether `hi` falls strictly before `lo'`s bound (no overlap possible).
fn before(hi: &RangeBound<Literal>, lo: &RangeBound<Literal>) -> bool {
    match (hi, lo) {
        (RangeBound::Unbounded, _) | (_, RangeBound::Unbounded) => false,
        (RangeBound::Excluded(h), RangeBound::Included(l)) => h <= l,
        (RangeBound::Excluded(h), RangeBound::Excluded(l)) => h <= l,
        (RangeBound::Included(h), RangeBound::Excluded(l)) => h <= l,
        (RangeBound::Included(h), RangeBound::Included(l)) => h < l,
    }
}

fn contains(outer_lo: &RangeBound<Literal>, outer_hi: &RangeBound<Literal>, inner_lo: &RangeBound<Literal>, inner_hi: &RangeBound<Literal>) -> bool {
    bound_le(outer_lo, inner_lo) && bound_ge(outer_hi, inner_hi)
}

fn bound_le(outer: &RangeBound<Literal>, inner: &RangeBound<Literal>) -> bool {
    match (outer, inner) {
        (RangeBound::Unbounded, _) => true,
        (_, RangeBound::Unbounded) => false,
        (RangeBound::Included(o), RangeBound::Included(i)) => o <= i,
        (RangeBound::Included(o), RangeBound::Excluded(i)) => o <= i,
        (RangeBound::Excluded(o), RangeBound::Excluded(i)) => o <= i,
        (RangeBound::Excluded(o), RangeBound::Included(i)) => o < i,
    }
}

fn bound_ge(outer: &RangeBound<Literal>, inner: &RangeBound<Literal>) -> bool {
    match (outer, inner) {
        (RangeBound::Unbounded, _) => true,
        (_, RangeBound::Unbounded) => false,
        (RangeBound::Included(o), RangeBound::Included(i)) => o >= i,
        (RangeBound::Included(o), RangeBound::Excluded(i)) => o >= i,
        (RangeBound::Excluded(o), RangeBound::Excluded(i)) => o >= i,
        (RangeBound::Excluded(o), RangeBound::Included(i)) => o > i,
    }
}

/// `0/0 -> default`; never produces NaN or infinity (§4.8 "safe arithmetic").
fn safe_div(numerator: f64, denominator: f64, default: f64) -> f64 {
    if denominator == 0.0 {
        default
    } else {
        let v = numerator / denominator;
        if v.is_finite() { v } else { default }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::Histogram;

    struct FakeStats(Option<IndexStats>);
    impl StatsSource for FakeStats {
        fn index_stats(&self, _rt: &str, _field: &str) -> Option<&IndexStats> { self.0.as_ref() }
    }

    fn int_histogram() -> IndexStats {
        // Ten buckets of 100 rows each, values 0..1000.
        let values: Vec<(Literal, i64)> = (0..1000).map(|i| (Literal::I64(i), 1)).collect();
        IndexStats { distinct_count: 1000, null_count: 0, min: Some(Literal::I64(0)), max: Some(Literal::I64(999)), histogram: Histogram::build(&values, 10), timestamp: 0 }
    }

    #[test]
    fn equality_without_any_stats_falls_back_to_default() {
        let stats = FakeStats(None);
        let sel = selectivity(&Predicate::eq("city", Literal::String("Tokyo".into())), "User", &stats);
        assert_eq!(sel, DEFAULT_EQ_SELECTIVITY);
    }

    #[test]
    fn equality_with_histogram_uses_bucket_math() {
        let stats = FakeStats(Some(int_histogram()));
        let sel = selectivity(&Predicate::eq("age", Literal::I64(50)), "User", &stats);
        assert!(sel > 0.0 && sel <= 1.0);
    }

    #[test]
    fn range_selectivity_increases_monotonically_with_width() {
        let stats = FakeStats(Some(int_histogram()));
        let narrow = selectivity(&Predicate::cmp("age", ComparisonOperator::Gt, Literal::I64(900)), "User", &stats);
        let wide = selectivity(&Predicate::cmp("age", ComparisonOperator::Gt, Literal::I64(100)), "User", &stats);
        assert!(narrow < wide);
    }

    #[test]
    fn conjunction_multiplies_and_disjunction_uses_inclusion_exclusion() {
        let stats = FakeStats(Some(int_histogram()));
        let a = Predicate::cmp("age", ComparisonOperator::Gt, Literal::I64(500));
        let b = Predicate::cmp("age", ComparisonOperator::Lt, Literal::I64(600));
        let and_sel = selectivity(&a.clone().and(b.clone()), "User", &stats);
        let or_sel = selectivity(&a.clone().or(b.clone()), "User", &stats);
        let sa = selectivity(&a, "User", &stats);
        let sb = selectivity(&b, "User", &stats);
        assert!((and_sel - sa * sb).abs() < 1e-9);
        assert!((or_sel - (1.0 - (1.0 - sa) * (1.0 - sb))).abs() < 1e-9);
    }

    #[test]
    fn every_result_stays_within_unit_interval() {
        let stats = FakeStats(Some(int_histogram()));
        for op in [ComparisonOperator::Eq, ComparisonOperator::NotEq, ComparisonOperator::Lt, ComparisonOperator::LtEq, ComparisonOperator::Gt, ComparisonOperator::GtEq] {
            let sel = selectivity(&Predicate::cmp("age", op, Literal::I64(500)), "User", &stats);
            assert!((0.0..=1.0).contains(&sel), "{op:?} produced {sel}");
        }
    }
}
