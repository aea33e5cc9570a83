//! Cost estimation (§4.8): `total = io + weight * cpu`, built per plan kind from the
//! selectivity API over an already-fetched stats snapshot. Pure arithmetic — never
//! touches the KV, satisfying §5's requirement that the cost estimator running over
//! cached stats never suspends.

use crate::config::CostConfig;
use crate::plan::Plan;
use strata_ql::Predicate;
use strata_stats::{selectivity, StatsSource};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cost {
    pub io: f64,
    pub cpu: f64,
    pub estimated_rows: f64,
}

impl Cost {
    pub fn total(&self, config: &CostConfig) -> f64 { self.io + config.cpu_weight * self.cpu }
}

pub fn estimate_cost(plan: &Plan, table_rows: i64, stats: &dyn StatsSource, config: &CostConfig) -> Cost {
    let table_rows_f = table_rows.max(0) as f64;
    match plan {
        Plan::FullScan { record_type, filter } => {
            let matched = table_rows_f * selectivity(filter, record_type, stats);
            Cost {
                io: table_rows_f * config.io_read_cost,
                cpu: table_rows_f * config.cpu_deserialize_cost + matched * config.cpu_filter_cost,
                estimated_rows: matched,
            }
        }
        Plan::IndexScan { record_type, field, op, value, residual, covering, .. } => {
            // §4.8: "estimated matches m = rows · sel_index · sel_residual"; io/cpu
            // are both built from that same final match count `m`. A non-covering
            // scan doubles io to account for the index-entry read plus the record
            // fetch; a covering one (invariant 9) drops the fetch and the residual's
            // deserialize/filter cost, since there is nothing left to filter out of
            // a record that was never loaded.
            let comparison = Predicate::cmp(field.clone(), *op, value.clone());
            let sel_index = selectivity(&comparison, record_type, stats);
            let sel_residual = selectivity(residual, record_type, stats);
            let m = table_rows_f * sel_index * sel_residual;
            if *covering {
                Cost { io: m * config.io_read_cost, cpu: m * config.cpu_filter_cost, estimated_rows: m }
            } else {
                Cost {
                    io: m * 2.0 * config.io_read_cost,
                    cpu: m * (config.cpu_deserialize_cost + config.cpu_filter_cost),
                    estimated_rows: m,
                }
            }
        }
        Plan::Intersection { children, .. } => {
            // §4.8: "Expected rows = table.rows · ∏ selectivity(childᵢ)"; each
            // child's own selectivity is its estimated rows as a fraction of the
            // table, so the product of those fractions times table rows gives the
            // same figure without re-deriving selectivity from the plan shape.
            let costs: Vec<Cost> = children.iter().map(|c| estimate_cost(c, table_rows, stats, config)).collect();
            let selectivity_product: f64 = costs.iter().map(|c| safe_ratio(c.estimated_rows, table_rows_f)).product();
            let estimated_rows = table_rows_f * selectivity_product;
            let max_child_rows = costs.iter().map(|c| c.estimated_rows).fold(0.0, f64::max);
            Cost {
                io: costs.iter().map(|c| c.io).sum(),
                cpu: max_child_rows * config.cpu_filter_cost * children.len() as f64,
                estimated_rows,
            }
        }
        Plan::Union { children, .. } => {
            let costs: Vec<Cost> = children.iter().map(|c| estimate_cost(c, table_rows, stats, config)).collect();
            let estimated_rows = costs.iter().map(|c| c.estimated_rows).sum::<f64>().min(table_rows_f);
            Cost {
                io: costs.iter().map(|c| c.io).sum(),
                cpu: costs.iter().map(|c| c.cpu).sum(),
                estimated_rows,
            }
        }
        Plan::Limit { child, n } => {
            let inner = estimate_cost(child, table_rows, stats, config);
            let n = *n as f64;
            if inner.estimated_rows <= n || inner.estimated_rows <= 0.0 {
                inner
            } else {
                let ratio = safe_ratio(n, inner.estimated_rows);
                Cost { io: inner.io * ratio, cpu: inner.cpu * ratio, estimated_rows: n }
            }
        }
    }
}

/// `0/0 -> 0`; never produces NaN or infinity (§4.8 "safe arithmetic").
fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        let v = numerator / denominator;
        if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Range;
    use strata_ql::{ComparisonOperator, Literal};
    use strata_stats::IndexStats;

    struct NoStats;
    impl StatsSource for NoStats {
        fn index_stats(&self, _rt: &str, _field: &str) -> Option<&IndexStats> { None }
    }

    fn cfg() -> CostConfig { CostConfig::default() }

    #[test]
    fn full_scan_io_scales_with_table_rows() {
        let plan = Plan::FullScan { record_type: "User".into(), filter: Predicate::True };
        let cost = estimate_cost(&plan, 1000, &NoStats, &cfg());
        assert_eq!(cost.io, 1000.0 * cfg().io_read_cost);
        assert_eq!(cost.estimated_rows, 1000.0);
    }

    #[test]
    fn index_scan_is_cheaper_than_full_scan_for_a_selective_predicate() {
        let scan = Plan::IndexScan {
            index_name: "by_city".into(),
            record_type: "User".into(),
            field: "city".into(),
            op: ComparisonOperator::Eq,
            value: Literal::String("Tokyo".into()),
            range: Range { begin: vec![], end: vec![] },
            residual: Predicate::True,
            covering: false,
        };
        let full = Plan::FullScan { record_type: "User".into(), filter: Predicate::eq("city", Literal::String("Tokyo".into())) };
        let scan_cost = estimate_cost(&scan, 10_000, &NoStats, &cfg());
        let full_cost = estimate_cost(&full, 10_000, &NoStats, &cfg());
        assert!(scan_cost.total(&cfg()) < full_cost.total(&cfg()));
    }

    #[test]
    fn limit_scales_cost_down_when_it_caps_below_estimated_rows() {
        let full = Plan::FullScan { record_type: "User".into(), filter: Predicate::True };
        let limited = Plan::Limit { child: Box::new(full.clone()), n: 10 };
        let full_cost = estimate_cost(&full, 1000, &NoStats, &cfg());
        let limited_cost = estimate_cost(&limited, 1000, &NoStats, &cfg());
        assert!(limited_cost.total(&cfg()) < full_cost.total(&cfg()));
        assert_eq!(limited_cost.estimated_rows, 10.0);
    }

    #[test]
    fn intersection_rows_are_the_product_of_child_selectivities_times_table_rows() {
        // Scenario D (§8): city=Tokyo at 0.05 selectivity, age>18 at 0.8, over a
        // 1,000,000-row table, should estimate ~40,000 intersected rows.
        let a = Plan::IndexScan {
            index_name: "by_city".into(),
            record_type: "User".into(),
            field: "city".into(),
            op: ComparisonOperator::Eq,
            value: Literal::String("Tokyo".into()),
            range: Range { begin: vec![], end: vec![] },
            residual: Predicate::True,
            covering: false,
        };
        let b = Plan::IndexScan {
            index_name: "by_age".into(),
            record_type: "User".into(),
            field: "age".into(),
            op: ComparisonOperator::Gt,
            value: Literal::I64(18),
            range: Range { begin: vec![], end: vec![] },
            residual: Predicate::True,
            covering: false,
        };
        let inter = Plan::Intersection { record_type: "User".into(), children: vec![a.clone(), b.clone()] };
        let cost = estimate_cost(&inter, 1_000_000, &NoStats, &cfg());
        let a_rows = estimate_cost(&a, 1_000_000, &NoStats, &cfg()).estimated_rows;
        let b_rows = estimate_cost(&b, 1_000_000, &NoStats, &cfg()).estimated_rows;
        let expected = a_rows * b_rows / 1_000_000.0;
        assert!((cost.estimated_rows - expected).abs() < 1e-6);
    }

    #[test]
    fn a_covering_index_scan_never_costs_more_than_the_same_scan_without_coverage() {
        // Invariant 9 (§8): adding a covering index can only lower or equal the
        // chosen plan's total cost. `Index::covers` decides `covering` the way a
        // future enumerator rule would, against a real index and primary key.
        use strata_core::{Index, IndexKind, KeyExpression};

        let primary_key = KeyExpression::field("id");
        let index = Index {
            name: "by_city".into(),
            record_type: "User".into(),
            kind: IndexKind::Value,
            key_expr: KeyExpression::field("city"),
            unique: false,
            grouping_expr: None,
            value_expr: None,
        };
        assert!(index.covers(&primary_key, &["city"]));

        let base = Plan::IndexScan {
            index_name: "by_city".into(),
            record_type: "User".into(),
            field: "city".into(),
            op: ComparisonOperator::Eq,
            value: Literal::String("Tokyo".into()),
            range: Range { begin: vec![], end: vec![] },
            residual: Predicate::True,
            covering: false,
        };
        let mut covering = base.clone();
        let Plan::IndexScan { covering: ref mut c, .. } = covering else { unreachable!() };
        *c = true;

        let base_cost = estimate_cost(&base, 10_000, &NoStats, &cfg());
        let covering_cost = estimate_cost(&covering, 10_000, &NoStats, &cfg());
        assert!(covering_cost.total(&cfg()) <= base_cost.total(&cfg()));
    }
}
