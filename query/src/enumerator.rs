//! The plan enumerator (§4.9): turns an already-rewritten filter into a bounded set
//! of candidate physical plans over a record type's `readable` indexes. Grounded on
//! `storage/common/src/index_spec.rs`'s `IndexSpecMatch::{Yes,Inverse,No}` shape for
//! matching a predicate's field against an index's leading key expression — that
//! file stops at "does this index apply"; the selectivity-ordered prioritization
//! and DNF-aware union/intersection assembly below are new, built directly against
//! §4.9's five enumeration rules.

use crate::config::EnumeratorConfig;
use crate::plan::{range_for, Plan};
use strata_core::Index;
use strata_keyspace::Keyspace;
use strata_ql::{Predicate, Literal};
use strata_stats::{selectivity, StatsSource};

/// One index applicable to a leaf comparison, paired with the residual (every other
/// conjunct an `IndexScan` built from it wouldn't itself satisfy).
struct Candidate {
    plan: Plan,
    /// Selectivity of the leaf predicate alone, used only to prioritize which
    /// candidates survive `max_candidate_plans` (§4.9: "prioritizing index scans on
    /// the highest-selectivity index first").
    leaf_selectivity: f64,
}

/// Enumerates candidate plans for `filter` over `record_type`, restricted to
/// `indexes` (the caller passes only the schema's `readable` indexes for this
/// record type — §4.9 names that restriction explicitly). `limit` wraps the result
/// in `Plan::Limit` when the query specified a row bound.
pub fn enumerate(
    filter: &Predicate,
    record_type: &str,
    indexes: &[&Index],
    keyspace: &Keyspace,
    stats: &dyn StatsSource,
    limit: Option<u64>,
    config: &EnumeratorConfig,
) -> Vec<Plan> {
    let mut plans = enumerate_unlimited(filter, record_type, indexes, keyspace, stats, config);
    if let Some(n) = limit {
        plans = plans.into_iter().map(|p| Plan::Limit { child: Box::new(p), n }).collect();
    }
    plans
}

fn enumerate_unlimited(
    filter: &Predicate,
    record_type: &str,
    indexes: &[&Index],
    keyspace: &Keyspace,
    stats: &dyn StatsSource,
    config: &EnumeratorConfig,
) -> Vec<Plan> {
    let mut out = Vec::new();

    // Rule 1: always include the full scan as a baseline.
    out.push(Plan::FullScan { record_type: record_type.to_string(), filter: filter.clone() });

    match filter {
        Predicate::And(_, _) => {
            let mut conjuncts = Vec::new();
            crate::util::collect_and(filter, &mut conjuncts);
            let candidates = index_candidates(&conjuncts, record_type, indexes, keyspace, stats, config);

            // Rule 2: a per-leaf index scan for every conjunct that matches an index.
            for c in &candidates {
                out.push(c.plan.clone());
            }

            // Rule 3: intersection over scans covering distinct fields, only when at
            // least two such scans exist.
            let distinct_fields = distinct_leading_fields(&candidates);
            if distinct_fields.len() >= 2 {
                let chosen = best_per_field(candidates, config.max_candidate_plans);
                if chosen.len() >= 2 {
                    out.push(Plan::Intersection { record_type: record_type.to_string(), children: chosen });
                }
            }
        }
        Predicate::Or(_, _) => {
            // Rule 4: a union over per-disjunct plans (each disjunct planned
            // recursively, falling back to full-scan where nothing applies).
            let mut disjuncts = Vec::new();
            crate::util::collect_or(filter, &mut disjuncts);
            let mut children = Vec::with_capacity(disjuncts.len());
            for d in &disjuncts {
                let sub = enumerate_unlimited(d, record_type, indexes, keyspace, stats, config);
                let best = pick_cheapest_by_selectivity(sub, record_type, stats);
                children.push(best);
            }
            out.push(Plan::Union { record_type: record_type.to_string(), children });
        }
        other => {
            // A single leaf predicate (or True/False/Not): at most one index scan.
            let mut conjuncts = Vec::new();
            crate::util::collect_and(other, &mut conjuncts);
            let candidates = index_candidates(&conjuncts, record_type, indexes, keyspace, stats, config);
            out.extend(candidates.into_iter().map(|c| c.plan));
        }
    }

    out.truncate(config.max_candidate_plans.max(1));
    out
}

/// Builds one `IndexScan` candidate per conjunct that matches some index's leading
/// key expression, sorted by descending leaf selectivity (most selective first, per
/// §4.9's prioritization rule), then capped at `max_candidate_plans`.
fn index_candidates(
    conjuncts: &[Predicate],
    record_type: &str,
    indexes: &[&Index],
    keyspace: &Keyspace,
    stats: &dyn StatsSource,
    config: &EnumeratorConfig,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    for leaf in conjuncts {
        let Predicate::Comparison { field, op, value } = leaf else { continue };
        if *op == strata_ql::ComparisonOperator::NotEq {
            continue; // no contiguous range; see plan::range_for's precondition.
        }
        if *op == strata_ql::ComparisonOperator::StartsWith && !matches!(value, Literal::String(_)) {
            continue;
        }
        let Some(index) = indexes
            .iter()
            .find(|i| i.kind == strata_core::IndexKind::Value && i.key_expr.leading_field() == Some(field.as_str()))
        else {
            continue;
        };
        let Some(range) = range_for(keyspace, &index.name, *op, value) else { continue };

        let residual = other_conjuncts(conjuncts, leaf);
        let leaf_selectivity = selectivity(leaf, record_type, stats);
        out.push(Candidate {
            plan: Plan::IndexScan {
                index_name: index.name.clone(),
                record_type: record_type.to_string(),
                field: field.clone(),
                op: *op,
                value: value.clone(),
                range,
                residual,
                covering: false,
            },
            leaf_selectivity,
        });
    }
    out.sort_by(|a, b| a.leaf_selectivity.partial_cmp(&b.leaf_selectivity).unwrap_or(std::cmp::Ordering::Equal));
    out.truncate(config.max_candidate_plans.max(1));
    out
}

/// The conjunction of every conjunct except `exclude`, or `True` if none remain —
/// applied as the `IndexScan`'s post-scan residual filter.
fn other_conjuncts(conjuncts: &[Predicate], exclude: &Predicate) -> Predicate {
    let mut remaining: Vec<Predicate> = conjuncts.iter().filter(|p| *p != exclude).cloned().collect();
    if remaining.is_empty() {
        return Predicate::True;
    }
    let first = remaining.remove(0);
    remaining.into_iter().fold(first, |acc, p| acc.and(p))
}

fn distinct_leading_fields(candidates: &[Candidate]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for c in candidates {
        if let Plan::IndexScan { field, .. } = &c.plan {
            if !out.contains(field) {
                out.push(field.clone());
            }
        }
    }
    out
}

/// One candidate per distinct field (the most selective, since `candidates` is
/// already sorted ascending by selectivity), capped at `max_candidate_plans`.
fn best_per_field(candidates: Vec<Candidate>, max_candidate_plans: usize) -> Vec<Plan> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for c in candidates {
        let Plan::IndexScan { field, .. } = &c.plan else { continue };
        if seen.contains(field) {
            continue;
        }
        seen.push(field.clone());
        out.push(c.plan);
        if out.len() >= max_candidate_plans.max(2) {
            break;
        }
    }
    out
}

/// Picks the plan with the lowest estimated result-row count among `plans` (used to
/// choose one physical plan per `Or` disjunct before wrapping it in a `Union` — the
/// enumerator's own cost pass is deliberately cheap, full costing happens later in
/// the planner).
fn pick_cheapest_by_selectivity(plans: Vec<Plan>, record_type: &str, stats: &dyn StatsSource) -> Plan {
    plans
        .into_iter()
        .min_by(|a, b| {
            let sa = plan_filter_selectivity(a, record_type, stats);
            let sb = plan_filter_selectivity(b, record_type, stats);
            sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(Plan::FullScan { record_type: record_type.to_string(), filter: Predicate::True })
}

fn plan_filter_selectivity(plan: &Plan, record_type: &str, stats: &dyn StatsSource) -> f64 {
    match plan {
        Plan::FullScan { filter, .. } => selectivity(filter, record_type, stats),
        Plan::IndexScan { field, op, value, residual, .. } => {
            selectivity(&Predicate::cmp(field.clone(), *op, value.clone()), record_type, stats)
                * selectivity(residual, record_type, stats)
        }
        Plan::Intersection { children, .. } => {
            children.iter().map(|c| plan_filter_selectivity(c, record_type, stats)).fold(1.0, f64::min)
        }
        Plan::Union { children, .. } => {
            children.iter().map(|c| plan_filter_selectivity(c, record_type, stats)).fold(0.0, f64::max)
        }
        Plan::Limit { child, .. } => plan_filter_selectivity(child, record_type, stats),
    }
}
