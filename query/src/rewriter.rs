//! The query rewriter (§4.7): a fixpoint of three pure rewrites applied to a filter
//! before planning — push Not down to the leaves (De Morgan), flatten And/Or chains
//! and drop duplicate/trivial conjuncts and disjuncts, and distribute And-over-Or
//! into DNF only when doing so doesn't blow the term count past a configured bound.
//! Flattening itself is modeled on the ambient codebase's `ConjunctFinder`
//! (`storage/common/src/predicate.rs`); push-Not and bounded-DNF have no precedent
//! there and are built directly from §4.7's rules.

use crate::config::RewriterConfig;
use crate::util::{collect_and, collect_or, dedup, fold_and, fold_or};
use strata_ql::Predicate;

/// Applies the rewrite rules to a fixpoint, bounded by `config.max_depth` against a
/// rule set that happens not to converge on some predicate shape.
pub fn rewrite(predicate: &Predicate, config: &RewriterConfig) -> Predicate {
    let mut current = predicate.clone();
    for _ in 0..config.max_depth.max(1) {
        let next = rewrite_once(&current, config);
        if next == current {
            return next;
        }
        current = next;
    }
    current
}

fn rewrite_once(predicate: &Predicate, config: &RewriterConfig) -> Predicate {
    match predicate {
        Predicate::Not(inner) => push_not_through(inner, config),
        Predicate::And(_, _) => {
            let mut conjuncts = Vec::new();
            collect_and(predicate, &mut conjuncts);
            let conjuncts: Vec<Predicate> = conjuncts.into_iter().map(|p| rewrite_once(&p, config)).collect();
            let conjuncts = dedup(conjuncts);
            if conjuncts.iter().any(|p| matches!(p, Predicate::False)) {
                return Predicate::False;
            }
            let conjuncts: Vec<Predicate> = conjuncts.into_iter().filter(|p| !matches!(p, Predicate::True)).collect();
            if conjuncts.is_empty() {
                return Predicate::True;
            }
            maybe_distribute_dnf(conjuncts, config)
        }
        Predicate::Or(_, _) => {
            let mut disjuncts = Vec::new();
            collect_or(predicate, &mut disjuncts);
            let disjuncts: Vec<Predicate> = disjuncts.into_iter().map(|p| rewrite_once(&p, config)).collect();
            let disjuncts = dedup(disjuncts);
            if disjuncts.iter().any(|p| matches!(p, Predicate::True)) {
                return Predicate::True;
            }
            let disjuncts: Vec<Predicate> = disjuncts.into_iter().filter(|p| !matches!(p, Predicate::False)).collect();
            if disjuncts.is_empty() {
                return Predicate::False;
            }
            fold_or(disjuncts)
        }
        leaf => leaf.clone(),
    }
}

/// Computes the rewritten form of `Not(inner)`: De Morgan over And/Or, double-negation
/// elimination, operator negation at comparison leaves (§4.7's "NOT push-down"), and a
/// literal `Not` wrapper only for the one operator (`startsWith`) that has no negation.
fn push_not_through(inner: &Predicate, config: &RewriterConfig) -> Predicate {
    match inner {
        Predicate::Not(p) => rewrite_once(p, config),
        Predicate::And(a, b) => {
            let na = push_not_through(a, config);
            let nb = push_not_through(b, config);
            rewrite_once(&na.or(nb), config)
        }
        Predicate::Or(a, b) => {
            let na = push_not_through(a, config);
            let nb = push_not_through(b, config);
            rewrite_once(&na.and(nb), config)
        }
        Predicate::True => Predicate::False,
        Predicate::False => Predicate::True,
        Predicate::IsNull { field, negated } => Predicate::IsNull { field: field.clone(), negated: !negated },
        Predicate::Comparison { field, op, value } => match op.negate() {
            Some(negated) => Predicate::Comparison { field: field.clone(), op: negated, value: value.clone() },
            None => Predicate::Not(Box::new(inner.clone())),
        },
    }
}

/// Distributes And-over-Or into DNF when the resulting term count
/// (`∏ |disjuncts per Or conjunct|`) is at most `config.max_dnf_terms`; otherwise
/// leaves `flat` as a flattened, deduplicated conjunction (CNF), per §4.7's bound.
fn maybe_distribute_dnf(flat: Vec<Predicate>, config: &RewriterConfig) -> Predicate {
    let choice_lists: Vec<Vec<Predicate>> = flat
        .iter()
        .map(|p| {
            if matches!(p, Predicate::Or(_, _)) {
                let mut out = Vec::new();
                collect_or(p, &mut out);
                out
            } else {
                vec![p.clone()]
            }
        })
        .collect();

    if choice_lists.iter().all(|c| c.len() <= 1) {
        return fold_and(flat);
    }

    let term_count: usize = choice_lists.iter().map(|c| c.len().max(1)).product();
    if term_count == 0 || term_count > config.max_dnf_terms {
        return fold_and(flat);
    }

    let mut products: Vec<Vec<Predicate>> = vec![Vec::new()];
    for choices in &choice_lists {
        let mut next = Vec::with_capacity(products.len() * choices.len());
        for partial in &products {
            for choice in choices {
                let mut p = partial.clone();
                p.push(choice.clone());
                next.push(p);
            }
        }
        products = next;
    }

    let terms: Vec<Predicate> = dedup(products.into_iter().map(fold_and).collect());
    fold_or(terms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_ql::{ComparisonOperator, Literal};

    fn cfg() -> RewriterConfig { RewriterConfig::default() }

    #[test]
    fn not_of_or_pushes_down_to_and_of_negated_comparisons() {
        let status_inactive = Predicate::eq("status", Literal::String("inactive".into()));
        let deleted_true = Predicate::eq("deleted", Literal::Bool(true));
        let filter = status_inactive.or(deleted_true).not();

        let rewritten = rewrite(&filter, &cfg());
        let expected = Predicate::cmp("status", ComparisonOperator::NotEq, Literal::String("inactive".into()))
            .and(Predicate::cmp("deleted", ComparisonOperator::NotEq, Literal::Bool(true)));
        assert_eq!(rewritten, expected);
    }

    #[test]
    fn double_negation_cancels() {
        let p = Predicate::eq("a", Literal::I64(1));
        let filter = p.clone().not().not();
        assert_eq!(rewrite(&filter, &cfg()), p);
    }

    #[test]
    fn flatten_merges_nested_and_chains() {
        let a = Predicate::eq("a", Literal::I64(1));
        let b = Predicate::eq("b", Literal::I64(2));
        let c = Predicate::eq("c", Literal::I64(3));
        let nested = a.clone().and(b.clone().and(c.clone()));
        let rewritten = rewrite(&nested, &cfg());
        let flat = a.and(b).and(c);
        assert_eq!(rewritten, flat);
    }

    #[test]
    fn duplicate_conjuncts_collapse_to_one() {
        let a = Predicate::eq("a", Literal::I64(1));
        let dup = a.clone().and(a.clone());
        assert_eq!(rewrite(&dup, &cfg()), a);
    }

    #[test]
    fn a_five_way_conjunction_of_four_way_ors_stays_cnf_past_the_dnf_bound() {
        let group = |field: &str| {
            let terms: Vec<Predicate> = (0..4).map(|i| Predicate::eq(field, Literal::I64(i))).collect();
            fold_or(terms)
        };
        let groups: Vec<Predicate> = ["a", "b", "c", "d", "e"].iter().map(|f| group(f)).collect();
        let filter = fold_and(groups.clone());

        let rewritten = rewrite(&filter, &cfg());
        // Still a conjunction of five Or predicates, not a 1024-term disjunction.
        let mut conjuncts = Vec::new();
        collect_and(&rewritten, &mut conjuncts);
        assert_eq!(conjuncts.len(), 5);
        assert!(conjuncts.iter().all(|c| matches!(c, Predicate::Or(_, _))));
    }

    #[test]
    fn a_small_conjunction_of_ors_does_distribute_into_dnf() {
        let a = Predicate::eq("a", Literal::I64(1)).or(Predicate::eq("a", Literal::I64(2)));
        let b = Predicate::eq("b", Literal::I64(3)).or(Predicate::eq("b", Literal::I64(4)));
        let filter = a.and(b);
        let rewritten = rewrite(&filter, &cfg());
        let mut disjuncts = Vec::new();
        collect_or(&rewritten, &mut disjuncts);
        assert_eq!(disjuncts.len(), 4);
        assert!(disjuncts.iter().all(|d| matches!(d, Predicate::And(_, _))));
    }

    #[test]
    fn starts_with_has_no_negation_and_stays_wrapped_in_not() {
        let filter = Predicate::cmp("name", ComparisonOperator::StartsWith, Literal::String("Al".into())).not();
        let rewritten = rewrite(&filter, &cfg());
        assert!(matches!(rewritten, Predicate::Not(_)));
    }
}
