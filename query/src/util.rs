//! Flatten/fold/dedup helpers shared by the rewriter and the enumerator, both of
//! which need to walk an `And`/`Or` chain as a flat list of conjuncts/disjuncts
//! rather than a left-leaning binary tree. Modeled on the ambient codebase's
//! `ConjunctFinder` (`storage/common/src/predicate.rs`), which performs the same
//! flattening for `And` alone; generalized here to `Or` as well since the rewriter's
//! bounded-DNF step needs to flatten both.

use strata_ql::Predicate;

/// Collects every `And`-chain leaf into `out`, treating anything else (including an
/// `Or`) as a single opaque leaf — the same rule `ConjunctFinder::find` applies.
pub fn collect_and(predicate: &Predicate, out: &mut Vec<Predicate>) {
    match predicate {
        Predicate::And(a, b) => {
            collect_and(a, out);
            collect_and(b, out);
        }
        other => out.push(other.clone()),
    }
}

pub fn collect_or(predicate: &Predicate, out: &mut Vec<Predicate>) {
    match predicate {
        Predicate::Or(a, b) => {
            collect_or(a, out);
            collect_or(b, out);
        }
        other => out.push(other.clone()),
    }
}

/// Rebuilds a left-leaning `And` chain from a flat list. `items` must be non-empty.
pub fn fold_and(mut items: Vec<Predicate>) -> Predicate {
    let first = items.remove(0);
    items.into_iter().fold(first, |acc, p| acc.and(p))
}

pub fn fold_or(mut items: Vec<Predicate>) -> Predicate {
    let first = items.remove(0);
    items.into_iter().fold(first, |acc, p| acc.or(p))
}

/// Structural-equality dedup, preserving first-seen order — `Predicate` derives
/// `PartialEq`, so no canonicalization is needed beyond the flattening the caller
/// already did.
pub fn dedup(items: Vec<Predicate>) -> Vec<Predicate> {
    let mut out: Vec<Predicate> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_ql::Literal;

    #[test]
    fn collect_and_flattens_a_left_leaning_chain() {
        let p = Predicate::eq("a", Literal::I64(1)).and(Predicate::eq("b", Literal::I64(2))).and(Predicate::eq("c", Literal::I64(3)));
        let mut out = Vec::new();
        collect_and(&p, &mut out);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn collect_and_treats_or_as_opaque() {
        let p = Predicate::eq("a", Literal::I64(1)).or(Predicate::eq("b", Literal::I64(2)));
        let mut out = Vec::new();
        collect_and(&p, &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn dedup_removes_structural_duplicates() {
        let a = Predicate::eq("a", Literal::I64(1));
        let items = vec![a.clone(), a.clone(), Predicate::eq("b", Literal::I64(2))];
        assert_eq!(dedup(items).len(), 2);
    }
}
