//! The plan cache (§4.10): an LRU keyed by a canonical rendering of
//! `(record_type, filter, limit)` so two filters built with differently-ordered
//! And/Or children land on the same cache entry. Reaches for the `lru` crate rather
//! than hand-rolling an LRU map, the way a production cache would.

use crate::config::PlanCacheConfig;
use crate::cost::Cost;
use crate::plan::Plan;
use crate::util::{collect_and, collect_or};
use lru::LruCache;
use std::num::NonZeroUsize;
use strata_ql::{Literal, Predicate};

#[derive(Debug, Clone)]
pub struct CachedPlan {
    pub plan: Plan,
    pub cost: Cost,
}

pub struct PlanCache {
    inner: LruCache<String, CachedPlan>,
}

impl PlanCache {
    pub fn new(config: PlanCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity.max(1)).expect("capacity clamped to >= 1 above");
        Self { inner: LruCache::new(capacity) }
    }

    pub fn get(&mut self, key: &str) -> Option<CachedPlan> { self.inner.get(key).cloned() }

    pub fn put(&mut self, key: String, value: CachedPlan) { self.inner.put(key, value); }

    pub fn len(&self) -> usize { self.inner.len() }

    pub fn is_empty(&self) -> bool { self.inner.is_empty() }
}

/// The stable cache key for one `(record_type, filter, limit)` query shape.
pub fn stable_key(record_type: &str, filter: &Predicate, limit: Option<u64>) -> String {
    let limit = limit.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());
    format!("{record_type}|{}|{limit}", canonical(filter))
}

/// Renders a predicate so that structurally-equivalent And/Or chains built in any
/// child order produce identical text: each commutative node's children are
/// recursively canonicalized, then sorted before joining.
fn canonical(predicate: &Predicate) -> String {
    match predicate {
        Predicate::True => "T".to_string(),
        Predicate::False => "F".to_string(),
        Predicate::IsNull { field, negated } => format!("null({field},{negated})"),
        Predicate::Comparison { field, op, value } => format!("cmp({field},{},{})", op.as_str(), canonical_literal(value)),
        Predicate::Not(inner) => format!("not({})", canonical(inner)),
        Predicate::And(_, _) => {
            let mut parts = Vec::new();
            collect_and(predicate, &mut parts);
            canonical_join("and", &parts)
        }
        Predicate::Or(_, _) => {
            let mut parts = Vec::new();
            collect_or(predicate, &mut parts);
            canonical_join("or", &parts)
        }
    }
}

fn canonical_join(op: &str, parts: &[Predicate]) -> String {
    let mut rendered: Vec<String> = parts.iter().map(canonical).collect();
    rendered.sort();
    format!("{op}({})", rendered.join(","))
}

/// A type-tagged rendering so e.g. `I64(1)` and `F64(1.0)` never collide.
fn canonical_literal(value: &Literal) -> String {
    match value {
        Literal::Null => "null".to_string(),
        Literal::Bool(b) => format!("b:{b}"),
        Literal::I64(v) => format!("i:{v}"),
        Literal::F64(v) => format!("f:{v}"),
        Literal::String(s) => format!("s:{s}"),
    }
}
