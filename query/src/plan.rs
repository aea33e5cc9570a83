//! The five plan shapes of §4.9 and the byte-level range construction table that
//! turns a single `(field op value)` comparison into a `[begin, end)` bound inside
//! the `index` subspace. Modeled on the ambient codebase's `Plan`/`Range`/`Bound`
//! shapes (`storage/common/src/planner.rs`) — that file's own `Planner::plan` is an
//! unimplemented stub, so only its data shapes are reused; the range arithmetic here
//! is built fresh against the byte-level `lex_successor`/`Subspace::pack` primitives
//! rather than that file's (also unimplemented) `Bound`/`ScanDirection` vocabulary.

use strata_keyspace::{encode_string_prefix, lex_successor, Keyspace, Tuple, TypedValue};
use strata_ql::{ComparisonOperator, Literal, Predicate};

/// A `[begin, end)` byte range over a subspace, ready to hand to `KvTransaction::get_range`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub begin: Vec<u8>,
    pub end: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    FullScan {
        record_type: String,
        filter: Predicate,
    },
    IndexScan {
        index_name: String,
        record_type: String,
        field: String,
        op: ComparisonOperator,
        value: Literal,
        range: Range,
        /// Whatever of the original filter the index scan alone doesn't satisfy
        /// (e.g. the other conjuncts of an `And`), applied as a post-scan filter.
        residual: Predicate,
        /// Whether the index's stored entries alone satisfy the query without
        /// fetching the record (§4.8, `Index::covers`). `enumerate` never sets this
        /// true today — see DESIGN.md — but the cost estimator honors it, so a
        /// future enumerator rule only has to prove coverage and set this field.
        covering: bool,
    },
    Intersection {
        record_type: String,
        children: Vec<Plan>,
    },
    Union {
        record_type: String,
        children: Vec<Plan>,
    },
    Limit {
        child: Box<Plan>,
        n: u64,
    },
}

impl Plan {
    pub fn record_type(&self) -> &str {
        match self {
            Plan::FullScan { record_type, .. } => record_type,
            Plan::IndexScan { record_type, .. } => record_type,
            Plan::Intersection { record_type, .. } => record_type,
            Plan::Union { record_type, .. } => record_type,
            Plan::Limit { child, .. } => child.record_type(),
        }
    }
}

/// Builds the `[begin, end)` range for an index scan over `index_name` matching
/// `field op value`, per §4.9's range-construction table. `op` must not be `NotEq`
/// (a negated-equality scan isn't a contiguous range) or `StartsWith` over a
/// non-string value (caller is expected to have excluded both before calling this).
///
/// `v.next()` here means the byte-level tuple successor (`lex_successor` applied to
/// the packed key), not `Collatable`'s type-specific successor: the latter has no
/// representation for `i64::MAX` or `NaN`, while every packed key has a
/// well-defined byte successor.
pub fn range_for(keyspace: &Keyspace, index_name: &str, op: ComparisonOperator, value: &Literal) -> Option<Range> {
    let name_tuple = Tuple::new(vec![TypedValue::String(index_name.to_string())]);
    let (name_begin, name_end) = keyspace.index.prefix_range(&name_tuple);

    match op {
        ComparisonOperator::Eq => {
            let point = Tuple::new(vec![TypedValue::String(index_name.to_string()), TypedValue::from(value.clone())]);
            let (begin, end) = keyspace.index.prefix_range(&point);
            Some(Range { begin, end })
        }
        ComparisonOperator::Lt => {
            let end = keyspace.index.pack(&Tuple::new(vec![TypedValue::String(index_name.to_string()), TypedValue::from(value.clone())]));
            Some(Range { begin: name_begin, end })
        }
        ComparisonOperator::LtEq => {
            let point = keyspace.index.pack(&Tuple::new(vec![TypedValue::String(index_name.to_string()), TypedValue::from(value.clone())]));
            Some(Range { begin: name_begin, end: lex_successor(point) })
        }
        ComparisonOperator::Gt => {
            let point = keyspace.index.pack(&Tuple::new(vec![TypedValue::String(index_name.to_string()), TypedValue::from(value.clone())]));
            Some(Range { begin: lex_successor(point), end: name_end })
        }
        ComparisonOperator::GtEq => {
            let begin = keyspace.index.pack(&Tuple::new(vec![TypedValue::String(index_name.to_string()), TypedValue::from(value.clone())]));
            Some(Range { begin, end: name_end })
        }
        ComparisonOperator::StartsWith => match value {
            Literal::String(s) => {
                let mut begin = keyspace.index.pack(&name_tuple);
                begin.extend(encode_string_prefix(s));
                let end = lex_successor(begin.clone());
                Some(Range { begin, end })
            }
            _ => None,
        },
        ComparisonOperator::NotEq => None,
    }
}
