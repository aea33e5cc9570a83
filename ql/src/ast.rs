//! Filter expression tree.
//!
//! A `Predicate` is the normal form the rest of the crate operates on: a tree of
//! `And`/`Or`/`Not` combinators over leaf `Comparison`/`IsNull` predicates. `Literal`
//! carries the same four comparable shapes the Codec's `TypedValue` exposes, plus
//! `Null`, since a predicate may test for nullity directly.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
}

impl Literal {
    /// Rank used for the cross-type total order `null < bool < int < float < string`.
    pub fn type_rank(&self) -> u8 {
        match self {
            Literal::Null => 0,
            Literal::Bool(_) => 1,
            Literal::I64(_) => 2,
            Literal::F64(_) => 3,
            Literal::String(_) => 4,
        }
    }
}

impl PartialOrd for Literal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.type_rank() != other.type_rank() {
            return Some(self.type_rank().cmp(&other.type_rank()));
        }
        match (self, other) {
            (Literal::Null, Literal::Null) => Some(Ordering::Equal),
            (Literal::Bool(a), Literal::Bool(b)) => Some(a.cmp(b)),
            (Literal::I64(a), Literal::I64(b)) => Some(a.cmp(b)),
            (Literal::F64(a), Literal::F64(b)) => a.partial_cmp(b),
            (Literal::String(a), Literal::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// Strings only; range-constructed as `[s, s + U+FFFF)` per the enumerator's table.
    StartsWith,
}

impl ComparisonOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "=",
            ComparisonOperator::NotEq => "!=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::LtEq => "<=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::GtEq => ">=",
            ComparisonOperator::StartsWith => "startsWith",
        }
    }

    /// NOT push-down: De Morgan's complement of this comparison operator, used by the
    /// rewriter when distributing `Not` over `And`/`Or` is not enough by itself (e.g.
    /// `Not(status = "x")` becomes `status != "x"` rather than staying wrapped).
    pub fn negate(self) -> Option<ComparisonOperator> {
        use ComparisonOperator::*;
        match self {
            Eq => Some(NotEq),
            NotEq => Some(Eq),
            Lt => Some(GtEq),
            LtEq => Some(Gt),
            Gt => Some(LtEq),
            GtEq => Some(Lt),
            StartsWith => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Comparison { field: String, op: ComparisonOperator, value: Literal },
    IsNull { field: String, negated: bool },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    True,
    False,
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate { Predicate::And(Box::new(self), Box::new(other)) }
    pub fn or(self, other: Predicate) -> Predicate { Predicate::Or(Box::new(self), Box::new(other)) }
    pub fn not(self) -> Predicate { Predicate::Not(Box::new(self)) }

    pub fn eq(field: impl Into<String>, value: Literal) -> Predicate {
        Predicate::Comparison { field: field.into(), op: ComparisonOperator::Eq, value }
    }

    pub fn cmp(field: impl Into<String>, op: ComparisonOperator, value: Literal) -> Predicate {
        Predicate::Comparison { field: field.into(), op, value }
    }

    /// Top-level field name for leaf predicates, used by the enumerator to match an
    /// index's leading key expression. `None` for compound/boolean predicates.
    pub fn leaf_field(&self) -> Option<&str> {
        match self {
            Predicate::Comparison { field, .. } => Some(field),
            Predicate::IsNull { field, .. } => Some(field),
            _ => None,
        }
    }
}
