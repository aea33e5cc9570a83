use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// The value shape the Codec's `field_value` projects a record's fields into (§6).
/// A tagged union rather than a dynamically-typed `Any` so the cross-type total order
/// of §4.6 (`null < bool < int < float < string`) is fixed by the type system, not by
/// an implementation's happenstance comparator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypedValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl TypedValue {
    pub fn type_rank(&self) -> u8 {
        match self {
            TypedValue::Null => 0,
            TypedValue::Bool(_) => 1,
            TypedValue::I64(_) => 2,
            TypedValue::F64(_) => 3,
            TypedValue::String(_) => 4,
            TypedValue::Bytes(_) => 5,
        }
    }
}

impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool { self.partial_cmp(other) == Some(Ordering::Equal) }
}

impl PartialOrd for TypedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.type_rank() != other.type_rank() {
            return Some(self.type_rank().cmp(&other.type_rank()));
        }
        match (self, other) {
            (TypedValue::Null, TypedValue::Null) => Some(Ordering::Equal),
            (TypedValue::Bool(a), TypedValue::Bool(b)) => Some(a.cmp(b)),
            (TypedValue::I64(a), TypedValue::I64(b)) => Some(a.cmp(b)),
            (TypedValue::F64(a), TypedValue::F64(b)) => a.partial_cmp(b),
            (TypedValue::String(a), TypedValue::String(b)) => Some(a.cmp(b)),
            (TypedValue::Bytes(a), TypedValue::Bytes(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<strata_ql::Literal> for TypedValue {
    fn from(lit: strata_ql::Literal) -> Self {
        match lit {
            strata_ql::Literal::Null => TypedValue::Null,
            strata_ql::Literal::Bool(b) => TypedValue::Bool(b),
            strata_ql::Literal::I64(v) => TypedValue::I64(v),
            strata_ql::Literal::F64(v) => TypedValue::F64(v),
            strata_ql::Literal::String(s) => TypedValue::String(s),
        }
    }
}
