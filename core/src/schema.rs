//! C3: record types, key expressions, index definitions, and the schema that binds
//! them. Expanded from the ambient codebase's single-method `CollectionSchema` trait
//! (`core/src/schema.rs`, which answers only "what type is this field") into the
//! full resolved data structure §3.2/§6 requires the core to consume — no macro, no
//! ambient global: one `Schema` is bound at store construction and never mutated.

use crate::codec::Codec;
use crate::error::StoreError;
use strata_keyspace::{Tuple, TypedValue};
use std::collections::HashMap;

/// A tree of `Field`/`Concatenate` nodes projecting a record into a `Tuple` (§3.2).
/// Evaluation is pure and deterministic, so a record's primary-key tuple is stable
/// across its lifetime, per the invariant named in the same section.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyExpression {
    Field(String),
    Concatenate(Vec<KeyExpression>),
}

impl KeyExpression {
    pub fn field(name: impl Into<String>) -> Self { KeyExpression::Field(name.into()) }
    pub fn concat(parts: impl IntoIterator<Item = KeyExpression>) -> Self {
        KeyExpression::Concatenate(parts.into_iter().collect())
    }

    /// The leading field name, used by the plan enumerator to match a predicate's
    /// field against an index's leading key expression (§4.9).
    pub fn leading_field(&self) -> Option<&str> {
        match self {
            KeyExpression::Field(name) => Some(name),
            KeyExpression::Concatenate(parts) => parts.first().and_then(KeyExpression::leading_field),
        }
    }

    /// The number of `Field` leaves this expression evaluates to, i.e. the tuple
    /// width `evaluate` produces. Used to split an index entry's encoded tuple back
    /// into its key portion and its trailing primary-key portion (§3.3 invariant 2:
    /// the primary key is always the tuple suffix).
    pub fn arity(&self) -> usize {
        match self {
            KeyExpression::Field(_) => 1,
            KeyExpression::Concatenate(parts) => parts.iter().map(KeyExpression::arity).sum(),
        }
    }

    /// Every `Field` leaf name, in evaluation order. Used to decide whether an
    /// index's stored entries alone cover a set of requested field names.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            KeyExpression::Field(name) => out.push(name),
            KeyExpression::Concatenate(parts) => {
                for part in parts {
                    part.collect_fields(out);
                }
            }
        }
    }

    /// Evaluates this expression against a record. Returns `None` ("Absent") if any
    /// leaf field is absent — the caller decides what that means (a hard error for a
    /// primary key, exclusion from a value index, or the `null_group` sentinel for
    /// an aggregate index).
    pub fn evaluate<C: Codec>(&self, codec: &C, record: &C::Record) -> Option<Tuple> {
        let mut out = Vec::new();
        self.collect(codec, record, &mut out)?;
        Some(Tuple::new(out))
    }

    fn collect<C: Codec>(&self, codec: &C, record: &C::Record, out: &mut Vec<TypedValue>) -> Option<()> {
        match self {
            KeyExpression::Field(path) => {
                out.push(codec.field_value(record, path)?);
                Some(())
            }
            KeyExpression::Concatenate(parts) => {
                for part in parts {
                    part.collect(codec, record, out)?;
                }
                Some(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordType {
    pub name: String,
    pub primary_key: KeyExpression,
}

/// The three maintained index kinds of §4.2, a closed set per the "inheritance-style
/// plan hierarchy" redesign note applied here too: extending this enum is a
/// deliberate, crate-wide change, not a plugin point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Value,
    Count,
    Sum,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub name: String,
    pub record_type: String,
    pub kind: IndexKind,
    pub key_expr: KeyExpression,
    /// Valid only when `kind == Value` (§3.2).
    pub unique: bool,
    /// Required for `Count`/`Sum`; the key expression producing the grouping tuple.
    pub grouping_expr: Option<KeyExpression>,
    /// Required for `Sum`; the field summed into the aggregate.
    pub value_expr: Option<KeyExpression>,
}

impl Index {
    /// Whether this index's stored entries alone — its key expression plus the
    /// primary-key suffix every entry carries (§3.3 invariant 2) — contain every
    /// field in `fields`, making a record fetch unnecessary to answer a query that
    /// only needs those fields. Only a `Value` index stores field values verbatim;
    /// `Count`/`Sum` entries hold aggregates, never the underlying record's fields.
    ///
    /// Nothing in the enumerator calls this yet: `RecordType` records only its
    /// primary-key expression, not the full set of fields a record carries, so there
    /// is no way to confirm a query's projection (which may be "the whole record")
    /// against an index's coverage without that declaration. See DESIGN.md.
    pub fn covers(&self, primary_key: &KeyExpression, fields: &[&str]) -> bool {
        if self.kind != IndexKind::Value {
            return false;
        }
        let key_fields = self.key_expr.fields();
        let pk_fields = primary_key.fields();
        fields.iter().all(|f| key_fields.contains(f) || pk_fields.contains(f))
    }

    fn validate(&self) -> Result<(), StoreError> {
        if self.unique && self.kind != IndexKind::Value {
            return Err(StoreError::InvalidArgument(format!(
                "index '{}': `unique` is only valid for value indexes",
                self.name
            )));
        }
        match self.kind {
            IndexKind::Value => {}
            IndexKind::Count => {
                if self.grouping_expr.is_none() {
                    return Err(StoreError::InvalidArgument(format!(
                        "index '{}': count indexes require a grouping expression",
                        self.name
                    )));
                }
            }
            IndexKind::Sum => {
                if self.grouping_expr.is_none() {
                    return Err(StoreError::InvalidArgument(format!(
                        "index '{}': sum indexes require a grouping expression",
                        self.name
                    )));
                }
                if self.value_expr.is_none() {
                    return Err(StoreError::InvalidArgument(format!(
                        "index '{}': sum indexes require a value expression",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// The fully-resolved schema the core consumes, per §6: `record_types` and `indexes`
/// constructed externally (by the macro-generated convenience API, out of scope
/// here) and handed in once.
#[derive(Debug, Clone)]
pub struct Schema {
    record_types: HashMap<String, RecordType>,
    indexes: Vec<Index>,
}

impl Schema {
    pub fn new(record_types: Vec<RecordType>, indexes: Vec<Index>) -> Result<Self, StoreError> {
        let mut by_name = HashMap::with_capacity(record_types.len());
        for rt in record_types {
            by_name.insert(rt.name.clone(), rt);
        }
        for index in &indexes {
            index.validate()?;
            if !by_name.contains_key(&index.record_type) {
                return Err(StoreError::InvalidArgument(format!(
                    "index '{}' refers to unknown record type '{}'",
                    index.name, index.record_type
                )));
            }
        }
        Ok(Self { record_types: by_name, indexes })
    }

    pub fn record_type(&self, name: &str) -> Option<&RecordType> { self.record_types.get(name) }

    pub fn record_types(&self) -> impl Iterator<Item = &RecordType> { self.record_types.values() }

    pub fn indexes_for(&self, record_type: &str) -> impl Iterator<Item = &Index> {
        self.indexes.iter().filter(move |i| i.record_type == record_type)
    }

    pub fn index(&self, name: &str) -> Option<&Index> { self.indexes.iter().find(|i| i.name == name) }

    pub fn all_indexes(&self) -> &[Index] { &self.indexes }
}
