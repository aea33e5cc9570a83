//! The Codec boundary of §6: the one external collaborator the core demands for
//! turning an opaque record into bytes, a primary-key tuple, and addressable field
//! values. The declarative schema macro that would normally generate a `Codec` impl
//! is out of scope (§1) — callers supply one by hand or via their own derive.

use crate::error::StoreError;
use crate::schema::RecordType;
use strata_keyspace::{Tuple, TypedValue};

/// `encode(record) -> bytes`, `decode(bytes) -> record`, `field_lookup(record, path)
/// -> Value`, and `primary_key_of(record) -> Tuple`, exactly as named in §1.
///
/// `field_value` resolves a dotted path (`"a.b.c"`) left-to-right; an intermediate
/// `Absent` aborts resolution returning `Absent` (§6). `Absent` is distinct from an
/// explicit `TypedValue::Null` — a present field whose value is null decodes to
/// `Some(TypedValue::Null)`, while a missing field decodes to `None`.
pub trait Codec: Send + Sync {
    type Record: Send + Sync;

    fn encode(&self, record: &Self::Record) -> Result<Vec<u8>, StoreError>;

    fn decode(&self, record_type: &str, bytes: &[u8]) -> Result<Self::Record, StoreError>;

    /// Projects a record into a primary-key tuple directly, bypassing key-expression
    /// evaluation. `RecordType::primary_key` is the declared shape of this
    /// projection and is used by callers that only hold a `Schema`; a codec
    /// implementation is free to derive one from the other.
    fn primary_key_of(&self, record_type: &RecordType, record: &Self::Record) -> Tuple;

    /// Resolves a dotted field path against a record. `None` means `Absent`.
    fn field_value(&self, record: &Self::Record, path: &str) -> Option<TypedValue>;
}
