//! The query executor (§4.1, §9): walks a chosen `Plan` against an open transaction
//! to yield decoded records one at a time. The planner decides *what* to run; this
//! module is the only place that actually touches the KV to run it, mirroring the
//! way `core::store::RecordCursor` buffers one batch at a time so a caller can honor
//! cancellation between batches (§5) — generalized here from a single flat range to
//! a whole plan tree. No precedent in the ambient codebase: its planner never got
//! far enough to need an executor, so the recursive plan-walk below is built
//! directly against §4.9's five plan shapes.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use strata_core::{Codec, RecordCursor, RecordStore, StoreError};
use strata_keyspace::{Tuple, TypedValue};
use strata_ql::{ComparisonOperator, Literal, Predicate};
use strata_storage_kv::KvTransaction;

use crate::plan::Plan;

/// Records fetched per KV batch for a leaf scan (`FullScan`/`IndexScan`). Matches
/// `RecordStore::scan`'s own default in spirit; not configurable since the executor
/// has no ambient config object of its own.
const BATCH_SIZE: usize = 256;

/// Evaluates `predicate` against a decoded record via the codec's field projection.
/// The rewriter and cost estimator only ever reason about a `Predicate` in the
/// abstract; this is the one place it's actually tested against a live record.
pub fn matches<C: Codec>(predicate: &Predicate, codec: &C, record: &C::Record) -> bool {
    match predicate {
        Predicate::True => true,
        Predicate::False => false,
        Predicate::Not(inner) => !matches(inner, codec, record),
        Predicate::And(a, b) => matches(a, codec, record) && matches(b, codec, record),
        Predicate::Or(a, b) => matches(a, codec, record) || matches(b, codec, record),
        Predicate::IsNull { field, negated } => {
            let is_null = match codec.field_value(record, field) {
                Some(TypedValue::Null) => true,
                Some(_) => false,
                None => true, // Absent reads as null for this purpose.
            };
            is_null != *negated
        }
        Predicate::Comparison { field, op, value } => match codec.field_value(record, field) {
            Some(field_value) => compare(&field_value, *op, value),
            None => false,
        },
    }
}

fn compare(field_value: &TypedValue, op: ComparisonOperator, value: &Literal) -> bool {
    let rhs = TypedValue::from(value.clone());
    use std::cmp::Ordering::*;
    match op {
        ComparisonOperator::Eq => *field_value == rhs,
        ComparisonOperator::NotEq => *field_value != rhs,
        ComparisonOperator::Lt => field_value.partial_cmp(&rhs) == Some(Less),
        ComparisonOperator::LtEq => matches!(field_value.partial_cmp(&rhs), Some(Less | Equal)),
        ComparisonOperator::Gt => field_value.partial_cmp(&rhs) == Some(Greater),
        ComparisonOperator::GtEq => matches!(field_value.partial_cmp(&rhs), Some(Greater | Equal)),
        ComparisonOperator::StartsWith => match (field_value, value) {
            (TypedValue::String(s), Literal::String(prefix)) => s.starts_with(prefix.as_str()),
            _ => false,
        },
    }
}

/// A lazy, forward-only, non-restartable sequence of decoded records realizing a
/// chosen `Plan` (§9). Borrows the transaction only for the duration of each
/// `next` call, same as `RecordCursor`, so the caller keeps transaction scope (§5).
pub struct QueryCursor<'a, C: Codec> {
    store: &'a RecordStore<C>,
    inner: Inner<'a, C>,
}

enum Inner<'a, C: Codec> {
    FullScan { cursor: RecordCursor, record_type: String, filter: Predicate },
    IndexScan { cursor: RecordCursor, index_name: String, record_type: String, residual: Predicate },
    /// Already fully resolved: the PK intersection and the record loads both
    /// happened during `open`, so `next` here is pure in-memory popping.
    Intersection { rows: VecDeque<C::Record> },
    Union { children: Vec<QueryCursor<'a, C>>, current: usize, seen: HashSet<Vec<u8>>, record_type: String },
    Limit { inner: Box<QueryCursor<'a, C>>, remaining: u64 },
}

impl<'a, C: Codec> QueryCursor<'a, C> {
    /// Builds a cursor for `plan`. `Intersection` needs to resolve both sides' primary
    /// keys before it can start yielding anything, so this itself touches the KV —
    /// unlike `RecordCursor::new`, `open` is async.
    pub fn open<'f>(
        store: &'a RecordStore<C>,
        txn: &'f mut dyn KvTransaction,
        plan: &'f Plan,
    ) -> Pin<Box<dyn Future<Output = Result<Self, StoreError>> + Send + 'f>>
    where
        'a: 'f,
    {
        Box::pin(async move {
            let inner = match plan {
                Plan::FullScan { record_type, filter } => Inner::FullScan {
                    cursor: store.scan(record_type, BATCH_SIZE),
                    record_type: record_type.clone(),
                    filter: filter.clone(),
                },
                Plan::IndexScan { index_name, record_type, range, residual, .. } => Inner::IndexScan {
                    cursor: RecordCursor::new(range.begin.clone(), range.end.clone(), BATCH_SIZE),
                    index_name: index_name.clone(),
                    record_type: record_type.clone(),
                    residual: residual.clone(),
                },
                Plan::Intersection { children, .. } => {
                    let mut materialized: Vec<Vec<(Vec<u8>, C::Record)>> = Vec::with_capacity(children.len());
                    for child in children {
                        materialized.push(materialize_pks(store, txn, child).await?);
                    }
                    // §4.8's cost note names the smallest stream as the one that should
                    // drive the merge; here that just decides iteration order, since
                    // every side was already fully resolved above.
                    let driver_idx = materialized
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, rows)| rows.len())
                        .map(|(i, _)| i)
                        .unwrap_or(0);
                    let driver = materialized.remove(driver_idx);
                    let others: Vec<HashSet<Vec<u8>>> =
                        materialized.into_iter().map(|rows| rows.into_iter().map(|(pk, _)| pk).collect()).collect();
                    let rows: VecDeque<C::Record> = driver
                        .into_iter()
                        .filter(|(pk, _)| others.iter().all(|set| set.contains(pk)))
                        .map(|(_, record)| record)
                        .collect();
                    Inner::Intersection { rows }
                }
                Plan::Union { children, record_type } => {
                    let mut cursors = Vec::with_capacity(children.len());
                    for child in children {
                        cursors.push(QueryCursor::open(store, txn, child).await?);
                    }
                    Inner::Union { children: cursors, current: 0, seen: HashSet::new(), record_type: record_type.clone() }
                }
                Plan::Limit { child, n } => {
                    Inner::Limit { inner: Box::new(QueryCursor::open(store, txn, child).await?), remaining: *n }
                }
            };
            Ok(Self { store, inner })
        })
    }

    /// Pulls the next matching record, or `None` once the plan is exhausted.
    pub fn next<'f>(&'f mut self, txn: &'f mut dyn KvTransaction) -> Pin<Box<dyn Future<Output = Result<Option<C::Record>, StoreError>> + Send + 'f>> {
        Box::pin(async move {
            match &mut self.inner {
                Inner::FullScan { cursor, record_type, filter } => loop {
                    match cursor.next_record(txn, record_type, self.store.codec()).await? {
                        Some(record) if matches(filter, self.store.codec(), &record) => return Ok(Some(record)),
                        Some(_) => continue,
                        None => return Ok(None),
                    }
                },
                Inner::IndexScan { cursor, index_name, record_type, residual } => loop {
                    let Some((key, _)) = cursor.next_pair(txn).await? else { return Ok(None) };
                    let Some(pk) = pk_from_index_key(self.store, index_name, &key) else { continue };
                    let Some(record) = self.store.load(txn, record_type, &pk).await? else { continue };
                    if matches(residual, self.store.codec(), &record) {
                        return Ok(Some(record));
                    }
                },
                Inner::Intersection { rows } => Ok(rows.pop_front()),
                Inner::Union { children, current, seen, record_type } => loop {
                    if *current >= children.len() {
                        return Ok(None);
                    }
                    match children[*current].next(txn).await? {
                        Some(record) => {
                            let rt = self
                                .store
                                .schema()
                                .record_type(record_type)
                                .expect("union plan references a record type present in the schema");
                            let pk = rt
                                .primary_key
                                .evaluate(self.store.codec(), &record)
                                .expect("primary key field is absent on a stored record");
                            if seen.insert(pk.encode()) {
                                return Ok(Some(record));
                            }
                            // Already yielded by an earlier disjunct; keep draining this child.
                        }
                        None => *current += 1,
                    }
                },
                Inner::Limit { inner, remaining } => {
                    if *remaining == 0 {
                        return Ok(None);
                    }
                    match inner.next(txn).await? {
                        Some(record) => {
                            *remaining -= 1;
                            Ok(Some(record))
                        }
                        None => Ok(None),
                    }
                }
            }
        })
    }
}

/// Runs `plan` to completion, pairing each yielded record with its encoded primary
/// key. Used only to resolve an `Intersection`'s children, each of which must be
/// fully drained before the intersection itself can yield its first row.
async fn materialize_pks<C: Codec>(
    store: &RecordStore<C>,
    txn: &mut dyn KvTransaction,
    plan: &Plan,
) -> Result<Vec<(Vec<u8>, C::Record)>, StoreError> {
    let mut cursor = QueryCursor::open(store, txn, plan).await?;
    let rt = store
        .schema()
        .record_type(plan.record_type())
        .expect("intersection child references a record type present in the schema");
    let mut out = Vec::new();
    while let Some(record) = cursor.next(txn).await? {
        let pk = rt.primary_key.evaluate(store.codec(), &record).expect("primary key field is absent on a stored record");
        out.push((pk.encode(), record));
    }
    Ok(out)
}

/// Recovers an index entry's primary-key tuple from its raw key bytes: strip the
/// index subspace prefix, decode the full tuple, then drop the leading index-name
/// component and the index's own key-expression components, leaving exactly the
/// primary-key suffix (§3.3 invariant 2).
fn pk_from_index_key<C: Codec>(store: &RecordStore<C>, index_name: &str, key: &[u8]) -> Option<Tuple> {
    let index = store.schema().index(index_name)?;
    let prefix_len = store.keyspace().index.as_bytes().len();
    let body = key.get(prefix_len..)?;
    let full = Tuple::decode(body)?;
    let skip = 1 + index.key_expr.arity();
    if full.len() <= skip {
        return None;
    }
    Some(Tuple::new(full.0[skip..].to_vec()))
}
