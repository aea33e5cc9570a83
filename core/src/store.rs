//! C5: the typed record store. CRUD against the `record` subspace, dispatching
//! index side-effects to an injected `IndexSink` rather than holding one directly —
//! the "cyclic references" redesign note (§9) broken exactly this way: the maintainer
//! is stateless and parameterized by the schema/codec pair passed in at each call,
//! and the store never holds a back-reference to whatever owns it.

use crate::codec::Codec;
use crate::error::StoreError;
use crate::schema::{RecordType, Schema};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use strata_keyspace::{lex_successor, Keyspace, Tuple, TypedValue};
use strata_storage_kv::KvTransaction;

/// The state-aware index maintenance hook `RecordStore::save`/`delete` call into
/// (§4.1: "instruct Index Maintainer to ..."). Implemented by `strata-index`'s
/// `IndexMaintainer`; kept as a trait here so this crate never depends on the index
/// crate.
#[async_trait]
pub trait IndexSink<C: Codec>: Send + Sync {
    async fn on_save(
        &self,
        txn: &mut dyn KvTransaction,
        codec: &C,
        record_type: &RecordType,
        pk: &Tuple,
        old: Option<&C::Record>,
        new: &C::Record,
    ) -> Result<(), StoreError>;

    async fn on_delete(
        &self,
        txn: &mut dyn KvTransaction,
        codec: &C,
        record_type: &RecordType,
        pk: &Tuple,
        old: &C::Record,
    ) -> Result<(), StoreError>;
}

/// A no-op sink for callers with no maintained indexes (tests, or a record type with
/// none declared).
pub struct NoIndexes;

#[async_trait]
impl<C: Codec> IndexSink<C> for NoIndexes {
    async fn on_save(&self, _: &mut dyn KvTransaction, _: &C, _: &RecordType, _: &Tuple, _: Option<&C::Record>, _: &C::Record) -> Result<(), StoreError> {
        Ok(())
    }
    async fn on_delete(&self, _: &mut dyn KvTransaction, _: &C, _: &RecordType, _: &Tuple, _: &C::Record) -> Result<(), StoreError> {
        Ok(())
    }
}

pub struct RecordStore<C: Codec> {
    schema: Arc<Schema>,
    keyspace: Keyspace,
    codec: C,
}

impl<C: Codec> RecordStore<C> {
    pub fn new(schema: Arc<Schema>, keyspace: Keyspace, codec: C) -> Self { Self { schema, keyspace, codec } }

    pub fn schema(&self) -> &Schema { &self.schema }
    pub fn keyspace(&self) -> &Keyspace { &self.keyspace }
    pub fn codec(&self) -> &C { &self.codec }

    fn record_type(&self, name: &str) -> Result<&RecordType, StoreError> {
        self.schema.record_type(name).ok_or_else(|| StoreError::InvalidArgument(format!("unknown record type '{name}'")))
    }

    fn record_key(&self, record_type: &str, pk: &Tuple) -> Vec<u8> {
        let mut full = Tuple::new(vec![TypedValue::String(record_type.to_string())]);
        full.0.extend(pk.0.clone());
        self.keyspace.record.pack(&full)
    }

    /// `save`: insert or update. On update, the old record is read first so the
    /// sink can retract its stale index entries before inserting fresh ones (§4.1).
    pub async fn save<S: IndexSink<C>>(
        &self,
        txn: &mut dyn KvTransaction,
        index_sink: &S,
        record_type: &str,
        record: &C::Record,
    ) -> Result<(), StoreError> {
        let rt = self.record_type(record_type)?;
        let pk = rt
            .primary_key
            .evaluate(&self.codec, record)
            .ok_or_else(|| StoreError::SerializationError("primary key field is absent".into()))?;
        let key = self.record_key(record_type, &pk);

        let old_bytes = txn.get(&key).await?;
        let old_record = match old_bytes {
            Some(bytes) => Some(self.codec.decode(record_type, &bytes)?),
            None => None,
        };

        let new_bytes = self.codec.encode(record)?;
        txn.set(&key, &new_bytes).await?;

        index_sink.on_save(txn, &self.codec, rt, &pk, old_record.as_ref(), record).await
    }

    pub async fn load(&self, txn: &mut dyn KvTransaction, record_type: &str, pk: &Tuple) -> Result<Option<C::Record>, StoreError> {
        let key = self.record_key(record_type, pk);
        match txn.get(&key).await? {
            Some(bytes) => Ok(Some(self.codec.decode(record_type, &bytes)?)),
            None => Ok(None),
        }
    }

    /// `delete`: reads the old record to compute its live index entries, then
    /// removes the record and all such entries in the same transaction. Deleting an
    /// absent primary key is a no-op, matching `load`'s "absent, not raised".
    pub async fn delete<S: IndexSink<C>>(
        &self,
        txn: &mut dyn KvTransaction,
        index_sink: &S,
        record_type: &str,
        pk: &Tuple,
    ) -> Result<(), StoreError> {
        let rt = self.record_type(record_type)?;
        let key = self.record_key(record_type, pk);
        let Some(bytes) = txn.get(&key).await? else {
            return Ok(());
        };
        let old_record = self.codec.decode(record_type, &bytes)?;
        txn.clear(&key).await?;
        index_sink.on_delete(txn, &self.codec, rt, pk, &old_record).await
    }

    /// A ranged read over the record subspace restricted to `record_type`, as a
    /// lazy forward-only cursor (§4.1, §5). `None` bounds cover the whole type.
    pub fn scan(&self, record_type: &str, batch_size: usize) -> RecordCursor {
        let (begin, end) = self.keyspace.record.prefix_range(&Tuple::new(vec![TypedValue::String(record_type.to_string())]));
        RecordCursor::new(begin, end, batch_size)
    }

    /// A cursor restricted to an explicit `[begin, end)` sub-range of the record
    /// subspace, used by the Online Indexer to walk one batch at a time (§4.5).
    pub fn scan_range(&self, begin: Vec<u8>, end: Vec<u8>, batch_size: usize) -> RecordCursor {
        RecordCursor::new(begin, end, batch_size)
    }

    /// `[begin, end)` spanning the entirety of a record type's keyspace, used as the
    /// Online Indexer's and the statistics collector's full-range bound.
    pub fn full_range(&self, record_type: &str) -> (Vec<u8>, Vec<u8>) {
        self.keyspace.record.prefix_range(&Tuple::new(vec![TypedValue::String(record_type.to_string())]))
    }
}

/// A lazy, forward-only, non-restartable sequence of raw record rows (§9: "Query
/// cursors are a lazy, forward-only, non-restartable sequence of records"). Buffers
/// one KV batch at a time rather than the whole range, so a caller can honor
/// cancellation between batches (§5).
pub struct RecordCursor {
    begin: Vec<u8>,
    end: Vec<u8>,
    batch_size: usize,
    buffer: VecDeque<(Vec<u8>, Vec<u8>)>,
    exhausted: bool,
}

impl RecordCursor {
    pub fn new(begin: Vec<u8>, end: Vec<u8>, batch_size: usize) -> Self {
        Self { begin, end, batch_size: batch_size.max(1), buffer: VecDeque::new(), exhausted: false }
    }

    /// Pulls the next raw `(key, value)` pair, fetching a new batch from the KV
    /// when the buffer runs dry. Returns `None` once the range is exhausted.
    pub async fn next_pair(&mut self, txn: &mut dyn KvTransaction) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        loop {
            if let Some(pair) = self.buffer.pop_front() {
                return Ok(Some(pair));
            }
            if self.exhausted {
                return Ok(None);
            }
            let pairs = txn.get_range(&self.begin, &self.end, Some(self.batch_size)).await?;
            if pairs.is_empty() {
                self.exhausted = true;
                continue;
            }
            if pairs.len() < self.batch_size {
                self.exhausted = true;
            }
            if let Some((last_key, _)) = pairs.last() {
                self.begin = lex_successor(last_key.clone());
            }
            self.buffer.extend(pairs);
        }
    }

    /// Pulls and decodes the next record, given the codec/type needed to do so.
    pub async fn next_record<C: Codec>(
        &mut self,
        txn: &mut dyn KvTransaction,
        record_type: &str,
        codec: &C,
    ) -> Result<Option<C::Record>, StoreError> {
        match self.next_pair(txn).await? {
            Some((_, value)) => Ok(Some(codec.decode(record_type, &value)?)),
            None => Ok(None),
        }
    }

    pub fn is_exhausted(&self) -> bool { self.exhausted && self.buffer.is_empty() }
}
