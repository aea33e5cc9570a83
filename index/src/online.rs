//! C9: the Online Indexer. Walks a record type's full range in small batches,
//! checkpointing progress into a `RangeSet` in the same transaction as the index
//! writes it produces, so a crash between batches duplicates no work and loses no
//! progress (§4.5, §8 scenario E).
//!
//! The batch loop itself has no direct precedent in the ambient codebase, which
//! builds an index with one synchronous pass (`storage/sled/src/index.rs::backfill`)
//! and accepts rebuilding from scratch on crash. Resumability is new, driven by
//! §4.4/§4.5; the lease is likewise a new design built as a KV-resident row rather
//! than an external coordinator since this layer has no other place to put cluster
//! state.

use crate::maintainer::IndexMaintainer;
use crate::range_set::RangeSet;
use crate::state::{IndexState, IndexStateManager};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use strata_core::{with_retry, Cancellation, Codec, RecordType, Schema, StoreError};
use strata_keyspace::Keyspace;
use strata_storage_kv::{KvStore, KvTransaction};

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Records examined per transaction (§4.5's "bounded batch").
    pub batch_size: usize,
    /// Delay between batches, easing load on the KV store during a long backfill.
    pub throttle: Duration,
    /// Retries for a single batch transaction before giving up with whatever error
    /// caused the last conflict.
    pub max_conflict_retries: u32,
    /// How long a lease is held before another indexer may claim the same index.
    pub lease_ttl_ms: i64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            throttle: Duration::from_millis(50),
            max_conflict_retries: 5,
            lease_ttl_ms: 30_000,
        }
    }
}

/// A KV-resident mutual-exclusion lease, one row per index under its `index_build`
/// child subspace, at a reserved raw suffix no real range-set key can collide with.
pub struct Lease;

#[derive(Debug, Serialize, Deserialize)]
struct LeaseRow {
    owner: String,
    expires_at_ms: i64,
}

const LEASE_SUFFIX: &[u8] = b"\0\0lease";

impl Lease {
    fn key(keyspace: &Keyspace, index_name: &str) -> Vec<u8> {
        keyspace.index_build.child(index_name).pack_raw(LEASE_SUFFIX)
    }

    /// Claims the lease for `owner` if it's free or expired, extending it to
    /// `now_ms + ttl_ms`. Returns whether the caller now holds it. Callers pass
    /// `now_ms` explicitly rather than reading the wall clock, keeping this function
    /// pure and unit-testable.
    pub async fn try_acquire(
        txn: &mut dyn KvTransaction,
        keyspace: &Keyspace,
        index_name: &str,
        owner: &str,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<bool, StoreError> {
        let key = Self::key(keyspace, index_name);
        if let Some(bytes) = txn.get(&key).await? {
            let row: LeaseRow = bincode::deserialize(&bytes).map_err(|e| StoreError::SerializationError(e.to_string()))?;
            if row.owner != owner && row.expires_at_ms > now_ms {
                return Ok(false);
            }
        }
        let row = LeaseRow { owner: owner.to_string(), expires_at_ms: now_ms + ttl_ms };
        let bytes = bincode::serialize(&row).map_err(|e| StoreError::SerializationError(e.to_string()))?;
        txn.set(&key, &bytes).await?;
        Ok(true)
    }

    pub async fn release(
        txn: &mut dyn KvTransaction,
        keyspace: &Keyspace,
        index_name: &str,
        owner: &str,
        now_ms: i64,
    ) -> Result<(), StoreError> {
        let key = Self::key(keyspace, index_name);
        if let Some(bytes) = txn.get(&key).await? {
            let row: LeaseRow = bincode::deserialize(&bytes).map_err(|e| StoreError::SerializationError(e.to_string()))?;
            if row.owner == owner && row.expires_at_ms > now_ms {
                txn.clear(&key).await?;
            }
        }
        Ok(())
    }
}

pub struct OnlineIndexer<C: Codec> {
    maintainer: Arc<IndexMaintainer>,
    codec: Arc<C>,
    keyspace: Keyspace,
    config: IndexerConfig,
}

impl<C: Codec> OnlineIndexer<C> {
    pub fn new(maintainer: Arc<IndexMaintainer>, codec: Arc<C>, keyspace: Keyspace, config: IndexerConfig) -> Self {
        Self { maintainer, codec, keyspace, config }
    }

    /// Moves the index from `disabled` to `write_only`: every subsequent live write
    /// now maintains it, while a backfill catches up the records that predate this
    /// moment (§3.4).
    pub async fn start(&self, store: &dyn KvStore, index_name: &str) -> Result<(), StoreError> {
        with_retry(store, self.config.max_conflict_retries, |txn| {
            IndexStateManager::transition(txn, &self.keyspace, index_name, IndexState::Disabled, IndexState::WriteOnly)
        })
        .await
    }

    fn record_type<'a>(&self, schema: &'a Schema, index_name: &str) -> Result<&'a RecordType, StoreError> {
        let index = schema
            .index(index_name)
            .ok_or_else(|| StoreError::InvalidArgument(format!("unknown index '{index_name}'")))?;
        schema
            .record_type(&index.record_type)
            .ok_or_else(|| StoreError::InvalidArgument(format!("unknown record type '{}'", index.record_type)))
    }

    /// Runs one bounded batch: finds the first gap in the checkpointed range-set,
    /// scans up to `batch_size` records from it, maintains the index for each, and
    /// extends the range-set to cover what was scanned — all in one KV transaction,
    /// so a crash mid-batch leaves the checkpoint consistent with the index writes
    /// (§4.5). Returns `true` once the full range is covered.
    pub async fn run_batch(&self, store: &dyn KvStore, schema: &Schema, index_name: &str) -> Result<bool, StoreError> {
        let rt = self.record_type(schema, index_name)?.clone();
        let (full_begin, full_end) = self
            .maintainer
            .keyspace()
            .record
            .prefix_range(&strata_keyspace::Tuple::new(vec![strata_keyspace::TypedValue::String(rt.name.clone())]));
        let batch_size = self.config.batch_size;
        let keyspace = self.keyspace.clone();
        let maintainer = self.maintainer.clone();
        let codec = self.codec.clone();
        let index_name = index_name.to_string();

        with_retry(store, self.config.max_conflict_retries, move |txn| {
            let keyspace = keyspace.clone();
            let maintainer = maintainer.clone();
            let codec = codec.clone();
            let index_name = index_name.clone();
            let rt = rt.clone();
            let full_begin = full_begin.clone();
            let full_end = full_end.clone();
            async move {
                let mut range_set = RangeSet::load(txn, &keyspace, &index_name).await?;
                let gaps = range_set.missing(&full_begin, &full_end);
                let Some((gap_begin, gap_end)) = gaps.into_iter().next() else {
                    return Ok(true);
                };

                let pairs = txn.get_range(&gap_begin, &gap_end, Some(batch_size)).await?;
                if pairs.is_empty() {
                    // No records left in this gap; it's covered by definition.
                    range_set.insert(gap_begin, gap_end);
                    range_set.persist(txn, &keyspace, &index_name).await?;
                    return Ok(range_set.missing(&full_begin, &full_end).is_empty());
                }

                let covered_end = if pairs.len() < batch_size {
                    gap_end.clone()
                } else {
                    strata_keyspace::lex_successor(pairs.last().unwrap().0.clone())
                };

                for (_, value) in &pairs {
                    let record = codec.decode(&rt.name, value)?;
                    maintainer.build_index_entry(txn, &*codec, &index_name, &rt, &record).await?;
                }

                range_set.insert(gap_begin, covered_end);
                range_set.persist(txn, &keyspace, &index_name).await?;
                Ok(range_set.missing(&full_begin, &full_end).is_empty())
            }
        })
        .await
    }

    /// Drives batches to completion, honoring `cancel` between them, then transitions
    /// the index to `readable` once fully caught up (§3.4, §4.5).
    pub async fn run_to_completion(
        &self,
        store: &dyn KvStore,
        schema: &Schema,
        index_name: &str,
        cancel: &Cancellation,
    ) -> Result<(), StoreError> {
        loop {
            cancel.check()?;
            let done = self.run_batch(store, schema, index_name).await?;
            if done {
                break;
            }
            tokio::time::sleep(self.config.throttle).await;
        }
        with_retry(store, self.config.max_conflict_retries, |txn| {
            IndexStateManager::transition(txn, &self.keyspace, index_name, IndexState::WriteOnly, IndexState::Readable)
        })
        .await
    }
}
