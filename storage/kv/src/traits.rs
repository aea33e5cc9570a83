//! The ordered transactional KV abstraction every upper layer is written against.
//!
//! Generalized from the ambient codebase's async `StorageEngine`/`StorageBucket`
//! trait pair (`core/src/storage/mod.rs`): there, a bucket exposes point get/set over
//! an opaque record blob with no explicit transaction object, since that codebase's
//! consistency model sits above the storage engine. Here, §1 requires the KV itself to
//! provide strictly serializable transactions and ordered byte-lexicographic ranged
//! reads, so `KvTransaction` is promoted to a first-class, explicitly committed object.

use crate::error::KvError;
use async_trait::async_trait;

/// A key-value pair returned from a ranged read, in ascending byte-lexicographic key
/// order.
pub type KvPair = (Vec<u8>, Vec<u8>);

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Begin a new transaction. Transactions do not nest; each caller-held transaction
    /// owns its own isolated view until `commit`/`rollback` (§5, "scoped acquisition of
    /// a transaction with guaranteed release on all exit paths").
    async fn begin(&self) -> Result<Box<dyn KvTransaction>, KvError>;
}

#[async_trait]
pub trait KvTransaction: Send {
    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;

    async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvError>;

    async fn clear(&mut self, key: &[u8]) -> Result<(), KvError>;

    /// Clear every key in `[begin, end)`.
    async fn clear_range(&mut self, begin: &[u8], end: &[u8]) -> Result<(), KvError>;

    /// Ascending-order scan over `[begin, end)`, optionally capped at `limit` entries.
    async fn get_range(&mut self, begin: &[u8], end: &[u8], limit: Option<usize>) -> Result<Vec<KvPair>, KvError>;

    /// Atomically add `delta` to the little-endian `i64` stored at `key`, treating an
    /// absent key as zero. Used for count/sum index maintenance (§4.2), where two
    /// concurrent updates to the same group must not lose an update.
    async fn atomic_add(&mut self, key: &[u8], delta: i64) -> Result<(), KvError>;

    /// Commit all buffered writes atomically. `Err(KvError::Conflict)` is retryable by
    /// the caller per §7.
    async fn commit(self: Box<Self>) -> Result<(), KvError>;

    /// Discard all buffered writes. Always succeeds; used on the rollback path of the
    /// caller's scoped transaction guard.
    async fn rollback(self: Box<Self>) -> Result<(), KvError>;
}

/// Read a little-endian `i64` counter, defaulting to zero when absent. Shared by the
/// in-memory and sled backends' `atomic_add` implementations.
pub fn decode_counter(bytes: Option<&[u8]>) -> i64 {
    match bytes {
        Some(b) if b.len() == 8 => i64::from_le_bytes(b.try_into().unwrap()),
        _ => 0,
    }
}

pub fn encode_counter(value: i64) -> [u8; 8] { value.to_le_bytes() }
