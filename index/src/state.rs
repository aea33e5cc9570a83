//! C7: the three-state index lifecycle and its gating predicate.
//!
//! Modeled on the ambient codebase's `BuildStatus` (`storage/sled/src/index.rs`:
//! `NotBuilt`/`Building`/`Ready`, persisted alongside the index's own config row),
//! remapped to `disabled`/`write_only`/`readable` and the explicit transition table
//! of §3.3 invariant 5, rather than that file's implicit "building is monotonic,
//! call `build_if_needed` to settle it" shape. Must be consulted inside the same
//! transaction as the read/write it gates (§4.3) — every method here takes the
//! caller's open `KvTransaction`, never its own.

use serde::{Deserialize, Serialize};
use strata_core::{Schema, StoreError};
use strata_keyspace::{Keyspace, Tuple, TypedValue};
use strata_storage_kv::KvTransaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    Disabled,
    WriteOnly,
    Readable,
}

impl IndexState {
    pub fn is_disabled(&self) -> bool { matches!(self, IndexState::Disabled) }
    pub fn is_write_only(&self) -> bool { matches!(self, IndexState::WriteOnly) }
    pub fn is_readable(&self) -> bool { matches!(self, IndexState::Readable) }

    /// Index maintenance runs for `write_only` and `readable` alike (§9's resolved
    /// open question: aggregate indexes follow the same rule as value indexes).
    pub fn is_maintained(&self) -> bool { self.is_write_only() || self.is_readable() }

    fn allows_transition_to(&self, to: IndexState) -> bool {
        matches!(
            (self, to),
            (IndexState::Disabled, IndexState::WriteOnly)
                | (IndexState::WriteOnly, IndexState::Readable)
                | (_, IndexState::Disabled)
        )
    }
}

impl std::fmt::Display for IndexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IndexState::Disabled => "disabled",
            IndexState::WriteOnly => "write_only",
            IndexState::Readable => "readable",
        };
        f.write_str(s)
    }
}

pub struct IndexStateManager;

impl IndexStateManager {
    fn key(keyspace: &Keyspace, index_name: &str) -> Vec<u8> {
        keyspace.index_state.pack(&Tuple::new(vec![TypedValue::String(index_name.to_string())]))
    }

    /// An index with no persisted row is implicitly `disabled` (§3.4: created in
    /// `disabled` state when added to the schema).
    pub async fn get(txn: &mut dyn KvTransaction, keyspace: &Keyspace, index_name: &str) -> Result<IndexState, StoreError> {
        match txn.get(&Self::key(keyspace, index_name)).await? {
            Some(bytes) => bincode::deserialize(&bytes).map_err(|e| StoreError::SerializationError(e.to_string())),
            None => Ok(IndexState::Disabled),
        }
    }

    pub async fn transition(
        txn: &mut dyn KvTransaction,
        keyspace: &Keyspace,
        index_name: &str,
        from: IndexState,
        to: IndexState,
    ) -> Result<(), StoreError> {
        let current = Self::get(txn, keyspace, index_name).await?;
        if current != from || !from.allows_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                index: index_name.to_string(),
                from: current.to_string(),
                to: to.to_string(),
            });
        }
        let bytes = bincode::serialize(&to).map_err(|e| StoreError::SerializationError(e.to_string()))?;
        txn.set(&Self::key(keyspace, index_name), &bytes).await?;
        tracing::debug!(index_name, %from, %to, "index state transition");
        Ok(())
    }

    pub async fn writable_indexes(
        txn: &mut dyn KvTransaction,
        keyspace: &Keyspace,
        schema: &Schema,
        record_type: &str,
    ) -> Result<Vec<String>, StoreError> {
        let mut out = Vec::new();
        for index in schema.indexes_for(record_type) {
            if Self::get(txn, keyspace, &index.name).await?.is_maintained() {
                out.push(index.name.clone());
            }
        }
        Ok(out)
    }

    pub async fn readable_indexes(
        txn: &mut dyn KvTransaction,
        keyspace: &Keyspace,
        schema: &Schema,
        record_type: &str,
    ) -> Result<Vec<String>, StoreError> {
        let mut out = Vec::new();
        for index in schema.indexes_for(record_type) {
            if Self::get(txn, keyspace, &index.name).await?.is_readable() {
                out.push(index.name.clone());
            }
        }
        Ok(out)
    }
}
