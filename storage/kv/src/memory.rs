//! Dependency-free `KvStore` for tests across every higher layer (record store, index
//! subsystem, query planner), the way the ambient codebase keeps a `sled`-backed
//! engine available for integration-style tests without a network dependency. This
//! backend uses snapshot-on-begin, first-committer-wins optimistic concurrency: cheap
//! and correct for the data volumes exercised in tests, and it gives `TransactionConflict`
//! real, exercisable semantics rather than a stub that never fires.

use crate::error::KvError;
use crate::traits::{decode_counter, encode_counter, KvPair, KvStore, KvTransaction};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

struct Inner {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    version: u64,
}

pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self { inner: Arc::new(Mutex::new(Inner { data: BTreeMap::new(), version: 0 })) } }
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn KvTransaction>, KvError> {
        let guard = self.inner.lock().map_err(|_| KvError::Backend("poisoned lock".into()))?;
        Ok(Box::new(MemoryTransaction { inner: self.inner.clone(), base_version: guard.version, local: guard.data.clone() }))
    }
}

pub struct MemoryTransaction {
    inner: Arc<Mutex<Inner>>,
    base_version: u64,
    local: BTreeMap<Vec<u8>, Vec<u8>>,
}

#[async_trait]
impl KvTransaction for MemoryTransaction {
    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> { Ok(self.local.get(key).cloned()) }

    async fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        self.local.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn clear(&mut self, key: &[u8]) -> Result<(), KvError> {
        self.local.remove(key);
        Ok(())
    }

    async fn clear_range(&mut self, begin: &[u8], end: &[u8]) -> Result<(), KvError> {
        let keys: Vec<Vec<u8>> = self.local.range(begin.to_vec()..end.to_vec()).map(|(k, _)| k.clone()).collect();
        for k in keys {
            self.local.remove(&k);
        }
        Ok(())
    }

    async fn get_range(&mut self, begin: &[u8], end: &[u8], limit: Option<usize>) -> Result<Vec<KvPair>, KvError> {
        let iter = self.local.range(begin.to_vec()..end.to_vec()).map(|(k, v)| (k.clone(), v.clone()));
        Ok(match limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        })
    }

    async fn atomic_add(&mut self, key: &[u8], delta: i64) -> Result<(), KvError> {
        let current = decode_counter(self.local.get(key).map(|v| v.as_slice()));
        self.local.insert(key.to_vec(), encode_counter(current + delta).to_vec());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), KvError> {
        let mut guard = self.inner.lock().map_err(|_| KvError::Backend("poisoned lock".into()))?;
        if guard.version != self.base_version {
            return Err(KvError::Conflict);
        }
        guard.data = self.local;
        guard.version += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), KvError> { Ok(()) }
}
