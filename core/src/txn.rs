//! C4: the scoped-transaction convenience the rest of the crate is written against.
//!
//! The caller owns transaction scope (a scoped acquisition of a transaction with
//! guaranteed release on all exit paths); the retry loop is not mandated by the
//! core itself, but this crate ships the one-line wrapper anyway, the way the
//! ambient codebase ships `Transaction` (`core/src/transaction.rs`) alongside the
//! lower-level engine trait rather than leaving callers to hand-roll
//! commit/rollback bookkeeping.

use crate::error::StoreError;
use std::future::Future;
use strata_storage_kv::{KvStore, KvTransaction};

/// Cooperative cancellation signal, checked at KV suspension points (§5). Cheap to
/// clone and share between a query cursor and whatever owns its deadline.
#[derive(Clone, Default)]
pub struct Cancellation(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl Cancellation {
    pub fn new() -> Self { Self::default() }
    pub fn cancel(&self) { self.0.store(true, std::sync::atomic::Ordering::SeqCst); }
    pub fn is_cancelled(&self) -> bool { self.0.load(std::sync::atomic::Ordering::SeqCst) }

    pub fn check(&self) -> Result<(), StoreError> {
        if self.is_cancelled() {
            Err(StoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Runs `op` inside a fresh transaction, committing on success and rolling back on
/// any error. Retries automatically only on `StoreError::TransactionConflict` (§7:
/// "Only TransactionConflict is retryable automatically by the convenience
/// wrapper; all others propagate to the caller"), up to `max_attempts` tries.
pub async fn with_retry<F, Fut, T>(store: &dyn KvStore, max_attempts: u32, mut op: F) -> Result<T, StoreError>
where
    F: FnMut(&mut dyn KvTransaction) -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0u32;
    loop {
        let mut txn = store.begin().await?;
        match op(txn.as_mut()).await {
            Ok(value) => {
                txn.commit().await?;
                return Ok(value);
            }
            Err(StoreError::TransactionConflict) => {
                let _ = txn.rollback().await;
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(StoreError::TransactionConflict);
                }
                tracing::warn!(attempt, "transaction conflict, retrying");
                continue;
            }
            Err(other) => {
                let _ = txn.rollback().await;
                return Err(other);
            }
        }
    }
}
