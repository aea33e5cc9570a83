//! The abstract error taxonomy of spec §7, collapsed into a single enum per the
//! ambient codebase's layered-enum pattern (`core/src/error/mod.rs`): a closed set of
//! named variants plus one catch-all for the layer below, rather than an open
//! `anyhow`-style chain. `NotFound` is deliberately absent — §7 requires it be
//! "returned as absent, not raised", so call sites model it as `Option<T>` instead of
//! a `StoreError` variant.

use strata_storage_kv::KvError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique value-index insertion would duplicate an existing entry with a
    /// different primary key (§3.3 invariant 3).
    #[error("unique index '{index}' already has an entry for this key")]
    UniqueViolation { index: String },

    /// Codec round-trip failure, or a key expression evaluated against a record
    /// came back `Absent` where a value was required (e.g. a primary key field).
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// An index state transition not allowed by §3.3 invariant 5.
    #[error("invalid index state transition for '{index}': {from} -> {to}")]
    InvalidTransition { index: String, from: String, to: String },

    /// A parameter was out of range before any KV call was made.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The underlying KV reported a write-write conflict; retryable by the caller.
    #[error("transaction conflict")]
    TransactionConflict,

    /// A caller-observed deadline or cancellation token fired; no write occurred
    /// after it was observed.
    #[error("operation cancelled")]
    Cancelled,

    /// Any other KV fault, propagated verbatim.
    #[error("kv error: {0}")]
    Kv(#[source] KvError),
}

impl From<KvError> for StoreError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::Conflict => StoreError::TransactionConflict,
            other => StoreError::Kv(other),
        }
    }
}

impl StoreError {
    pub fn is_retryable(&self) -> bool { matches!(self, StoreError::TransactionConflict) }
}
