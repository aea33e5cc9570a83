//! The record layer's core: the Codec boundary (C2), Schema (C3), transaction scope
//! (C4), and the typed Record Store (C5). Everything here is storage-engine-agnostic
//! over `strata-storage-kv`'s `KvStore`/`KvTransaction` traits and carries no
//! knowledge of index maintenance beyond the `IndexSink` seam `strata-index`
//! implements.

pub mod codec;
pub mod error;
pub mod schema;
pub mod store;
pub mod txn;

pub use codec::Codec;
pub use error::StoreError;
pub use schema::{Index, IndexKind, KeyExpression, RecordType, Schema};
pub use store::{IndexSink, NoIndexes, RecordCursor, RecordStore};
pub use txn::{with_retry, Cancellation};
