//! Index maintenance atop `strata-core`: the state lifecycle (C7), range-set
//! checkpointing (C8), the state-aware maintainer (C6), and the online indexer (C9).
//! Depends on `strata-core` only in the forward direction — it implements
//! `strata_core::IndexSink`, `strata-core` never depends back on this crate.

pub mod maintainer;
pub mod online;
pub mod range_set;
pub mod state;

pub use maintainer::IndexMaintainer;
pub use online::{IndexerConfig, Lease, OnlineIndexer};
pub use range_set::RangeSet;
pub use state::{IndexState, IndexStateManager};
