//! Table and index statistics (C10): sampled row counts, per-index histograms, and
//! the selectivity estimation they feed into the query layer's cost estimator.
//! Everything here is pure arithmetic over already-collected samples except
//! `table_stats`/`index_stats`, which scan the KV directly, and `manager`, which
//! persists and caches the results.

pub mod config;
pub mod histogram;
pub mod index_stats;
pub mod manager;
pub mod sampling;
pub mod selectivity;
pub mod table_stats;

pub use config::StatsConfig;
pub use histogram::{Bucket, Histogram};
pub use index_stats::IndexStats;
pub use manager::{StatisticsManager, StatsSnapshot};
pub use selectivity::{selectivity, StatsSource};
pub use table_stats::TableStats;
