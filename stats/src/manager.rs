//! Persists `TableStats`/`IndexStats` into the `stats` subspace and caches them
//! in memory under a single-writer-discipline lock (§5: "mutable shared state ...
//! guarded by a single owner, never ad hoc locking at each call site"), so readers
//! (the selectivity API, and later the cost estimator) always see a fully-formed
//! snapshot rather than a refresh half-applied.

use crate::config::StatsConfig;
use crate::index_stats::IndexStats;
use crate::selectivity::StatsSource;
use crate::table_stats::TableStats;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strata_core::{Schema, StoreError};
use strata_keyspace::{Keyspace, Tuple, TypedValue};
use strata_storage_kv::KvTransaction;
use tokio::sync::RwLock;
use tracing::debug;

const TABLE_SCOPE: &str = "table";
const INDEX_SCOPE: &str = "index";

/// A point-in-time read view over cached statistics, cheap to clone since refreshes
/// are infrequent relative to reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    tables: HashMap<String, TableStats>,
    /// Keyed by `"{record_type}:{field}"` — the granularity the selectivity API
    /// queries at, not by index name, since a filter names a field, not an index.
    indexes: HashMap<String, IndexStats>,
}

impl StatsSnapshot {
    fn index_key(record_type: &str, field: &str) -> String {
        format!("{record_type}:{field}")
    }

    pub fn table(&self, record_type: &str) -> Option<&TableStats> {
        self.tables.get(record_type)
    }
}

impl StatsSource for StatsSnapshot {
    fn index_stats(&self, record_type: &str, field: &str) -> Option<&IndexStats> {
        self.indexes.get(&Self::index_key(record_type, field))
    }
}

pub struct StatisticsManager {
    keyspace: Keyspace,
    config: StatsConfig,
    cache: RwLock<StatsSnapshot>,
}

impl StatisticsManager {
    pub fn new(keyspace: Keyspace) -> Self { Self::with_config(keyspace, StatsConfig::default()) }

    pub fn with_config(keyspace: Keyspace, config: StatsConfig) -> Self {
        Self { keyspace, config, cache: RwLock::new(StatsSnapshot::default()) }
    }

    /// Collects fresh `TableStats` for `record_type`, persists them, and updates the
    /// cache. The caller commits `txn`; a failed commit leaves the cache ahead of the
    /// durable copy until the next successful refresh, same as any other read-cache.
    /// `sample_rate` falls back to `StatsConfig::default_sample_rate` when `None`.
    pub async fn refresh_table(
        &self,
        txn: &mut dyn KvTransaction,
        record_type: &str,
        sample_rate: Option<f64>,
        batch_size: usize,
        now_ms: i64,
    ) -> Result<TableStats, StoreError> {
        let sample_rate = sample_rate.unwrap_or(self.config.default_sample_rate);
        let stats = TableStats::collect(txn, &self.keyspace, record_type, sample_rate, batch_size, now_ms).await?;
        self.persist(txn, TABLE_SCOPE, record_type, &stats).await?;
        self.cache.write().await.tables.insert(record_type.to_string(), stats.clone());
        debug!(record_type, row_count = stats.row_count, "refreshed table statistics");
        Ok(stats)
    }

    /// Collects fresh `IndexStats` for `index_name`, persists them, and updates the
    /// cache under the `(record_type, leading_field)` key the selectivity API reads
    /// by. `schema` resolves the index's record type and leading key-expression
    /// field. `bucket_count` falls back to `StatsConfig::default_bucket_count` when
    /// `None`.
    pub async fn refresh_index(
        &self,
        txn: &mut dyn KvTransaction,
        schema: &Schema,
        index_name: &str,
        bucket_count: Option<usize>,
        batch_size: usize,
        now_ms: i64,
    ) -> Result<IndexStats, StoreError> {
        let bucket_count = bucket_count.unwrap_or(self.config.default_bucket_count);
        let index = schema
            .index(index_name)
            .ok_or_else(|| StoreError::InvalidArgument(format!("unknown index '{index_name}'")))?;
        let field = index
            .key_expr
            .leading_field()
            .ok_or_else(|| StoreError::InvalidArgument(format!("index '{index_name}' has no leading field")))?
            .to_string();

        let stats = IndexStats::collect(txn, &self.keyspace, index_name, bucket_count, batch_size, now_ms).await?;
        self.persist(txn, INDEX_SCOPE, index_name, &stats).await?;
        self.cache.write().await.indexes.insert(StatsSnapshot::index_key(&index.record_type, &field), stats.clone());
        debug!(index_name, distinct_count = stats.distinct_count, "refreshed index statistics");
        Ok(stats)
    }

    async fn persist<T: Serialize>(
        &self,
        txn: &mut dyn KvTransaction,
        scope: &str,
        name: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let key = self
            .keyspace
            .stats
            .pack(&Tuple::new(vec![TypedValue::String(scope.to_string()), TypedValue::String(name.to_string())]));
        let bytes = bincode::serialize(value).map_err(|e| StoreError::SerializationError(e.to_string()))?;
        txn.set(&key, &bytes).await?;
        Ok(())
    }

    /// Reloads a table's persisted statistics into the cache — used at process start,
    /// before any refresh has run in this process, so the planner doesn't fall back to
    /// defaults it needn't have (§3.4: stale statistics remain usable).
    pub async fn load_table(&self, txn: &mut dyn KvTransaction, record_type: &str) -> Result<Option<TableStats>, StoreError> {
        let key = self
            .keyspace
            .stats
            .pack(&Tuple::new(vec![TypedValue::String(TABLE_SCOPE.to_string()), TypedValue::String(record_type.to_string())]));
        let Some(bytes) = txn.get(&key).await? else { return Ok(None) };
        let stats: TableStats = bincode::deserialize(&bytes).map_err(|e| StoreError::SerializationError(e.to_string()))?;
        self.cache.write().await.tables.insert(record_type.to_string(), stats.clone());
        Ok(Some(stats))
    }

    pub async fn load_index(&self, txn: &mut dyn KvTransaction, schema: &Schema, index_name: &str) -> Result<Option<IndexStats>, StoreError> {
        let index = schema
            .index(index_name)
            .ok_or_else(|| StoreError::InvalidArgument(format!("unknown index '{index_name}'")))?;
        let field = index
            .key_expr
            .leading_field()
            .ok_or_else(|| StoreError::InvalidArgument(format!("index '{index_name}' has no leading field")))?
            .to_string();
        let key = self
            .keyspace
            .stats
            .pack(&Tuple::new(vec![TypedValue::String(INDEX_SCOPE.to_string()), TypedValue::String(index_name.to_string())]));
        let Some(bytes) = txn.get(&key).await? else { return Ok(None) };
        let stats: IndexStats = bincode::deserialize(&bytes).map_err(|e| StoreError::SerializationError(e.to_string()))?;
        self.cache.write().await.indexes.insert(StatsSnapshot::index_key(&index.record_type, &field), stats.clone());
        Ok(Some(stats))
    }

    pub async fn table_stats(&self, record_type: &str) -> Option<TableStats> {
        self.cache.read().await.table(record_type).cloned()
    }

    /// A cloned read view suitable for `selectivity()`'s `&dyn StatsSource`, so the
    /// whole cost-estimation pass runs without holding the cache lock.
    pub async fn snapshot(&self) -> StatsSnapshot {
        self.cache.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{Index, IndexKind, KeyExpression, RecordType};
    use strata_storage_kv::{KvStore, MemoryStore};

    fn schema_with_city_index() -> Schema {
        let rt = RecordType { name: "User".into(), primary_key: KeyExpression::field("id") };
        let idx = Index {
            name: "by_city".into(),
            record_type: "User".into(),
            kind: IndexKind::Value,
            key_expr: KeyExpression::field("city"),
            unique: false,
            grouping_expr: None,
            value_expr: None,
        };
        Schema::new(vec![rt], vec![idx]).unwrap()
    }

    #[tokio::test]
    async fn refresh_table_updates_cache_and_survives_a_reload() {
        let kv = MemoryStore::new();
        let ks = Keyspace::new(b"app");
        let manager = StatisticsManager::new(ks.clone());

        let mut txn = kv.begin().await.unwrap();
        let key = ks.record.pack(&Tuple::new(vec![TypedValue::String("User".into()), TypedValue::I64(1)]));
        txn.set(&key, b"payload").await.unwrap();
        manager.refresh_table(&mut *txn, "User", Some(1.0), 100, 10).await.unwrap();
        txn.commit().await.unwrap();

        assert_eq!(manager.table_stats("User").await.unwrap().row_count, 1);

        let fresh_manager = StatisticsManager::new(ks);
        let mut txn2 = kv.begin().await.unwrap();
        let reloaded = fresh_manager.load_table(&mut *txn2, "User").await.unwrap().unwrap();
        assert_eq!(reloaded.row_count, 1);
    }

    #[tokio::test]
    async fn refresh_table_falls_back_to_the_configured_default_sample_rate() {
        let kv = MemoryStore::new();
        let ks = Keyspace::new(b"app");
        let manager = StatisticsManager::with_config(ks.clone(), StatsConfig { default_sample_rate: 1.0, default_bucket_count: 5 });

        let mut txn = kv.begin().await.unwrap();
        let key = ks.record.pack(&Tuple::new(vec![TypedValue::String("User".into()), TypedValue::I64(1)]));
        txn.set(&key, b"payload").await.unwrap();
        let stats = manager.refresh_table(&mut *txn, "User", None, 100, 10).await.unwrap();
        assert_eq!(stats.sample_rate, 1.0);
    }

    #[tokio::test]
    async fn refresh_index_populates_the_selectivity_source_by_record_type_and_field() {
        let kv = MemoryStore::new();
        let ks = Keyspace::new(b"app");
        let schema = schema_with_city_index();
        let manager = StatisticsManager::new(ks.clone());

        let mut txn = kv.begin().await.unwrap();
        let key = ks.index.pack(&Tuple::new(vec![
            TypedValue::String("by_city".into()),
            TypedValue::String("SF".into()),
            TypedValue::I64(1),
        ]));
        txn.set(&key, &[]).await.unwrap();
        manager.refresh_index(&mut *txn, &schema, "by_city", Some(10), 100, 10).await.unwrap();
        txn.commit().await.unwrap();

        let snapshot = manager.snapshot().await;
        assert!(snapshot.index_stats("User", "city").is_some());
        assert!(snapshot.index_stats("User", "nonexistent_field").is_none());
    }
}
