//! C15: the query planner, the single entry point §4.1 names as `execute_query`
//! delegating "to the Query Planner". Orchestrates the other four query-layer
//! pieces in the order §4.11 fixes: cache lookup, rewrite, enumerate over the
//! readable indexes, cost every candidate, keep the cheapest. No precedent in the
//! ambient codebase, which never wired a rewriter, enumerator, cost estimator, and
//! cache into one pipeline; built directly against §4.11's four steps.

use crate::cache::{stable_key, CachedPlan, PlanCache};
use crate::config::QueryConfig;
use crate::cost::estimate_cost;
use crate::enumerator::enumerate;
use crate::executor::QueryCursor;
use crate::rewriter::rewrite;
use std::sync::Arc;
use strata_core::{Codec, RecordStore, Schema, StoreError};
use strata_index::IndexStateManager;
use strata_keyspace::Keyspace;
use strata_ql::Predicate;
use strata_stats::StatisticsManager;
use strata_storage_kv::KvTransaction;
use tokio::sync::Mutex;

/// Binds a schema and keyspace to one tunable config and one plan cache, the same
/// "bound once at construction, never swapped" shape `RecordStore` itself uses.
pub struct QueryPlanner {
    schema: Arc<Schema>,
    keyspace: Keyspace,
    config: QueryConfig,
    cache: Mutex<PlanCache>,
}

impl QueryPlanner {
    pub fn new(schema: Arc<Schema>, keyspace: Keyspace, config: QueryConfig) -> Self {
        Self { schema, keyspace, config, cache: Mutex::new(PlanCache::new(config.cache)) }
    }

    /// Produces the cheapest plan for `filter` over `record_type`, serving a cached
    /// choice when the canonical `(record_type, filter, limit)` key has already been
    /// planned (§4.10), and otherwise running the full rewrite/enumerate/cost
    /// pipeline and caching the result (§4.11).
    pub async fn plan(
        &self,
        txn: &mut dyn KvTransaction,
        stats: &StatisticsManager,
        record_type: &str,
        filter: &Predicate,
        limit: Option<u64>,
    ) -> Result<CachedPlan, StoreError> {
        let rewritten = rewrite(filter, &self.config.rewriter);
        let key = stable_key(record_type, &rewritten, limit);
        if let Some(hit) = self.cache.lock().await.get(&key) {
            return Ok(hit);
        }

        let readable_names = IndexStateManager::readable_indexes(txn, &self.keyspace, &self.schema, record_type).await?;
        let indexes: Vec<&strata_core::Index> = readable_names.iter().filter_map(|name| self.schema.index(name)).collect();

        let snapshot = stats.snapshot().await;
        let table_rows = stats.table_stats(record_type).await.map(|t| t.row_count).unwrap_or(0);

        let candidates = enumerate(&rewritten, record_type, &indexes, &self.keyspace, &snapshot, limit, &self.config.enumerator);

        let chosen = candidates
            .into_iter()
            .map(|plan| {
                let cost = estimate_cost(&plan, table_rows, &snapshot, &self.config.cost);
                CachedPlan { plan, cost }
            })
            // §4.11 step 4: minimum total cost, ties broken by fewer estimated rows,
            // then by lower I/O — never by enumeration order, which carries no
            // planning significance of its own.
            .min_by(|a, b| {
                a.cost
                    .total(&self.config.cost)
                    .partial_cmp(&b.cost.total(&self.config.cost))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.cost.estimated_rows.partial_cmp(&b.cost.estimated_rows).unwrap_or(std::cmp::Ordering::Equal))
                    .then_with(|| a.cost.io.partial_cmp(&b.cost.io).unwrap_or(std::cmp::Ordering::Equal))
            })
            .ok_or_else(|| StoreError::InvalidArgument(format!("no candidate plan produced for record type '{record_type}'")))?;

        self.cache.lock().await.put(key, chosen.clone());
        Ok(chosen)
    }

    /// Plans, then immediately opens an executing cursor over the chosen plan — the
    /// `execute_query` entry point itself.
    pub async fn execute_query<'a, C: Codec>(
        &self,
        txn: &mut dyn KvTransaction,
        stats: &StatisticsManager,
        store: &'a RecordStore<C>,
        record_type: &str,
        filter: &Predicate,
        limit: Option<u64>,
    ) -> Result<QueryCursor<'a, C>, StoreError> {
        let cached = self.plan(txn, stats, record_type, filter, limit).await?;
        QueryCursor::open(store, txn, &cached.plan).await
    }
}
