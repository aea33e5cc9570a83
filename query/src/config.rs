//! Tunables for the four pure stages of the query layer (§4.7-§4.10), each with the
//! default named in §4.7-§4.11, or, where none is named, a conservative round
//! number chosen the way `strata-stats`'s `StatsConfig` picks its own defaults.

/// §4.7: the rewriter's fixpoint loop and its bounded-DNF cutoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewriterConfig {
    /// Upper bound on fixpoint iterations, guarding against a rewrite rule cycling on
    /// a predicate shape none of the rules actually converge on.
    pub max_depth: usize,
    /// Distribute And-over-Or into DNF only when the resulting term count is at most
    /// this; otherwise the predicate is left in (flattened, deduplicated) CNF.
    pub max_dnf_terms: usize,
}

impl Default for RewriterConfig {
    fn default() -> Self { Self { max_depth: 32, max_dnf_terms: 100 } }
}

/// §4.9: how many candidate plans the enumerator keeps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnumeratorConfig {
    pub max_candidate_plans: usize,
}

impl Default for EnumeratorConfig {
    fn default() -> Self { Self { max_candidate_plans: 10 } }
}

/// §4.10: plan cache capacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanCacheConfig {
    pub capacity: usize,
}

impl Default for PlanCacheConfig {
    fn default() -> Self { Self { capacity: 1000 } }
}

/// §4.8: the weights `total = io + weight * cpu` is built from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostConfig {
    pub io_read_cost: f64,
    pub cpu_deserialize_cost: f64,
    pub cpu_filter_cost: f64,
    pub cpu_weight: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self { io_read_cost: 1.0, cpu_deserialize_cost: 0.1, cpu_filter_cost: 0.05, cpu_weight: 0.1 }
    }
}

/// The full set of query-layer tunables, bundled so `QueryPlanner::new` takes one
/// argument rather than four.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QueryConfig {
    pub rewriter: RewriterConfig,
    pub enumerator: EnumeratorConfig,
    pub cache: PlanCacheConfig,
    pub cost: CostConfig,
}
