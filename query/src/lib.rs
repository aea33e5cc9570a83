//! Query rewriting (C11), cost estimation (C12), plan enumeration (C13), plan
//! caching (C14), the query planner (C15), and the executor that runs a chosen
//! plan against an open transaction. Depends on `strata-core`, `strata-index`, and
//! `strata-stats` only in the forward direction, same as `strata-index` depends on
//! `strata-core` — none of those crates depend back on this one.

pub mod cache;
pub mod config;
pub mod cost;
pub mod enumerator;
pub mod executor;
pub mod plan;
pub mod planner;
pub mod rewriter;
mod util;

pub use cache::{stable_key, CachedPlan, PlanCache};
pub use config::{CostConfig, EnumeratorConfig, PlanCacheConfig, QueryConfig, RewriterConfig};
pub use cost::{estimate_cost, Cost};
pub use enumerator::enumerate;
pub use executor::{matches, QueryCursor};
pub use plan::{range_for, Plan, Range};
pub use planner::QueryPlanner;
pub use rewriter::rewrite;
