//! # Graph Compiler and Cache
//!
//! Turns an [`ExecutionPlan`] into an executable DAG of stage nodes, with
//! edges drawn from the static dependency table restricted to the plan's
//! stage list and rooted at the plan's entry point.
//!
//! Compiled graphs are cached by plan shape. Two concurrent requests missing
//! on the same key race through the DashMap entry API: exactly one insert
//! wins and both callers receive the same `Arc`. When caching is disabled
//! (privacy-sensitive suppress-history mode) every call recompiles;
//! correctness over throughput in that mode.

use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};
use crate::orchestration::planner::{CompileStrategy, ExecutionPlan, Pattern};
use crate::stages::StageId;
use crate::state::dependencies;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Cache key: any element changing must produce a distinct executable.
/// The ordered stage list is part of the key so forced or narrowed plans
/// sharing a pattern never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphCacheKey {
    pub pattern: Pattern,
    pub compile_strategy: CompileStrategy,
    pub entry_point: StageId,
    pub stages: Vec<StageId>,
    pub checkpoint_enabled: bool,
    pub cache_enabled: bool,
}

impl GraphCacheKey {
    pub fn from_plan(plan: &ExecutionPlan, checkpoint_enabled: bool, cache_enabled: bool) -> Self {
        Self {
            pattern: plan.pattern,
            compile_strategy: plan.compile_strategy,
            entry_point: plan.entry_point,
            stages: plan.stages.clone(),
            checkpoint_enabled,
            cache_enabled,
        }
    }
}

/// One node of the compiled DAG with its in-graph dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub stage: StageId,
    /// Dependencies restricted to stages actually present in the graph
    pub dependencies: Vec<StageId>,
}

/// Compiled, immutable executable graph.
#[derive(Debug)]
pub struct ExecutableGraph {
    pub key: GraphCacheKey,
    /// Node set; under superset compilation this is the full capability set
    pub nodes: Vec<GraphNode>,
    /// Topological levels over the plan's own stages; stages within one
    /// level may run concurrently. Only these stages execute.
    pub levels: Vec<Vec<StageId>>,
    pub checkpoint_enabled: bool,
    pub compiled_at: DateTime<Utc>,
}

impl ExecutableGraph {
    /// Stages scheduled for execution, in walk order.
    pub fn stages(&self) -> Vec<StageId> {
        self.levels.iter().flatten().copied().collect()
    }
}

/// Cache hit/miss counters, observable for tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Compiler with an instance-owned cache (never a process-wide singleton).
#[derive(Debug, Default)]
pub struct GraphCompiler {
    cache: DashMap<GraphCacheKey, Arc<ExecutableGraph>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl GraphCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile the plan, or fetch the previously compiled executable when the
    /// cache holds an identical key.
    pub fn compile(
        &self,
        plan: &ExecutionPlan,
        checkpoint_enabled: bool,
        cache_enabled: bool,
    ) -> OrchestrationResult<Arc<ExecutableGraph>> {
        let key = GraphCacheKey::from_plan(plan, checkpoint_enabled, cache_enabled);

        if !cache_enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(routing_key = %plan.routing_key, "Graph cache bypassed - recompiling");
            return Ok(Arc::new(self.build(plan, key)?));
        }

        if let Some(cached) = self.cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(routing_key = %plan.routing_key, "Graph cache hit");
            return Ok(cached.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let graph = Arc::new(self.build(plan, key.clone())?);

        // Entry API: if a concurrent request compiled the same key first,
        // its graph wins and ours is discarded.
        let entry = self.cache.entry(key).or_insert(graph);
        Ok(entry.clone())
    }

    /// Drop every cached executable.
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.len(),
        }
    }

    fn build(
        &self,
        plan: &ExecutionPlan,
        key: GraphCacheKey,
    ) -> OrchestrationResult<ExecutableGraph> {
        if plan.stages.is_empty() {
            return Err(OrchestrationError::GraphCompilationFailed(
                "plan contains no stages".to_string(),
            ));
        }
        if !plan.stages.contains(&plan.entry_point) {
            return Err(OrchestrationError::GraphCompilationFailed(format!(
                "entry point '{}' is not in the plan's stage list",
                plan.entry_point
            )));
        }

        // Superset compilation widens the node set to the full capability
        // set; the plan's own stages always remain, in plan order, ahead of
        // the extras. Scheduling never widens: the levels walked at runtime
        // come from the plan's stage list alone.
        let mut capability: Vec<StageId> = plan.stages.clone();
        if plan.compile_strategy == CompileStrategy::Superset {
            for stage in StageId::ALL {
                if !capability.contains(&stage) {
                    capability.insert(capability.len() - 1, stage);
                }
            }
        }

        let nodes: Vec<GraphNode> = capability
            .iter()
            .map(|stage| GraphNode {
                stage: *stage,
                dependencies: dependencies::dependencies(*stage)
                    .iter()
                    .copied()
                    .filter(|dep| capability.contains(dep))
                    .collect(),
            })
            .collect();

        let levels = dependencies::parallel_groups(&plan.stages);
        let ordered: usize = levels.iter().map(|l| l.len()).sum();
        if ordered != plan.stages.len() {
            return Err(OrchestrationError::GraphCompilationFailed(format!(
                "could not order {} of {} stages",
                plan.stages.len() - ordered,
                plan.stages.len()
            )));
        }
        if levels.first().map(|l| l.contains(&plan.entry_point)) != Some(true)
            && !plan.entry_point.is_terminal()
        {
            return Err(OrchestrationError::GraphCompilationFailed(format!(
                "entry point '{}' is not a graph root",
                plan.entry_point
            )));
        }

        info!(
            pattern = %plan.pattern,
            compile_strategy = %plan.compile_strategy,
            entry_point = %plan.entry_point,
            node_count = nodes.len(),
            level_count = levels.len(),
            "🗺️ Compiled execution graph"
        );

        Ok(ExecutableGraph {
            checkpoint_enabled: key.checkpoint_enabled,
            key,
            nodes,
            levels,
            compiled_at: Utc::now(),
        })
    }
}
