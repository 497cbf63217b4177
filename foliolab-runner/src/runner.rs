//! Engine facade — config-driven entry points over the pure core.
//!
//! `Engine` holds the loaded configuration and a plan cache. Everything else
//! (positions, targets, stores) is passed in by the caller.

use chrono::{DateTime, NaiveDate, Utc};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use foliolab_core::deviation::{self, DeviationAnalysis};
use foliolab_core::domain::{Operation, PositionSet, TargetAllocation};
use foliolab_core::fingerprint::InputHash;
use foliolab_core::metrics::PortfolioMetrics;
use foliolab_core::patterns::{self, PatternAnalysis};
use foliolab_core::plan::{build_plan_at, RebalancingPlan};
use foliolab_core::scenario::{self, PortfolioSnapshot, ScenarioChange, ScenarioResult};
use foliolab_core::EngineError;

use crate::cache::{CacheStats, PlanCache};
use crate::config::{ConfigError, EngineConfig};
use crate::input::LoadError;
use crate::store::{SnapshotRecord, SnapshotStore};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("input error: {0}")]
    Load(#[from] LoadError),
    #[error("{0}")]
    Engine(#[from] EngineError),
}

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    cache: PlanCache,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let cache = PlanCache::new(config.cache.capacity);
        Self { config, cache }
    }

    /// Load the config from `path`, or use defaults when no path is given.
    pub fn from_config_file(path: Option<&Path>) -> Result<Self, RunError> {
        let config = match path {
            Some(path) => {
                info!(path = %path.display(), "loading engine config");
                EngineConfig::from_file(path)?
            }
            None => EngineConfig::default(),
        };
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self, positions: &PositionSet) -> PortfolioMetrics {
        PortfolioMetrics::compute(positions)
    }

    pub fn scenario(
        &self,
        positions: &PositionSet,
        changes: &[ScenarioChange],
        cash: f64,
    ) -> ScenarioResult {
        debug!(
            key = %InputHash::scenario_key(positions, changes, cash).short(),
            changes = changes.len(),
            "applying scenario"
        );
        scenario::apply(positions, changes, cash)
    }

    pub fn deviations(
        &self,
        positions: &PositionSet,
        target: &TargetAllocation,
    ) -> Result<DeviationAnalysis, RunError> {
        Ok(deviation::analyze(positions, target).map_err(EngineError::from)?)
    }

    /// Build a plan valued as of now. See [`Engine::rebalance_at`].
    pub fn rebalance(
        &mut self,
        positions: &PositionSet,
        target: &TargetAllocation,
    ) -> Result<RebalancingPlan, RunError> {
        self.rebalance_at(positions, target, Utc::now())
    }

    /// Build a plan valued at `now`, or return the memoized one for identical
    /// inputs on the same date.
    ///
    /// A memoized plan keeps its original `created_at` and status.
    pub fn rebalance_at(
        &mut self,
        positions: &PositionSet,
        target: &TargetAllocation,
        now: DateTime<Utc>,
    ) -> Result<RebalancingPlan, RunError> {
        let key = self.rebalance_key(positions, target, now.date_naive())?;
        if let Some(plan) = self.cache.get(&key) {
            debug!(plan = %key.short(), "plan cache hit");
            return Ok(plan.clone());
        }
        let plan = build_plan_at(positions, target, &self.config.plan_settings(), now)?;
        self.cache.put(plan.clone());
        Ok(plan)
    }

    /// The id a plan for these inputs would get on `as_of`.
    pub fn rebalance_key(
        &self,
        positions: &PositionSet,
        target: &TargetAllocation,
        as_of: NaiveDate,
    ) -> Result<InputHash, RunError> {
        let target = target.normalized().map_err(EngineError::from)?;
        Ok(InputHash::rebalance_key(
            positions,
            &target,
            &self.config.plan_settings(),
            as_of,
        ))
    }

    pub fn patterns(&self, operations: &[Operation]) -> PatternAnalysis {
        patterns::analyze(operations, &self.config.patterns)
    }

    /// Capture a snapshot of `positions` and push it into `store` under `key`.
    /// Returns how many older snapshots were evicted.
    pub fn record_snapshot(
        &self,
        store: &mut dyn SnapshotStore,
        key: &str,
        positions: &PositionSet,
        cash: f64,
        now: DateTime<Utc>,
    ) -> usize {
        store.push(
            key,
            SnapshotRecord {
                taken_at: now,
                snapshot: PortfolioSnapshot::capture(positions, cash),
            },
        )
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
