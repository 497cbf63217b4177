//! Plan memoization keyed by input fingerprint.
//!
//! Plans are deterministic in their inputs (valuation date included), so two
//! requests with the same `InputHash` can share one plan. The cache is
//! bounded; when full, the least recently used plan is evicted.

use lru::LruCache;
use std::num::NonZeroUsize;

use foliolab_core::fingerprint::InputHash;
use foliolab_core::plan::RebalancingPlan;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug)]
pub struct PlanCache {
    /// `None` when caching is disabled.
    plans: Option<LruCache<InputHash, RebalancingPlan>>,
    hits: u64,
    misses: u64,
}

impl PlanCache {
    /// A capacity of 0 disables caching: nothing is stored.
    pub fn new(capacity: usize) -> Self {
        Self {
            plans: NonZeroUsize::new(capacity).map(LruCache::new),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a plan, counting the hit or miss.
    pub fn get(&mut self, key: &InputHash) -> Option<&RebalancingPlan> {
        match self.plans.as_mut().and_then(|plans| plans.get(key)) {
            Some(plan) => {
                self.hits += 1;
                Some(plan)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn contains(&self, key: &InputHash) -> bool {
        self.plans.as_ref().is_some_and(|plans| plans.contains(key))
    }

    /// Store a plan under its own id.
    pub fn put(&mut self, plan: RebalancingPlan) {
        if let Some(plans) = self.plans.as_mut() {
            plans.put(plan.id().clone(), plan);
        }
    }

    pub fn remove(&mut self, key: &InputHash) -> Option<RebalancingPlan> {
        self.plans.as_mut().and_then(|plans| plans.pop(key))
    }

    pub fn clear(&mut self) {
        if let Some(plans) = self.plans.as_mut() {
            plans.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.plans.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use foliolab_core::domain::{Dimension, Position, PositionSet, TargetAllocation};
    use foliolab_core::plan::{build_plan_at, PlanSettings};

    fn plan(a_weight: f64) -> RebalancingPlan {
        let positions = PositionSet::from_positions(vec![
            Position::new("A", 10.0, 100.0),
            Position::new("B", 5.0, 200.0),
        ])
        .unwrap();
        let target = TargetAllocation::from_pairs(
            Dimension::Instrument,
            [("A", a_weight), ("B", 100.0 - a_weight)],
        );
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        build_plan_at(&positions, &target, &PlanSettings::default(), now).unwrap()
    }

    #[test]
    fn hit_and_miss_counted() {
        let mut cache = PlanCache::new(4);
        let p = plan(30.0);
        let key = p.id().clone();
        assert!(cache.get(&key).is_none());
        cache.put(p);
        assert!(cache.get(&key).is_some());
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn least_recent_evicted_at_capacity() {
        let mut cache = PlanCache::new(2);
        let (p1, p2, p3) = (plan(30.0), plan(40.0), plan(60.0));
        let k1 = p1.id().clone();
        let k3 = p3.id().clone();
        cache.put(p1);
        cache.put(p2);
        cache.put(p3);
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&k1));
        assert!(cache.contains(&k3));
    }

    #[test]
    fn lookup_refreshes_recency() {
        let mut cache = PlanCache::new(2);
        let (p1, p2, p3) = (plan(30.0), plan(40.0), plan(60.0));
        let (k1, k2) = (p1.id().clone(), p2.id().clone());
        cache.put(p1);
        cache.put(p2);
        assert!(cache.get(&k1).is_some());
        cache.put(p3);
        assert!(cache.contains(&k1));
        assert!(!cache.contains(&k2));
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut cache = PlanCache::new(0);
        let p = plan(30.0);
        let key = p.id().clone();
        cache.put(p);
        assert!(cache.is_empty());
        assert!(cache.get(&key).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn reinsert_does_not_duplicate() {
        let mut cache = PlanCache::new(2);
        cache.put(plan(30.0));
        cache.put(plan(30.0));
        cache.put(plan(40.0));
        assert_eq!(cache.len(), 2);
        let k = plan(30.0).id().clone();
        assert!(cache.remove(&k).is_some());
        assert_eq!(cache.len(), 1);
    }
}
