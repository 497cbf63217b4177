use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{PositionSet, TargetAllocation};
use crate::scenario::ScenarioChange;

/// Deterministic content hash of engine inputs (BLAKE3 over canonical JSON).
///
/// Identical inputs give identical hashes across runs and platforms, so the
/// hash doubles as plan id and cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputHash(pub String);

impl InputHash {
    pub fn from_hash(hash: &str) -> Self {
        Self(hash.to_string())
    }

    /// Hash an arbitrary serializable value.
    pub fn of<T: Serialize + ?Sized>(kind: &str, value: &T) -> Self {
        // serde_json::Value objects are BTreeMap-backed, so keys come out sorted.
        let canonical = serde_json::json!({
            "kind": kind,
            "input": serde_json::to_value(value).expect("engine inputs must serialize"),
        });
        Self(blake3::hash(canonical.to_string().as_bytes()).to_hex().to_string())
    }

    /// Key of a rebalancing request. `as_of` is part of the key because
    /// holding terms, and so tax figures, depend on the valuation date.
    pub fn rebalance_key<S: Serialize>(
        positions: &PositionSet,
        target: &TargetAllocation,
        settings: &S,
        as_of: NaiveDate,
    ) -> Self {
        Self::of(
            "rebalance",
            &serde_json::json!({
                "positions": positions,
                "target": target,
                "settings": settings,
                "as_of": as_of,
            }),
        )
    }

    pub fn scenario_key(positions: &PositionSet, changes: &[ScenarioChange], cash: f64) -> Self {
        Self::of(
            "scenario",
            &serde_json::json!({
                "positions": positions,
                "changes": changes,
                "cash": cash,
            }),
        )
    }

    /// First 12 hex characters, for display.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for InputHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
