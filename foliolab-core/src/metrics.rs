//! Portfolio metrics — pure functions over a position set.
//!
//! Conventions used everywhere in the engine:
//! - Weights are percentages (0–100). A zero-value portfolio has all weights 0.
//! - HHI is on the 0–1 scale. `hhi_points` converts to the 0–10 000 display
//!   scale and is meant for presentation only.
//! - The diversification score is `1 − hhi`: higher is better, 1.0 for an
//!   empty portfolio, 0.0 for a single holding.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::domain::{Dimension, PositionSet};

/// HHI at or above this is high concentration.
pub const HIGH_CONCENTRATION_HHI: f64 = 0.25;
/// HHI at or above this (and below high) is medium concentration.
pub const MEDIUM_CONCENTRATION_HHI: f64 = 0.15;

/// Concentration risk tier derived from HHI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcentrationRisk {
    Low,
    Medium,
    High,
}

impl fmt::Display for ConcentrationRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => f.write_str("low"),
            Self::Medium => f.write_str("medium"),
            Self::High => f.write_str("high"),
        }
    }
}

/// One group of positions along a dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureBucket {
    pub label: String,
    pub value: f64,
    /// Percent of total value; 0 when the total is 0.
    pub weight: f64,
    pub count: usize,
}

/// The single largest holding by weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LargestPosition {
    pub instrument_id: String,
    pub weight: f64,
}

/// Aggregate metrics for a position set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub total_value: f64,
    pub position_count: usize,
    pub hhi: f64,
    pub concentration_risk: ConcentrationRisk,
    pub diversification_score: f64,
    pub largest_position: Option<LargestPosition>,
    pub exposures: BTreeMap<Dimension, Vec<ExposureBucket>>,
    /// Sum of unrealized P&L over positions with a known cost basis.
    pub unrealized_pnl: f64,
    pub unknown_cost_basis: usize,
}

impl PortfolioMetrics {
    pub fn compute(positions: &PositionSet) -> Self {
        let weights = position_weights(positions);
        let pct: Vec<f64> = weights.iter().map(|(_, w)| *w).collect();
        let h = hhi(&pct);

        let largest_position = weights
            .iter()
            .fold(None::<&(String, f64)>, |best, entry| match best {
                Some(b) if b.1 > entry.1 || (b.1 == entry.1 && b.0 <= entry.0) => Some(b),
                _ => Some(entry),
            })
            .map(|(id, w)| LargestPosition {
                instrument_id: id.clone(),
                weight: *w,
            });

        let exposures = Dimension::EXPOSURES
            .iter()
            .map(|d| (*d, exposure_by_dimension(positions, *d)))
            .collect();

        Self {
            total_value: positions.total_value(),
            position_count: positions.len(),
            hhi: h,
            concentration_risk: concentration_risk(h),
            diversification_score: diversification_score(h),
            largest_position,
            exposures,
            unrealized_pnl: positions.iter().filter_map(|p| p.unrealized_pnl()).sum(),
            unknown_cost_basis: positions.iter().filter(|p| !p.has_cost_basis()).count(),
        }
    }

    /// Exposure breakdown for one dimension (empty for `Instrument`).
    pub fn exposure(&self, dimension: Dimension) -> &[ExposureBucket] {
        self.exposures
            .get(&dimension)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Weight as a percentage of `total`, 0 when `total` is not positive.
pub fn weight_pct(value: f64, total: f64) -> f64 {
    if total > 0.0 {
        value / total * 100.0
    } else {
        0.0
    }
}

/// Per-position weights in insertion order.
pub fn position_weights(positions: &PositionSet) -> Vec<(String, f64)> {
    let total = positions.total_value();
    positions
        .iter()
        .map(|p| (p.instrument_id.clone(), weight_pct(p.value(), total)))
        .collect()
}

/// Group positions by `dimension`.
///
/// Sorted by weight descending; equal weights fall back to label order so the
/// output is identical across runs.
pub fn exposure_by_dimension(positions: &PositionSet, dimension: Dimension) -> Vec<ExposureBucket> {
    let total = positions.total_value();
    let mut groups: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for p in positions {
        let entry = groups.entry(dimension.label_of(p)).or_insert((0.0, 0));
        entry.0 += p.value();
        entry.1 += 1;
    }

    let mut buckets: Vec<ExposureBucket> = groups
        .into_iter()
        .map(|(label, (value, count))| ExposureBucket {
            label: label.to_string(),
            value,
            weight: weight_pct(value, total),
            count,
        })
        .collect();
    buckets.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then_with(|| a.label.cmp(&b.label))
    });
    buckets
}

/// Bucket label → weight, for lookups.
pub fn weight_map(buckets: &[ExposureBucket]) -> HashMap<&str, f64> {
    buckets.iter().map(|b| (b.label.as_str(), b.weight)).collect()
}

/// Herfindahl-Hirschman index from percentage weights, on the 0–1 scale.
///
/// `hhi(&[])` is 0: an empty portfolio counts as fully diversified.
pub fn hhi(weights: &[f64]) -> f64 {
    let sum: f64 = weights
        .iter()
        .map(|w| {
            let f = w / 100.0;
            f * f
        })
        .sum();
    sum.clamp(0.0, 1.0)
}

/// HHI on the 0–10 000 display scale.
pub fn hhi_points(hhi: f64) -> f64 {
    hhi * 10_000.0
}

/// Risk tier: ≥ 0.25 high, ≥ 0.15 medium, otherwise low.
pub fn concentration_risk(hhi: f64) -> ConcentrationRisk {
    if hhi >= HIGH_CONCENTRATION_HHI {
        ConcentrationRisk::High
    } else if hhi >= MEDIUM_CONCENTRATION_HHI {
        ConcentrationRisk::Medium
    } else {
        ConcentrationRisk::Low
    }
}

/// `1 − hhi`, clamped to [0, 1].
pub fn diversification_score(hhi: f64) -> f64 {
    (1.0 - hhi).clamp(0.0, 1.0)
}

/// Effective number of equally-weighted holdings (`1 / hhi`), 0 for an empty set.
pub fn effective_holdings(hhi: f64) -> f64 {
    if hhi > 0.0 {
        1.0 / hhi
    } else {
        0.0
    }
}
