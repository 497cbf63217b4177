//! Deviation analyzer — current allocation vs. target allocation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::domain::{Dimension, PositionSet, TargetAllocation};
use crate::error::ConfigurationError;
use crate::metrics::{exposure_by_dimension, weight_map};

/// Allowed distance of the target sum from 100, in percentage points.
pub const TARGET_SUM_TOLERANCE: f64 = 0.5;

/// Whether a bucket sits above, below or inside its target band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationDirection {
    Over,
    Under,
    OnTarget,
}

/// Current vs. target for a single bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deviation {
    pub label: String,
    pub current_weight: f64,
    pub target_weight: f64,
    /// `current_weight − target_weight`, percentage points.
    pub delta: f64,
    pub direction: DeviationDirection,
    pub current_value: f64,
    /// Value that would have to move to close the gap; positive means excess.
    pub value_gap: f64,
}

/// Full comparison of a portfolio against a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationAnalysis {
    pub dimension: Dimension,
    pub total_value: f64,
    pub band: f64,
    /// Sorted by |delta| descending, then label.
    pub deviations: Vec<Deviation>,
    pub max_abs_deviation: f64,
    /// Σ|delta| / 2: the share of the portfolio that has to change hands.
    pub total_drift: f64,
    pub needs_rebalancing: bool,
}

impl DeviationAnalysis {
    pub fn get(&self, label: &str) -> Option<&Deviation> {
        self.deviations.iter().find(|d| d.label == label)
    }

    pub fn over_weight(&self) -> impl Iterator<Item = &Deviation> {
        self.deviations
            .iter()
            .filter(|d| d.direction == DeviationDirection::Over)
    }

    pub fn under_weight(&self) -> impl Iterator<Item = &Deviation> {
        self.deviations
            .iter()
            .filter(|d| d.direction == DeviationDirection::Under)
    }
}

/// Reject targets that are empty, contain invalid weights, or do not sum to
/// 100 ± [`TARGET_SUM_TOLERANCE`].
pub fn validate_target(target: &TargetAllocation) -> Result<(), ConfigurationError> {
    if target.weights.is_empty() {
        return Err(ConfigurationError::EmptyTarget);
    }
    for (label, weight) in &target.weights {
        if !weight.is_finite() || *weight < 0.0 {
            return Err(ConfigurationError::InvalidTargetWeight {
                label: label.clone(),
                weight: *weight,
            });
        }
    }
    if !target.band.is_finite() || target.band < 0.0 {
        return Err(ConfigurationError::InvalidOption {
            name: "band",
            reason: format!("must be a non-negative number, got {}", target.band),
        });
    }
    let sum = target.total();
    if (sum - 100.0).abs() > TARGET_SUM_TOLERANCE {
        return Err(ConfigurationError::TargetSum {
            sum,
            tolerance: TARGET_SUM_TOLERANCE,
        });
    }
    Ok(())
}

/// Compare current weights along `target.dimension` with the target.
///
/// Target labels are matched in canonical form (see
/// [`Dimension::normalize_label`](crate::domain::Dimension::normalize_label)),
/// so `"Technology"` targets the `technology` sector. Buckets are the union of
/// held and targeted labels: a targeted bucket with no holdings has current
/// weight 0, a held bucket missing from the target has target weight 0.
pub fn analyze(
    positions: &PositionSet,
    target: &TargetAllocation,
) -> Result<DeviationAnalysis, ConfigurationError> {
    validate_target(target)?;
    let target = &target.normalized()?;

    let total_value = positions.total_value();
    let buckets = exposure_by_dimension(positions, target.dimension);
    let weights = weight_map(&buckets);

    let labels: BTreeSet<&str> = buckets
        .iter()
        .map(|b| b.label.as_str())
        .chain(target.weights.keys().map(String::as_str))
        .collect();

    let mut deviations: Vec<Deviation> = labels
        .into_iter()
        .map(|label| {
            let current_weight = weights.get(label).copied().unwrap_or(0.0);
            let target_weight = target.weight_of(label);
            let delta = current_weight - target_weight;
            let direction = if delta.abs() <= target.band {
                DeviationDirection::OnTarget
            } else if delta > 0.0 {
                DeviationDirection::Over
            } else {
                DeviationDirection::Under
            };
            Deviation {
                label: label.to_string(),
                current_weight,
                target_weight,
                delta,
                direction,
                current_value: buckets
                    .iter()
                    .find(|b| b.label == label)
                    .map(|b| b.value)
                    .unwrap_or(0.0),
                value_gap: delta / 100.0 * total_value,
            }
        })
        .collect();

    deviations.sort_by(|a, b| {
        b.delta
            .abs()
            .total_cmp(&a.delta.abs())
            .then_with(|| a.label.cmp(&b.label))
    });

    let max_abs_deviation = deviations.first().map(|d| d.delta.abs()).unwrap_or(0.0);
    let total_drift = deviations.iter().map(|d| d.delta.abs()).sum::<f64>() / 2.0;
    let needs_rebalancing = deviations
        .iter()
        .any(|d| d.direction != DeviationDirection::OnTarget);

    debug!(
        dimension = %target.dimension,
        buckets = deviations.len(),
        max_abs_deviation,
        "deviation analysis complete"
    );

    Ok(DeviationAnalysis {
        dimension: target.dimension,
        total_value,
        band: target.band,
        deviations,
        max_abs_deviation,
        total_drift,
        needs_rebalancing,
    })
}
