//! Scenario applier — "what if" analysis over a position set.
//!
//! Changes are applied strictly in the order given; a later change sees the
//! effect of earlier ones on the same position. Nothing in the numeric path
//! reads the clock or iterates a hash map, so identical inputs produce
//! bit-identical numbers. Only `created_at` varies between calls.
//!
//! No change ever fails the whole scenario: impossible requests (unknown
//! instrument, quantity or price driven below zero) are clamped or skipped and
//! recorded as warnings on the change that caused them. Added positions go
//! through the same classification as loaded ones, and a record it rejects is
//! skipped with a warning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::classify::{classify, RawPosition};
use crate::domain::{Dimension, Position, PositionSet};
use crate::metrics::{exposure_by_dimension, weight_pct, ExposureBucket, PortfolioMetrics};

/// A market-wide shock expressed as price multipliers.
///
/// A position's price is multiplied by the product of every multiplier that
/// matches it: the market-wide one, its sector's, and its asset class's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub label: String,
    #[serde(default)]
    pub market_multiplier: Option<f64>,
    /// Sector label → multiplier (labels compared case-insensitively).
    #[serde(default)]
    pub sector_multipliers: BTreeMap<String, f64>,
    /// Instrument type (`stock`, `bond`, …) → multiplier.
    #[serde(default)]
    pub asset_multipliers: BTreeMap<String, f64>,
}

impl MarketEvent {
    fn multiplier_for(&self, position: &Position) -> f64 {
        let mut m = self.market_multiplier.unwrap_or(1.0);
        if let Some(s) = lookup(&self.sector_multipliers, &position.sector) {
            m *= s;
        }
        if let Some(a) = lookup(&self.asset_multipliers, position.instrument_type.as_str()) {
            m *= a;
        }
        m
    }
}

fn lookup(map: &BTreeMap<String, f64>, label: &str) -> Option<f64> {
    map.iter()
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(label))
        .map(|(_, v)| *v)
}

/// A hypothetical change to a position set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioChange {
    /// Multiply the unit price by `1 + pct / 100`.
    PriceChange { instrument_id: String, pct: f64 },
    /// Add (or, when negative, remove) units.
    QuantityChange { instrument_id: String, delta: f64 },
    /// Insert a broker-shaped position; an existing instrument has its
    /// quantity merged.
    AddPosition { position: RawPosition },
    MarketEvent(MarketEvent),
}

/// Metrics for one side of the comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub positions_value: f64,
    pub cash: f64,
    /// `positions_value + cash`.
    pub total_value: f64,
    pub metrics: PortfolioMetrics,
}

impl PortfolioSnapshot {
    pub fn capture(positions: &PositionSet, cash: f64) -> Self {
        let metrics = PortfolioMetrics::compute(positions);
        Self {
            positions_value: metrics.total_value,
            cash,
            total_value: metrics.total_value + cash,
            metrics,
        }
    }
}

/// Audit record of one applied change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedChange {
    pub index: usize,
    pub change: ScenarioChange,
    pub warnings: Vec<String>,
}

/// Before/after value of a single instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionImpact {
    pub instrument_id: String,
    pub base_value: f64,
    pub scenario_value: f64,
    pub value_delta: f64,
    pub base_weight: f64,
    pub scenario_weight: f64,
}

/// Outcome of applying a change list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub base: PortfolioSnapshot,
    pub scenario: PortfolioSnapshot,
    /// The hypothetical position set after all changes.
    pub positions: PositionSet,
    /// `scenario.total_value − base.total_value`.
    pub value_delta: f64,
    /// `value_delta` as a percentage of the base total (0 for an empty base).
    pub value_delta_pct: f64,
    pub hhi_before: f64,
    pub hhi_after: f64,
    /// Dimension → bucket → (scenario weight − base weight), in percentage points.
    pub weight_changes: BTreeMap<Dimension, BTreeMap<String, f64>>,
    pub position_impacts: Vec<PositionImpact>,
    pub applied_changes: Vec<AppliedChange>,
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Apply `changes` to `positions` and compare the result against the base.
pub fn apply(positions: &PositionSet, changes: &[ScenarioChange], cash_balance: f64) -> ScenarioResult {
    apply_at(positions, changes, cash_balance, Utc::now())
}

/// Same as [`apply`] with an explicit timestamp.
pub fn apply_at(
    positions: &PositionSet,
    changes: &[ScenarioChange],
    cash_balance: f64,
    now: DateTime<Utc>,
) -> ScenarioResult {
    let mut scenario = positions.clone();
    let mut applied = Vec::with_capacity(changes.len());

    for (index, change) in changes.iter().enumerate() {
        let warnings = apply_change(&mut scenario, change);
        for w in &warnings {
            warn!(change = index, "{w}");
        }
        applied.push(AppliedChange {
            index,
            change: change.clone(),
            warnings,
        });
    }

    let base = PortfolioSnapshot::capture(positions, cash_balance);
    let after = PortfolioSnapshot::capture(&scenario, cash_balance);

    let value_delta = after.total_value - base.total_value;
    let value_delta_pct = weight_pct(value_delta, base.total_value);

    let weight_changes = Dimension::ALL
        .iter()
        .map(|d| (*d, weight_deltas(positions, &scenario, *d)))
        .collect();

    let position_impacts = position_impacts(positions, &scenario);
    let warnings = applied
        .iter()
        .flat_map(|a| a.warnings.iter().cloned())
        .collect();

    debug!(
        changes = changes.len(),
        value_delta,
        hhi_before = base.metrics.hhi,
        hhi_after = after.metrics.hhi,
        "scenario applied"
    );

    ScenarioResult {
        hhi_before: base.metrics.hhi,
        hhi_after: after.metrics.hhi,
        base,
        scenario: after,
        positions: scenario,
        value_delta,
        value_delta_pct,
        weight_changes,
        position_impacts,
        applied_changes: applied,
        warnings,
        created_at: now,
    }
}

// ─── Change application ─────────────────────────────────────────────

fn apply_change(positions: &mut PositionSet, change: &ScenarioChange) -> Vec<String> {
    let mut warnings = Vec::new();
    match change {
        ScenarioChange::PriceChange { instrument_id, pct } => {
            if !pct.is_finite() {
                warnings.push(format!("price change for {instrument_id} is not finite; skipped"));
                return warnings;
            }
            match positions.get_mut(instrument_id) {
                Some(p) => {
                    p.current_price = clamp_price(p, p.current_price * (1.0 + pct / 100.0), &mut warnings);
                }
                None => warnings.push(format!("price change for unknown instrument {instrument_id}; skipped")),
            }
        }
        ScenarioChange::QuantityChange { instrument_id, delta } => {
            if !delta.is_finite() {
                warnings.push(format!("quantity change for {instrument_id} is not finite; skipped"));
                return warnings;
            }
            match positions.get_mut(instrument_id) {
                Some(p) => {
                    let next = p.quantity + delta;
                    if next < 0.0 {
                        warnings.push(format!(
                            "quantity of {instrument_id} would drop to {next}; clamped to 0"
                        ));
                        p.quantity = 0.0;
                    } else {
                        p.quantity = next;
                    }
                }
                None => warnings.push(format!(
                    "quantity change for unknown instrument {instrument_id}; skipped"
                )),
            }
        }
        ScenarioChange::AddPosition { position } => add_position(positions, position, &mut warnings),
        ScenarioChange::MarketEvent(event) => {
            for p in positions.iter_mut() {
                let m = event.multiplier_for(p);
                if !m.is_finite() {
                    warnings.push(format!(
                        "{}: multiplier for {} is not finite; skipped",
                        event.label, p.instrument_id
                    ));
                    continue;
                }
                p.current_price = clamp_price(p, p.current_price * m, &mut warnings);
            }
        }
    }
    warnings
}

fn clamp_price(p: &Position, price: f64, warnings: &mut Vec<String>) -> f64 {
    if price < 0.0 {
        warnings.push(format!(
            "price of {} would drop to {price}; clamped to 0",
            p.instrument_id
        ));
        0.0
    } else {
        price
    }
}

fn add_position(positions: &mut PositionSet, raw: &RawPosition, warnings: &mut Vec<String>) {
    let new = match classify(raw) {
        Ok(p) => p,
        Err(e) => {
            warnings.push(format!("added position rejected: {e}; skipped"));
            return;
        }
    };

    match positions.get_mut(&new.instrument_id) {
        Some(existing) => {
            let merged = existing.quantity + new.quantity;
            // Cost of the added units is what was paid for them.
            let added_cost = new.average_price.unwrap_or(new.current_price);
            existing.average_price = match existing.average_price {
                Some(avg) if merged > 0.0 => {
                    Some((avg * existing.quantity + added_cost * new.quantity) / merged)
                }
                other => other,
            };
            existing.quantity = merged;
            existing.lots.extend(new.lots.iter().cloned());
        }
        None => {
            // Cannot fail: the id was just checked to be absent.
            if let Err(e) = positions.insert(new) {
                warnings.push(e.to_string());
            }
        }
    }
}

// ─── Diffing ────────────────────────────────────────────────────────

fn weight_deltas(base: &PositionSet, scenario: &PositionSet, dimension: Dimension) -> BTreeMap<String, f64> {
    let before = exposure_by_dimension(base, dimension);
    let after = exposure_by_dimension(scenario, dimension);

    let labels: BTreeSet<&str> = before
        .iter()
        .chain(after.iter())
        .map(|b| b.label.as_str())
        .collect();

    let weight = |buckets: &[ExposureBucket], label: &str| {
        buckets
            .iter()
            .find(|b| b.label == label)
            .map(|b| b.weight)
            .unwrap_or(0.0)
    };

    labels
        .into_iter()
        .map(|label| {
            (
                label.to_string(),
                weight(&after, label) - weight(&before, label),
            )
        })
        .collect()
}

fn position_impacts(base: &PositionSet, scenario: &PositionSet) -> Vec<PositionImpact> {
    let base_total = base.total_value();
    let scenario_total = scenario.total_value();

    // Base order first, then instruments that only exist in the scenario.
    let mut ids: Vec<&str> = base.iter().map(|p| p.instrument_id.as_str()).collect();
    ids.extend(
        scenario
            .iter()
            .map(|p| p.instrument_id.as_str())
            .filter(|id| !base.contains(id)),
    );

    ids.into_iter()
        .map(|id| {
            let base_value = base.get(id).map(Position::value).unwrap_or(0.0);
            let scenario_value = scenario.get(id).map(Position::value).unwrap_or(0.0);
            PositionImpact {
                instrument_id: id.to_string(),
                base_value,
                scenario_value,
                value_delta: scenario_value - base_value,
                base_weight: weight_pct(base_value, base_total),
                scenario_weight: weight_pct(scenario_value, scenario_total),
            }
        })
        .collect()
}
