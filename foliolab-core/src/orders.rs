//! Trade order generator.
//!
//! Turns a deviation analysis into concrete buy/sell orders. Buckets are
//! visited in priority order (largest |deviation| first); within a bucket the
//! excess or gap is spread over the member positions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::costs::CostModel;
use crate::deviation::{self, Deviation, DeviationAnalysis, DeviationDirection};
use crate::domain::{Dimension, OrderRationale, Position, PositionSet, Side, TargetAllocation, TradeOrder};
use crate::error::{ConfigurationError, EngineError, InsufficientDataError};

/// Deviations smaller than this are treated as zero by the strategic rule.
const DELTA_EPSILON: f64 = 1e-9;

/// How buckets are chosen and how sells are spread inside a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceStrategy {
    /// Trade only buckets outside the band.
    #[default]
    Threshold,
    /// Trade every bucket with a non-zero deviation.
    Strategic,
    /// Threshold rule, realizing losses before gains.
    #[serde(alias = "tax-aware")]
    TaxAware,
}

/// Instrument used to buy into a bucket nobody holds yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub instrument_id: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalanceOptions {
    /// Budget for total transaction cost; generation stops at the first order
    /// that would exceed it.
    pub max_cost: Option<f64>,
    /// Orders with a smaller estimated total are dropped.
    pub min_trade_size: f64,
    pub strategy: RebalanceStrategy,
    pub fractional_shares: bool,
    /// Bucket label → instrument to buy when the bucket has no holdings.
    pub candidates: BTreeMap<String, Candidate>,
}

impl Default for RebalanceOptions {
    fn default() -> Self {
        Self {
            max_cost: None,
            min_trade_size: 10.0,
            strategy: RebalanceStrategy::Threshold,
            fractional_shares: false,
            candidates: BTreeMap::new(),
        }
    }
}

impl RebalanceOptions {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.min_trade_size.is_finite() || self.min_trade_size < 0.0 {
            return Err(ConfigurationError::InvalidOption {
                name: "min_trade_size",
                reason: format!("must be a non-negative number, got {}", self.min_trade_size),
            });
        }
        if let Some(max_cost) = self.max_cost {
            if !max_cost.is_finite() || max_cost < 0.0 {
                return Err(ConfigurationError::InvalidOption {
                    name: "max_cost",
                    reason: format!("must be a non-negative number, got {max_cost}"),
                });
            }
        }
        for (bucket, candidate) in &self.candidates {
            if !candidate.price.is_finite() || candidate.price <= 0.0 {
                return Err(ConfigurationError::InvalidOption {
                    name: "candidates",
                    reason: format!(
                        "candidate {} for bucket '{bucket}' needs a positive price",
                        candidate.instrument_id
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Output of the generator, before sequencing and annotation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedOrders {
    pub orders: Vec<TradeOrder>,
    pub dropped_below_min: usize,
    /// Legs smaller than one share in whole-share mode.
    pub dropped_by_rounding: usize,
    /// True when the cost budget stopped generation early.
    pub truncated: bool,
    pub warnings: Vec<String>,
}

/// Analyze `positions` against `target` and generate orders.
pub fn generate(
    positions: &PositionSet,
    target: &TargetAllocation,
    options: &RebalanceOptions,
    cost_model: &CostModel,
) -> Result<GeneratedOrders, EngineError> {
    options.validate()?;
    cost_model.validate()?;
    if positions.is_empty() {
        return Err(InsufficientDataError::NoPositions.into());
    }
    let analysis = deviation::analyze(positions, target)?;
    Ok(generate_from_analysis(positions, &analysis, options, cost_model)?)
}

/// Generate orders from an existing analysis.
pub fn generate_from_analysis(
    positions: &PositionSet,
    analysis: &DeviationAnalysis,
    options: &RebalanceOptions,
    cost_model: &CostModel,
) -> Result<GeneratedOrders, InsufficientDataError> {
    if analysis.total_value <= 0.0 {
        return Err(InsufficientDataError::ZeroTotalValue);
    }

    let mut out = GeneratedOrders::default();
    let mut spent = 0.0;

    'buckets: for (priority, dev) in analysis.deviations.iter().enumerate() {
        let trades = match options.strategy {
            RebalanceStrategy::Strategic => dev.delta.abs() > DELTA_EPSILON,
            RebalanceStrategy::Threshold | RebalanceStrategy::TaxAware => {
                dev.direction != DeviationDirection::OnTarget
            }
        };
        if !trades {
            continue;
        }

        let members: Vec<&Position> = positions
            .iter()
            .filter(|p| analysis.dimension.label_of(p) == dev.label)
            .collect();

        let legs = if dev.delta > 0.0 {
            sell_legs(&members, dev.value_gap, options.strategy)
        } else {
            match buy_legs(&members, -dev.value_gap, dev, analysis.dimension, options) {
                Some(legs) => legs,
                None => {
                    let message = format!(
                        "no instrument available to buy into bucket '{}'; skipped",
                        dev.label
                    );
                    warn!("{message}");
                    out.warnings.push(message);
                    continue;
                }
            }
        };

        for leg in legs {
            let mut quantity = round_quantity(leg.value / leg.price, options.fractional_shares);
            if leg.side == Side::Sell {
                quantity = quantity.min(leg.held);
            }
            if quantity <= 0.0 {
                out.dropped_by_rounding += 1;
                continue;
            }
            let estimated_total = quantity * leg.price;
            if estimated_total < options.min_trade_size {
                out.dropped_below_min += 1;
                continue;
            }

            if let Some(budget) = options.max_cost {
                let cost = cost_model.order_cost(estimated_total);
                if spent + cost > budget {
                    let message = format!(
                        "transaction cost budget {budget:.2} reached at {} {}; remaining orders skipped",
                        leg.side, leg.instrument_id
                    );
                    warn!("{message}");
                    out.warnings.push(message);
                    out.truncated = true;
                    break 'buckets;
                }
                spent += cost;
            }

            out.orders.push(TradeOrder {
                instrument_id: leg.instrument_id,
                side: leg.side,
                quantity,
                estimated_price: leg.price,
                estimated_total,
                rationale: OrderRationale {
                    dimension: analysis.dimension,
                    bucket: dev.label.clone(),
                    deviation: dev.delta,
                    reason: format!(
                        "{} {} from {:.2}% toward {:.2}%",
                        if leg.side == Side::Sell { "reduce" } else { "raise" },
                        dev.label,
                        dev.current_weight,
                        dev.target_weight
                    ),
                },
                priority,
                tax_loss_harvest: leg.side == Side::Sell && leg.at_loss,
                estimated_cost: None,
                estimated_tax: None,
            });
        }
    }

    if out.dropped_by_rounding > 0 {
        let message = format!(
            "{} order(s) smaller than one whole share dropped",
            out.dropped_by_rounding
        );
        warn!("{message}");
        out.warnings.push(message);
    }
    if out.dropped_below_min > 0 {
        let message = format!(
            "{} order(s) below the minimum trade size of {:.2} dropped",
            out.dropped_below_min, options.min_trade_size
        );
        warn!("{message}");
        out.warnings.push(message);
    }
    debug!(
        orders = out.orders.len(),
        dropped = out.dropped_below_min,
        rounded_away = out.dropped_by_rounding,
        truncated = out.truncated,
        "orders generated"
    );
    Ok(out)
}

// ─── Allocation inside a bucket ─────────────────────────────────────

/// Value to trade in one instrument, before rounding to a quantity.
struct Leg {
    instrument_id: String,
    side: Side,
    price: f64,
    value: f64,
    held: f64,
    at_loss: bool,
}

impl Leg {
    fn new(position: &Position, side: Side, value: f64) -> Self {
        Self {
            instrument_id: position.instrument_id.clone(),
            side,
            price: position.current_price,
            value,
            held: position.quantity,
            at_loss: position.is_at_loss(),
        }
    }
}

fn round_quantity(quantity: f64, fractional: bool) -> f64 {
    if !quantity.is_finite() || quantity <= 0.0 {
        return 0.0;
    }
    if fractional {
        quantity
    } else {
        (quantity + 1e-9).floor()
    }
}

/// Members sorted by value descending, ties by id.
fn by_value_desc<'a>(members: &[&'a Position]) -> Vec<&'a Position> {
    let mut sorted: Vec<&Position> = members
        .iter()
        .copied()
        .filter(|p| p.current_price > 0.0 && p.quantity > 0.0)
        .collect();
    sorted.sort_by(|a, b| {
        b.value()
            .total_cmp(&a.value())
            .then_with(|| a.instrument_id.cmp(&b.instrument_id))
    });
    sorted
}

/// Split `amount` over `members` in proportion to value, never taking more
/// than a member is worth. Returns what is left over.
fn take_proportionally(members: &[&Position], amount: f64, legs: &mut Vec<Leg>) -> f64 {
    let pool: f64 = members.iter().map(|p| p.value()).sum();
    if pool <= 0.0 || amount <= 0.0 {
        return amount;
    }
    let share = (amount / pool).min(1.0);
    for p in members {
        legs.push(Leg::new(p, Side::Sell, p.value() * share));
    }
    amount - pool * share
}

fn sell_legs(members: &[&Position], excess: f64, strategy: RebalanceStrategy) -> Vec<Leg> {
    let sellable = by_value_desc(members);
    let mut legs = Vec::new();

    if strategy != RebalanceStrategy::TaxAware {
        take_proportionally(&sellable, excess, &mut legs);
        return legs;
    }

    let mut losers: Vec<&Position> = sellable.iter().copied().filter(|p| p.is_at_loss()).collect();
    losers.sort_by(|a, b| {
        let la = a.unrealized_pnl().unwrap_or(0.0);
        let lb = b.unrealized_pnl().unwrap_or(0.0);
        la.total_cmp(&lb)
            .then_with(|| a.instrument_id.cmp(&b.instrument_id))
    });
    let gainers: Vec<&Position> = sellable
        .iter()
        .copied()
        .filter(|p| p.has_cost_basis() && !p.is_at_loss())
        .collect();
    let unknown: Vec<&Position> = sellable
        .iter()
        .copied()
        .filter(|p| !p.has_cost_basis())
        .collect();

    let mut remaining = excess;
    for p in losers {
        if remaining <= 0.0 {
            break;
        }
        let take = remaining.min(p.value());
        legs.push(Leg::new(p, Side::Sell, take));
        remaining -= take;
    }
    remaining = take_proportionally(&gainers, remaining, &mut legs);
    take_proportionally(&unknown, remaining, &mut legs);
    legs
}

/// `None` when the bucket has nothing to buy.
fn buy_legs(
    members: &[&Position],
    gap: f64,
    dev: &Deviation,
    dimension: Dimension,
    options: &RebalanceOptions,
) -> Option<Vec<Leg>> {
    let buyable: Vec<&Position> = members
        .iter()
        .copied()
        .filter(|p| p.current_price > 0.0)
        .collect();

    if buyable.is_empty() {
        let (_, candidate) = options
            .candidates
            .iter()
            .find(|(bucket, _)| dimension.normalize_label(bucket) == dev.label)?;
        return Some(vec![Leg {
            instrument_id: candidate.instrument_id.clone(),
            side: Side::Buy,
            price: candidate.price,
            value: gap,
            held: 0.0,
            at_loss: false,
        }]);
    }

    let pool: f64 = buyable.iter().map(|p| p.value()).sum();
    let mut sorted = buyable;
    sorted.sort_by(|a, b| {
        b.value()
            .total_cmp(&a.value())
            .then_with(|| a.instrument_id.cmp(&b.instrument_id))
    });
    let count = sorted.len() as f64;
    Some(
        sorted
            .into_iter()
            .map(|p| {
                let value = if pool > 0.0 {
                    gap * p.value() / pool
                } else {
                    gap / count
                };
                Leg::new(p, Side::Buy, value)
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(positions: Vec<Position>) -> PositionSet {
        PositionSet::from_positions(positions).unwrap()
    }

    fn ab() -> PositionSet {
        set(vec![
            Position::new("A", 10.0, 100.0),
            Position::new("B", 5.0, 200.0),
        ])
    }

    fn free() -> CostModel {
        CostModel::frictionless()
    }

    #[test]
    fn two_position_rebalance() {
        let target = TargetAllocation::from_pairs(Dimension::Instrument, [("A", 30.0), ("B", 70.0)]);
        let out = generate(&ab(), &target, &RebalanceOptions::default(), &free()).unwrap();
        assert_eq!(out.orders.len(), 2);
        let sell = out.orders.iter().find(|o| o.is_sell()).unwrap();
        let buy = out.orders.iter().find(|o| o.is_buy()).unwrap();
        assert_eq!((sell.instrument_id.as_str(), sell.quantity), ("A", 4.0));
        assert_eq!((buy.instrument_id.as_str(), buy.quantity), ("B", 2.0));
        assert!((sell.rationale.deviation - 20.0).abs() < 1e-9);
    }

    #[test]
    fn sell_never_exceeds_holding() {
        let positions = set(vec![
            Position::new("A", 3.0, 100.0),
            Position::new("B", 7.0, 100.0),
        ]);
        let target = TargetAllocation::from_pairs(Dimension::Instrument, [("B", 100.0)]);
        let out = generate(&positions, &target, &RebalanceOptions::default(), &free()).unwrap();
        let sell = out.orders.iter().find(|o| o.is_sell()).unwrap();
        assert_eq!(sell.quantity, 3.0);
    }

    #[test]
    fn whole_units_round_down_unless_fractional() {
        let positions = set(vec![
            Position::new("A", 10.0, 30.0),
            Position::new("B", 10.0, 70.0),
        ]);
        // A is 30%, target 20% → sell 100 worth = 3.33 units.
        let target = TargetAllocation::from_pairs(Dimension::Instrument, [("A", 20.0), ("B", 80.0)]);
        let whole = generate(&positions, &target, &RebalanceOptions::default(), &free()).unwrap();
        assert_eq!(whole.orders.iter().find(|o| o.is_sell()).unwrap().quantity, 3.0);

        let options = RebalanceOptions {
            fractional_shares: true,
            ..RebalanceOptions::default()
        };
        let frac = generate(&positions, &target, &options, &free()).unwrap();
        let q = frac.orders.iter().find(|o| o.is_sell()).unwrap().quantity;
        assert!((q - 100.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn small_orders_dropped() {
        let target = TargetAllocation::from_pairs(Dimension::Instrument, [("A", 30.0), ("B", 70.0)]);
        let options = RebalanceOptions {
            min_trade_size: 500.0,
            ..RebalanceOptions::default()
        };
        let out = generate(&ab(), &target, &options, &free()).unwrap();
        assert!(out.orders.is_empty());
        assert_eq!(out.dropped_below_min, 2);
        assert!(!out.warnings.is_empty());
    }

    #[test]
    fn sub_share_legs_counted_as_rounding() {
        let positions = set(vec![
            Position::new("A", 1.0, 1000.0),
            Position::new("B", 9.0, 100.0),
        ]);
        // A is 52.6%: the 50 worth to move is a fraction of either share price.
        let target = TargetAllocation::from_pairs(Dimension::Instrument, [("A", 50.0), ("B", 50.0)]);
        let out = generate(&positions, &target, &RebalanceOptions::default(), &free()).unwrap();
        assert!(out.orders.is_empty());
        assert_eq!(out.dropped_by_rounding, 2);
        assert_eq!(out.dropped_below_min, 0);
        assert!(out.warnings.iter().any(|w| w.contains("whole share")));
        assert!(!out.warnings.iter().any(|w| w.contains("minimum trade size")));
    }

    #[test]
    fn cost_budget_stops_generation() {
        let target = TargetAllocation::from_pairs(Dimension::Instrument, [("A", 30.0), ("B", 70.0)]);
        let options = RebalanceOptions {
            max_cost: Some(1.5),
            ..RebalanceOptions::default()
        };
        let out = generate(&ab(), &target, &options, &CostModel::default()).unwrap();
        assert_eq!(out.orders.len(), 1);
        assert!(out.truncated);
    }

    #[test]
    fn threshold_ignores_buckets_inside_band() {
        let target = TargetAllocation::from_pairs(Dimension::Instrument, [("A", 49.5), ("B", 50.5)]);
        let out = generate(&ab(), &target, &RebalanceOptions::default(), &free()).unwrap();
        assert!(out.orders.is_empty());

        let options = RebalanceOptions {
            strategy: RebalanceStrategy::Strategic,
            fractional_shares: true,
            min_trade_size: 0.0,
            ..RebalanceOptions::default()
        };
        let out = generate(&ab(), &target, &options, &free()).unwrap();
        assert_eq!(out.orders.len(), 2);
    }

    #[test]
    fn tax_aware_sells_losers_first() {
        let positions = set(vec![
            Position::new("WIN", 10.0, 100.0)
                .with_sector("tech")
                .with_average_price(50.0),
            Position::new("LOSE", 10.0, 100.0)
                .with_sector("tech")
                .with_average_price(150.0),
            Position::new("BOND", 20.0, 100.0).with_sector("bonds"),
        ]);
        // tech is 50%, target 40% → sell 400 worth, all from LOSE.
        let target = TargetAllocation::from_pairs(Dimension::Sector, [("tech", 40.0), ("bonds", 60.0)]);
        let options = RebalanceOptions {
            strategy: RebalanceStrategy::TaxAware,
            ..RebalanceOptions::default()
        };
        let out = generate(&positions, &target, &options, &free()).unwrap();
        let sells: Vec<_> = out.orders.iter().filter(|o| o.is_sell()).collect();
        assert_eq!(sells.len(), 1);
        assert_eq!(sells[0].instrument_id, "LOSE");
        assert_eq!(sells[0].quantity, 4.0);
        assert!(sells[0].tax_loss_harvest);
    }

    #[test]
    fn empty_bucket_bought_through_candidate() {
        let target = TargetAllocation::from_pairs(Dimension::Instrument, [("A", 40.0), ("B", 40.0), ("C", 20.0)]);
        let out = generate(&ab(), &target, &RebalanceOptions::default(), &free()).unwrap();
        assert!(out.orders.iter().all(|o| o.instrument_id != "C"));
        assert!(out.warnings.iter().any(|w| w.contains("'C'")));

        let mut options = RebalanceOptions::default();
        options.candidates.insert(
            "C".into(),
            Candidate {
                instrument_id: "C".into(),
                price: 50.0,
            },
        );
        let out = generate(&ab(), &target, &options, &free()).unwrap();
        let buy = out.orders.iter().find(|o| o.instrument_id == "C").unwrap();
        assert_eq!(buy.quantity, 8.0);
    }

    #[test]
    fn candidate_key_matched_in_canonical_form() {
        let positions = set(vec![Position::new("A", 10.0, 100.0).with_sector("tech")]);
        let target = TargetAllocation::from_pairs(Dimension::Sector, [("Tech", 50.0), ("Bonds", 50.0)]);
        let mut options = RebalanceOptions::default();
        options.candidates.insert(
            "Bonds".into(),
            Candidate {
                instrument_id: "BND".into(),
                price: 50.0,
            },
        );
        let out = generate(&positions, &target, &options, &free()).unwrap();
        let sell = out.orders.iter().find(|o| o.is_sell()).unwrap();
        let buy = out.orders.iter().find(|o| o.is_buy()).unwrap();
        assert_eq!((sell.instrument_id.as_str(), sell.quantity), ("A", 5.0));
        assert_eq!((buy.instrument_id.as_str(), buy.quantity), ("BND", 10.0));
        assert_eq!(buy.rationale.bucket, "bonds");
    }

    #[test]
    fn zero_value_portfolio_is_insufficient_data() {
        let positions = set(vec![Position::new("A", 0.0, 100.0)]);
        let target = TargetAllocation::from_pairs(Dimension::Instrument, [("A", 100.0)]);
        let err = generate(&positions, &target, &RebalanceOptions::default(), &free()).unwrap_err();
        assert_eq!(err, EngineError::InsufficientData(InsufficientDataError::ZeroTotalValue));
    }

    #[test]
    fn invalid_target_is_configuration_error() {
        let target = TargetAllocation::from_pairs(Dimension::Instrument, [("A", 50.0), ("B", 40.0)]);
        let err = generate(&ab(), &target, &RebalanceOptions::default(), &free()).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(ConfigurationError::TargetSum { .. })));
    }

    #[test]
    fn strategy_accepts_kebab_alias() {
        let s: RebalanceStrategy = serde_json::from_str("\"tax-aware\"").unwrap();
        assert_eq!(s, RebalanceStrategy::TaxAware);
    }
}
