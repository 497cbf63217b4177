//! Transaction cost and tax impact estimators.
//!
//! Both estimators work on a slice of orders and key their output by the
//! order's index in that slice, so they must run on the final (sequenced)
//! order list before `annotate`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::warn;

use crate::domain::{HoldingTerm, Position, PositionSet, Side, TaxImpact, TaxLot, TradeOrder};
use crate::error::ConfigurationError;

// ─── Transaction costs ──────────────────────────────────────────────

/// Flat fee per order plus a commission proportional to notional.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    pub flat_fee: f64,
    /// Percent of notional, e.g. 0.1 = 10 bps.
    pub commission_pct: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            flat_fee: 1.0,
            commission_pct: 0.1,
        }
    }
}

impl CostModel {
    /// No fees at all.
    pub fn frictionless() -> Self {
        Self {
            flat_fee: 0.0,
            commission_pct: 0.0,
        }
    }

    /// Cost of a single order; zero-notional orders cost nothing.
    pub fn order_cost(&self, notional: f64) -> f64 {
        if notional <= 0.0 {
            return 0.0;
        }
        self.flat_fee + notional.abs() * self.commission_pct / 100.0
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_non_negative("flat_fee", self.flat_fee)?;
        check_non_negative("commission_pct", self.commission_pct)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCost {
    pub order_index: usize,
    pub instrument_id: String,
    pub side: Side,
    pub notional: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub per_order: Vec<OrderCost>,
    pub total_cost: f64,
    pub total_traded: f64,
    /// `total_cost / total_traded × 100`, 0 when nothing trades.
    pub cost_as_percent: f64,
}

impl CostBreakdown {
    pub fn cost_of(&self, order_index: usize) -> Option<f64> {
        self.per_order
            .iter()
            .find(|c| c.order_index == order_index)
            .map(|c| c.cost)
    }
}

pub fn estimate_transaction_costs(orders: &[TradeOrder], model: &CostModel) -> CostBreakdown {
    let per_order: Vec<OrderCost> = orders
        .iter()
        .enumerate()
        .map(|(order_index, o)| OrderCost {
            order_index,
            instrument_id: o.instrument_id.clone(),
            side: o.side,
            notional: o.estimated_total,
            cost: model.order_cost(o.estimated_total),
        })
        .collect();

    let total_cost: f64 = per_order.iter().map(|c| c.cost).sum();
    let total_traded: f64 = per_order.iter().map(|c| c.notional).sum();
    let cost_as_percent = if total_traded > 0.0 {
        total_cost / total_traded * 100.0
    } else {
        0.0
    };

    CostBreakdown {
        per_order,
        total_cost,
        total_traded,
        cost_as_percent,
    }
}

// ─── Taxes ──────────────────────────────────────────────────────────

/// Capital gains rates, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxRates {
    pub short_term_rate: f64,
    pub long_term_rate: f64,
    /// Holding period (days) at or above which a gain is long-term.
    pub long_term_days: i64,
}

impl Default for TaxRates {
    fn default() -> Self {
        Self {
            short_term_rate: 30.0,
            long_term_rate: 15.0,
            long_term_days: 365,
        }
    }
}

impl TaxRates {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_non_negative("short_term_rate", self.short_term_rate)?;
        check_non_negative("long_term_rate", self.long_term_rate)?;
        if self.long_term_days <= 0 {
            return Err(ConfigurationError::InvalidOption {
                name: "long_term_days",
                reason: format!("must be positive, got {}", self.long_term_days),
            });
        }
        Ok(())
    }

    fn term_for(&self, acquired_on: NaiveDate, as_of: NaiveDate) -> HoldingTerm {
        if (as_of - acquired_on).num_days() >= self.long_term_days {
            HoldingTerm::Long
        } else {
            HoldingTerm::Short
        }
    }

    fn tax_on(&self, short_gain: f64, long_gain: f64) -> f64 {
        short_gain * self.short_term_rate / 100.0 + long_gain * self.long_term_rate / 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxStatus {
    Complete,
    /// At least one sell has an unknown cost basis; the liability covers the
    /// known part only.
    Partial,
}

/// Tax detail for one sell order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxLine {
    pub order_index: usize,
    pub instrument_id: String,
    pub quantity: f64,
    pub proceeds: f64,
    pub cost_basis: Option<f64>,
    pub short_term_gain: f64,
    pub long_term_gain: f64,
    pub impact: TaxImpact,
}

/// A loss-realizing sell and the tax it would save at the applicable rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestOpportunity {
    pub order_index: usize,
    pub instrument_id: String,
    /// Positive amount of the realized loss.
    pub realized_loss: f64,
    pub tax_benefit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxEstimate {
    pub lines: Vec<TaxLine>,
    pub short_term_net: f64,
    pub long_term_net: f64,
    /// Liability on the known part after netting; never negative.
    pub total_liability: f64,
    pub unknown_count: usize,
    pub status: TaxStatus,
    pub harvesting: Vec<HarvestOpportunity>,
    pub warnings: Vec<String>,
}

impl TaxEstimate {
    pub fn line_for(&self, order_index: usize) -> Option<&TaxLine> {
        self.lines.iter().find(|l| l.order_index == order_index)
    }
}

/// Realized gains of one sell, split by holding term.
struct Realized {
    cost_basis: f64,
    short: f64,
    long: f64,
}

/// Estimate realized gains and tax for every sell in `orders`.
///
/// Lots are consumed FIFO; several sells of one instrument keep consuming the
/// same queue. Positions without lots use the average price, and are treated
/// as short-term when the acquisition date is unknown.
pub fn estimate_tax_impact(
    orders: &[TradeOrder],
    positions: &PositionSet,
    rates: &TaxRates,
    as_of: NaiveDate,
) -> TaxEstimate {
    let mut lots: HashMap<&str, VecDeque<TaxLot>> = HashMap::new();
    let mut lines = Vec::new();
    let mut harvesting = Vec::new();
    let mut warnings = Vec::new();
    let mut unknown_count = 0;

    for (order_index, order) in orders.iter().enumerate().filter(|(_, o)| o.is_sell()) {
        let proceeds = order.quantity * order.estimated_price;
        let realized = match positions.get(&order.instrument_id) {
            None => Err(format!("{} is not held", order.instrument_id)),
            Some(position) => {
                let queue = lots
                    .entry(position.instrument_id.as_str())
                    .or_insert_with(|| position.lots.iter().cloned().collect());
                realize(position, queue, order, rates, as_of, &mut warnings)
            }
        };

        let line = match realized {
            Ok(r) => {
                let gain = r.short + r.long;
                let tax = rates.tax_on(r.short, r.long);
                let term = match (r.short != 0.0, r.long != 0.0) {
                    (true, true) => HoldingTerm::Mixed,
                    (false, true) => HoldingTerm::Long,
                    _ => HoldingTerm::Short,
                };
                if gain < 0.0 {
                    harvesting.push(HarvestOpportunity {
                        order_index,
                        instrument_id: order.instrument_id.clone(),
                        realized_loss: -gain,
                        tax_benefit: -tax,
                    });
                }
                TaxLine {
                    order_index,
                    instrument_id: order.instrument_id.clone(),
                    quantity: order.quantity,
                    proceeds,
                    cost_basis: Some(r.cost_basis),
                    short_term_gain: r.short,
                    long_term_gain: r.long,
                    impact: TaxImpact::Estimated {
                        realized_gain: gain,
                        tax,
                        term,
                    },
                }
            }
            Err(reason) => {
                unknown_count += 1;
                let message = format!("tax unknown for {}: {reason}", order.instrument_id);
                warn!("{message}");
                warnings.push(message);
                TaxLine {
                    order_index,
                    instrument_id: order.instrument_id.clone(),
                    quantity: order.quantity,
                    proceeds,
                    cost_basis: None,
                    short_term_gain: 0.0,
                    long_term_gain: 0.0,
                    impact: TaxImpact::Unknown { reason },
                }
            }
        };
        lines.push(line);
    }

    let short_term_net: f64 = lines.iter().map(|l| l.short_term_gain).sum();
    let long_term_net: f64 = lines.iter().map(|l| l.long_term_gain).sum();
    let (short_taxable, long_taxable) = offset_terms(short_term_net, long_term_net);
    let total_liability = rates.tax_on(short_taxable, long_taxable).max(0.0);

    TaxEstimate {
        lines,
        short_term_net,
        long_term_net,
        total_liability,
        unknown_count,
        status: if unknown_count > 0 {
            TaxStatus::Partial
        } else {
            TaxStatus::Complete
        },
        harvesting,
        warnings,
    }
}

fn realize(
    position: &Position,
    queue: &mut VecDeque<TaxLot>,
    order: &TradeOrder,
    rates: &TaxRates,
    as_of: NaiveDate,
    warnings: &mut Vec<String>,
) -> Result<Realized, String> {
    let price = order.estimated_price;
    let mut remaining = order.quantity;
    let mut realized = Realized {
        cost_basis: 0.0,
        short: 0.0,
        long: 0.0,
    };

    while remaining > 1e-12 {
        let Some(lot) = queue.front_mut() else { break };
        let take = lot.quantity.min(remaining);
        let gain = take * (price - lot.unit_cost);
        realized.cost_basis += take * lot.unit_cost;
        match rates.term_for(lot.acquired_on, as_of) {
            HoldingTerm::Long => realized.long += gain,
            _ => realized.short += gain,
        }
        lot.quantity -= take;
        remaining -= take;
        if lot.quantity <= 1e-12 {
            queue.pop_front();
        }
    }

    if remaining <= 1e-12 {
        return Ok(realized);
    }

    // Whatever the lots do not cover is priced at the average cost.
    let Some(avg) = position.average_price else {
        return Err("no cost basis".to_string());
    };
    let gain = remaining * (price - avg);
    realized.cost_basis += remaining * avg;
    let term = match position.acquired_on {
        Some(date) => rates.term_for(date, as_of),
        None => {
            let message = format!(
                "acquisition date unknown for {}; assuming short-term",
                position.instrument_id
            );
            warn!("{message}");
            warnings.push(message);
            HoldingTerm::Short
        }
    };
    match term {
        HoldingTerm::Long => realized.long += gain,
        _ => realized.short += gain,
    }
    Ok(realized)
}

/// Net a loss in one term against a gain in the other.
fn offset_terms(short: f64, long: f64) -> (f64, f64) {
    if short < 0.0 && long > 0.0 {
        (0.0, (long + short).max(0.0))
    } else if long < 0.0 && short > 0.0 {
        ((short + long).max(0.0), 0.0)
    } else {
        (short.max(0.0), long.max(0.0))
    }
}

/// Copy cost and tax figures onto the orders they were computed for.
pub fn annotate(
    mut orders: Vec<TradeOrder>,
    costs: &CostBreakdown,
    taxes: &TaxEstimate,
) -> Vec<TradeOrder> {
    for (index, order) in orders.iter_mut().enumerate() {
        order.estimated_cost = costs.cost_of(index);
        order.estimated_tax = match order.side {
            Side::Buy => Some(TaxImpact::NotApplicable),
            Side::Sell => taxes.line_for(index).map(|l| l.impact.clone()),
        };
    }
    orders
}

fn check_non_negative(name: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigurationError::InvalidOption {
            name,
            reason: format!("must be a non-negative number, got {value}"),
        });
    }
    Ok(())
}
