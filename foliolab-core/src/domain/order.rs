//! Trade orders proposed by the rebalancer.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::allocation::Dimension;

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "buy" | "b" | "operationtypebuy" => Some(Self::Buy),
            "sell" | "s" | "operationtypesell" => Some(Self::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("buy"),
            Self::Sell => f.write_str("sell"),
        }
    }
}

/// Whether a realized gain is taxed at the short- or long-term rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingTerm {
    Short,
    Long,
    /// Part of the sale falls in each bucket (lot-level estimates).
    Mixed,
}

/// Tax annotation attached to an order by the tax estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaxImpact {
    /// Buys realize nothing.
    NotApplicable,
    /// Realized gain (negative for a loss) and the tax on it at the
    /// applicable rate before netting; negative tax is a benefit.
    Estimated {
        realized_gain: f64,
        tax: f64,
        term: HoldingTerm,
    },
    /// The cost basis is missing, so no figure is presented.
    Unknown { reason: String },
}

/// Why an order exists: the bucket and deviation it closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRationale {
    pub dimension: Dimension,
    pub bucket: String,
    /// Deviation (current − target) of the bucket, in percentage points.
    pub deviation: f64,
    pub reason: String,
}

/// A proposed trade.
///
/// Created by the order generator, reordered by the sequencer and annotated
/// with `estimated_cost` / `estimated_tax` by the estimators. Nothing else
/// writes to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOrder {
    pub instrument_id: String,
    pub side: Side,
    pub quantity: f64,
    pub estimated_price: f64,
    pub estimated_total: f64,
    pub rationale: OrderRationale,
    /// Rank of the bucket this order closes; 0 is the largest deviation.
    pub priority: usize,
    /// Sell realizing a loss against the position's cost basis.
    pub tax_loss_harvest: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_tax: Option<TaxImpact>,
}

impl TradeOrder {
    pub fn is_sell(&self) -> bool {
        self.side == Side::Sell
    }

    pub fn is_buy(&self) -> bool {
        self.side == Side::Buy
    }

    /// Cash effect of the order: positive for sells, negative for buys.
    pub fn cash_flow(&self) -> f64 {
        match self.side {
            Side::Sell => self.estimated_total,
            Side::Buy => -self.estimated_total,
        }
    }
}
