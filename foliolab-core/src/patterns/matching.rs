//! FIFO lot matching: turns a list of operations into closed round trips.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use super::TradeCategory;
use crate::domain::{Operation, Side};

const QTY_EPSILON: f64 = 1e-9;

/// Long: buys closed by a sell. Short: sells closed by a buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairDirection {
    Long,
    Short,
}

impl PairDirection {
    fn opened_by(side: Side) -> Self {
        match side {
            Side::Buy => Self::Long,
            Side::Sell => Self::Short,
        }
    }
}

/// Quantity still open once every operation is matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenLot {
    pub instrument_id: String,
    pub direction: PairDirection,
    pub opened_on: NaiveDate,
    pub quantity: f64,
    pub price: f64,
}

/// One closing operation matched against the lots it closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePair {
    pub instrument_id: String,
    pub direction: PairDirection,
    /// Date of the earliest lot closed.
    pub opened_on: NaiveDate,
    pub closed_on: NaiveDate,
    pub quantity: f64,
    /// Quantity-weighted entry price of the closed lots.
    pub entry_price: f64,
    pub exit_price: f64,
    /// Quantity-weighted days between each lot's open and the close.
    pub holding_days: f64,
    pub pnl_pct: f64,
    pub pnl: f64,
    pub category: TradeCategory,
}

impl TradePair {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}

#[derive(Debug, Default)]
pub(crate) struct Matched {
    pub pairs: Vec<TradePair>,
    pub open_lots: Vec<OpenLot>,
    pub warnings: Vec<String>,
}

/// Match operations FIFO per instrument.
///
/// Operations are processed by date; the input order breaks ties. A closing
/// operation larger than the open quantity closes everything and opens the
/// remainder in its own direction.
pub(crate) fn match_operations(operations: &[Operation]) -> Matched {
    let mut ordered: Vec<&Operation> = operations.iter().collect();
    ordered.sort_by_key(|op| op.date);

    let mut out = Matched::default();
    let mut books: BTreeMap<&str, VecDeque<OpenLot>> = BTreeMap::new();

    for op in ordered {
        let valid = op.quantity.is_finite()
            && op.quantity > 0.0
            && op.price.is_finite()
            && op.price >= 0.0;
        if !valid {
            out.warnings.push(format!(
                "skipped {} {} on {}: quantity must be positive and price non-negative",
                op.side, op.instrument_id, op.date
            ));
            continue;
        }

        let book = books.entry(op.instrument_id.as_str()).or_default();
        let opening = PairDirection::opened_by(op.side);
        let mut remaining = op.quantity;

        let closes = book.front().is_some_and(|lot| lot.direction != opening);
        if closes {
            let direction = book.front().map(|lot| lot.direction).unwrap_or(opening);
            let mut closed_qty = 0.0;
            let mut entry_notional = 0.0;
            let mut day_weight = 0.0;
            let mut opened_on = op.date;

            while remaining > QTY_EPSILON {
                let Some(lot) = book.front_mut() else { break };
                let take = lot.quantity.min(remaining);
                closed_qty += take;
                entry_notional += take * lot.price;
                day_weight += take * (op.date - lot.opened_on).num_days() as f64;
                opened_on = opened_on.min(lot.opened_on);
                lot.quantity -= take;
                remaining -= take;
                if lot.quantity <= QTY_EPSILON {
                    book.pop_front();
                }
            }

            let entry_price = entry_notional / closed_qty;
            let per_unit = match direction {
                PairDirection::Long => op.price - entry_price,
                PairDirection::Short => entry_price - op.price,
            };
            out.pairs.push(TradePair {
                instrument_id: op.instrument_id.clone(),
                direction,
                opened_on,
                closed_on: op.date,
                quantity: closed_qty,
                entry_price,
                exit_price: op.price,
                holding_days: day_weight / closed_qty,
                pnl_pct: if entry_price > 0.0 {
                    per_unit / entry_price * 100.0
                } else {
                    0.0
                },
                pnl: per_unit * closed_qty,
                category: TradeCategory::Other,
            });
        }

        if remaining > QTY_EPSILON {
            book.push_back(OpenLot {
                instrument_id: op.instrument_id.clone(),
                direction: opening,
                opened_on: op.date,
                quantity: remaining,
                price: op.price,
            });
        }
    }

    out.open_lots = books.into_values().flatten().collect();
    out
}
