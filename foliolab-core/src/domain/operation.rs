//! Historical trading operations (input to the pattern recognizer).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::order::Side;

/// A validated historical buy or sell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub instrument_id: String,
    pub side: Side,
    pub date: NaiveDate,
    pub quantity: f64,
    pub price: f64,
}

impl Operation {
    pub fn new(
        instrument_id: impl Into<String>,
        side: Side,
        date: NaiveDate,
        quantity: f64,
        price: f64,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            side,
            date,
            quantity,
            price,
        }
    }

    pub fn notional(&self) -> f64 {
        self.quantity * self.price
    }
}
