//! Position — a classified, value-bearing holding and the set that owns it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Label used for any classification the broker did not provide.
pub const UNKNOWN: &str = "unknown";

/// Normalized instrument type (asset class).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentType {
    Stock,
    Bond,
    Etf,
    Fund,
    Currency,
    Future,
    Option,
    Other,
}

impl InstrumentType {
    /// Map a broker-provided type string onto the normalized set.
    ///
    /// Anything unrecognized becomes `Other` rather than an error.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "stock" | "share" | "shares" | "equity" => Self::Stock,
            "bond" | "bonds" => Self::Bond,
            "etf" => Self::Etf,
            "fund" | "mutual_fund" => Self::Fund,
            "currency" | "cash" => Self::Currency,
            "future" | "futures" => Self::Future,
            "option" | "options" => Self::Option,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Bond => "bond",
            Self::Etf => "etf",
            Self::Fund => "fund",
            Self::Currency => "currency",
            Self::Future => "future",
            Self::Option => "option",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single acquisition lot, used for lot-level tax estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxLot {
    pub quantity: f64,
    pub unit_cost: f64,
    pub acquired_on: NaiveDate,
}

/// A classified position.
///
/// Constructed through `classify` at the input boundary, so every field here
/// already satisfies the non-negativity invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub quantity: f64,
    pub current_price: f64,
    /// `None` when the broker has no cost basis for the holding.
    pub average_price: Option<f64>,
    pub currency: String,
    pub sector: String,
    pub geography: String,
    pub instrument_type: InstrumentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquired_on: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lots: Vec<TaxLot>,
}

impl Position {
    /// A bare stock position in USD with unknown classifications.
    pub fn new(instrument_id: impl Into<String>, quantity: f64, current_price: f64) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            name: None,
            quantity,
            current_price,
            average_price: None,
            currency: "USD".into(),
            sector: UNKNOWN.into(),
            geography: UNKNOWN.into(),
            instrument_type: InstrumentType::Stock,
            acquired_on: None,
            lots: Vec::new(),
        }
    }

    pub fn with_average_price(mut self, average_price: f64) -> Self {
        self.average_price = Some(average_price);
        self
    }

    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = sector.into();
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_geography(mut self, geography: impl Into<String>) -> Self {
        self.geography = geography.into();
        self
    }

    pub fn with_instrument_type(mut self, instrument_type: InstrumentType) -> Self {
        self.instrument_type = instrument_type;
        self
    }

    pub fn with_acquired_on(mut self, date: NaiveDate) -> Self {
        self.acquired_on = Some(date);
        self
    }

    pub fn with_lots(mut self, lots: Vec<TaxLot>) -> Self {
        self.lots = lots;
        self
    }

    /// Market value: `quantity × current_price`.
    pub fn value(&self) -> f64 {
        self.quantity * self.current_price
    }

    /// Total acquisition cost, when the average price is known.
    pub fn cost_basis(&self) -> Option<f64> {
        self.average_price.map(|avg| self.quantity * avg)
    }

    /// `value − quantity × average_price`, or `None` without a cost basis.
    pub fn unrealized_pnl(&self) -> Option<f64> {
        self.cost_basis().map(|cost| self.value() - cost)
    }

    /// Unrealized P&L as a percentage of cost basis.
    pub fn unrealized_pnl_pct(&self) -> Option<f64> {
        let cost = self.cost_basis()?;
        if cost <= 0.0 {
            return None;
        }
        self.unrealized_pnl().map(|pnl| pnl / cost * 100.0)
    }

    pub fn has_cost_basis(&self) -> bool {
        self.average_price.is_some()
    }

    /// True when the position currently trades below its average cost.
    pub fn is_at_loss(&self) -> bool {
        self.average_price
            .is_some_and(|avg| self.current_price < avg)
    }
}

/// Ordered collection of positions, unique by instrument id.
///
/// Insertion order is preserved; it is the order every downstream report
/// walks when no explicit sort applies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Position>", into = "Vec<Position>")]
pub struct PositionSet {
    positions: Vec<Position>,
}

impl PositionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set, rejecting duplicate instrument ids.
    pub fn from_positions(positions: Vec<Position>) -> Result<Self, ValidationError> {
        let mut set = Self::new();
        for position in positions {
            set.insert(position)?;
        }
        Ok(set)
    }

    /// Append a position. Fails if the instrument is already present.
    pub fn insert(&mut self, position: Position) -> Result<(), ValidationError> {
        if self.contains(&position.instrument_id) {
            return Err(ValidationError::DuplicateInstrument(position.instrument_id));
        }
        self.positions.push(position);
        Ok(())
    }

    pub fn contains(&self, instrument_id: &str) -> bool {
        self.get(instrument_id).is_some()
    }

    pub fn get(&self, instrument_id: &str) -> Option<&Position> {
        self.positions
            .iter()
            .find(|p| p.instrument_id == instrument_id)
    }

    pub fn get_mut(&mut self, instrument_id: &str) -> Option<&mut Position> {
        self.positions
            .iter_mut()
            .find(|p| p.instrument_id == instrument_id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Position> {
        self.positions.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Position> {
        self.positions.iter_mut()
    }

    pub fn as_slice(&self) -> &[Position] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Sum of member values. An empty set is worth 0.
    pub fn total_value(&self) -> f64 {
        self.positions.iter().map(Position::value).sum()
    }
}

impl TryFrom<Vec<Position>> for PositionSet {
    type Error = ValidationError;

    fn try_from(positions: Vec<Position>) -> Result<Self, Self::Error> {
        Self::from_positions(positions)
    }
}

impl From<PositionSet> for Vec<Position> {
    fn from(set: PositionSet) -> Self {
        set.positions
    }
}

impl<'a> IntoIterator for &'a PositionSet {
    type Item = &'a Position;
    type IntoIter = std::slice::Iter<'a, Position>;

    fn into_iter(self) -> Self::IntoIter {
        self.positions.iter()
    }
}
