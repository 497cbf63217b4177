//! Bucketing dimensions and target allocations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::position::{InstrumentType, Position};
use crate::error::ConfigurationError;

/// The attribute positions are grouped by when computing weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    #[default]
    Instrument,
    Currency,
    Sector,
    Geography,
    InstrumentType,
}

impl Dimension {
    /// Every dimension, in report order.
    pub const ALL: [Dimension; 5] = [
        Dimension::Instrument,
        Dimension::Currency,
        Dimension::Sector,
        Dimension::Geography,
        Dimension::InstrumentType,
    ];

    /// Dimensions reported as exposure breakdowns (instrument weights are
    /// reported through concentration instead).
    pub const EXPOSURES: [Dimension; 4] = [
        Dimension::Currency,
        Dimension::Sector,
        Dimension::Geography,
        Dimension::InstrumentType,
    ];

    /// The bucket label a position falls into along this dimension.
    pub fn label_of<'a>(&self, position: &'a Position) -> &'a str {
        match self {
            Self::Instrument => &position.instrument_id,
            Self::Currency => &position.currency,
            Self::Sector => &position.sector,
            Self::Geography => &position.geography,
            Self::InstrumentType => position.instrument_type.as_str(),
        }
    }

    /// Canonical form of a caller-supplied bucket label, matching what
    /// classification stores on positions: currencies upper-case, sectors and
    /// geographies lower-case, instrument types parsed, ids trimmed.
    pub fn normalize_label(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        match self {
            Self::Instrument => trimmed.to_string(),
            Self::Currency => trimmed.to_ascii_uppercase(),
            Self::Sector | Self::Geography => trimmed.to_lowercase(),
            Self::InstrumentType => InstrumentType::parse(trimmed).as_str().to_string(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instrument => "instrument",
            Self::Currency => "currency",
            Self::Sector => "sector",
            Self::Geography => "geography",
            Self::InstrumentType => "instrument_type",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default width of the on-target band, in percentage points.
pub const DEFAULT_REBALANCE_BAND: f64 = 1.0;

fn default_band() -> f64 {
    DEFAULT_REBALANCE_BAND
}

/// Desired percentage weight per bucket along one dimension.
///
/// Weights are percentages and must sum to 100 within the tolerance checked
/// by the deviation analyzer; they are never normalized silently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetAllocation {
    #[serde(default)]
    pub dimension: Dimension,
    pub weights: BTreeMap<String, f64>,
    /// Deviations within ± band percentage points count as on target.
    #[serde(default = "default_band")]
    pub band: f64,
}

impl TargetAllocation {
    pub fn new(dimension: Dimension, weights: BTreeMap<String, f64>) -> Self {
        Self {
            dimension,
            weights,
            band: DEFAULT_REBALANCE_BAND,
        }
    }

    /// Convenience constructor from `(label, percent)` pairs.
    pub fn from_pairs<S: Into<String>>(
        dimension: Dimension,
        pairs: impl IntoIterator<Item = (S, f64)>,
    ) -> Self {
        Self::new(
            dimension,
            pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )
    }

    pub fn with_band(mut self, band: f64) -> Self {
        self.band = band;
        self
    }

    /// Sum of all target weights, in percent.
    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn weight_of(&self, label: &str) -> f64 {
        self.weights.get(label).copied().unwrap_or(0.0)
    }

    /// Copy with every label in canonical form for `dimension`.
    ///
    /// Two labels that collapse to the same canonical form are rejected
    /// rather than merged.
    pub fn normalized(&self) -> Result<Self, ConfigurationError> {
        let mut weights = BTreeMap::new();
        for (label, weight) in &self.weights {
            let key = self.dimension.normalize_label(label);
            if weights.insert(key.clone(), *weight).is_some() {
                return Err(ConfigurationError::DuplicateTargetLabel { label: key });
            }
        }
        Ok(Self {
            dimension: self.dimension,
            weights,
            band: self.band,
        })
    }
}
