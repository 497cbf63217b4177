//! Error taxonomy.
//!
//! Three kinds, each with its own enum so callers can branch on them:
//! - `ValidationError`: malformed input, rejected at the classification boundary.
//! - `ConfigurationError`: invalid targets or options. Fatal, never auto-corrected.
//! - `InsufficientDataError`: not enough data to compute a result at all.
//!
//! Missing cost basis during tax estimation is *not* an error: it produces an
//! `Unknown` tax figure plus a warning on the result record.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Input record rejected before it reaches the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("instrument id is empty")]
    EmptyInstrumentId,
    #[error("{instrument_id}: {field} must be a finite number, got {value}")]
    NotFinite {
        instrument_id: String,
        field: &'static str,
        value: f64,
    },
    #[error("{instrument_id}: {field} must not be negative, got {value}")]
    Negative {
        instrument_id: String,
        field: &'static str,
        value: f64,
    },
    #[error("{instrument_id}: unknown currency code '{code}'")]
    UnknownCurrency { instrument_id: String, code: String },
    #[error("duplicate instrument '{0}' in position set")]
    DuplicateInstrument(String),
    #[error("{instrument_id}: unknown operation side '{side}'")]
    UnknownSide { instrument_id: String, side: String },
    #[error("{instrument_id}: unparseable date '{raw}'")]
    InvalidDate { instrument_id: String, raw: String },
}

/// Invalid configuration supplied by the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("target allocation has no buckets")]
    EmptyTarget,
    #[error("target weights sum to {sum:.2}%, expected 100% ± {tolerance}")]
    TargetSum { sum: f64, tolerance: f64 },
    #[error("target weight for '{label}' is invalid: {weight}")]
    InvalidTargetWeight { label: String, weight: f64 },
    #[error("target label '{label}' appears more than once after normalization")]
    DuplicateTargetLabel { label: String },
    #[error("invalid option '{name}': {reason}")]
    InvalidOption { name: &'static str, reason: String },
}

/// Not enough data to produce a result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InsufficientDataError {
    #[error("no positions supplied")]
    NoPositions,
    #[error("portfolio total value is zero; trades cannot be sized")]
    ZeroTotalValue,
}

/// Coarse classification of an `EngineError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Configuration,
    InsufficientData,
}

/// Any failure the engine surfaces.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("insufficient data: {0}")]
    InsufficientData(#[from] InsufficientDataError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::InsufficientData(_) => ErrorKind::InsufficientData,
        }
    }

    /// Insufficient data is recoverable: the caller may proceed with a
    /// partial result. Everything else must be fixed at the source.
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::InsufficientData
    }
}
