//! Domain types for FolioLab

pub mod allocation;
pub mod operation;
pub mod order;
pub mod position;

pub use allocation::{Dimension, TargetAllocation, DEFAULT_REBALANCE_BAND};
pub use operation::Operation;
pub use order::{HoldingTerm, OrderRationale, Side, TaxImpact, TradeOrder};
pub use position::{InstrumentType, Position, PositionSet, TaxLot, UNKNOWN};
