//! FolioLab Core — portfolio analytics and rebalancing engine.
//!
//! This crate contains the pure, deterministic part of the system:
//! - Domain types (positions, target allocations, trade orders, operations)
//! - Input classification with validation at the boundary
//! - Portfolio metrics (exposures, HHI, concentration, diversification)
//! - What-if scenarios over a position set
//! - Deviation analysis, order generation and sequencing
//! - Transaction cost and capital gains tax estimation
//! - Rebalancing plan assembly with a draft → approved/rejected lifecycle
//! - Trading pattern recognition over historical operations
//! - Content fingerprints for plan ids and memoization

pub mod classify;
pub mod costs;
pub mod deviation;
pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod metrics;
pub mod orders;
pub mod patterns;
pub mod plan;
pub mod scenario;
pub mod sequencer;

pub use classify::{classify, classify_all, classify_operation, classify_operations, RawOperation, RawPosition};
pub use costs::{
    estimate_tax_impact, estimate_transaction_costs, CostBreakdown, CostModel, TaxEstimate,
    TaxRates, TaxStatus,
};
pub use deviation::{Deviation, DeviationAnalysis, DeviationDirection};
pub use error::{ConfigurationError, EngineError, ErrorKind, InsufficientDataError, ValidationError};
pub use fingerprint::InputHash;
pub use metrics::{ConcentrationRisk, ExposureBucket, PortfolioMetrics};
pub use orders::{Candidate, GeneratedOrders, RebalanceOptions, RebalanceStrategy};
pub use patterns::{PatternAnalysis, PatternDetectionConfig, PatternDetector, TradeCategory, TradePair};
pub use plan::{build_plan, build_plan_at, PlanError, PlanSettings, PlanStatus, RebalancingPlan};
pub use scenario::{PortfolioSnapshot, ScenarioChange, ScenarioResult};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: every public record type is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::PositionSet>();
        require_sync::<domain::PositionSet>();
        require_send::<domain::TargetAllocation>();
        require_sync::<domain::TargetAllocation>();
        require_send::<domain::TradeOrder>();
        require_sync::<domain::TradeOrder>();
        require_send::<domain::Operation>();
        require_sync::<domain::Operation>();

        // Results
        require_send::<PortfolioMetrics>();
        require_sync::<PortfolioMetrics>();
        require_send::<ScenarioResult>();
        require_sync::<ScenarioResult>();
        require_send::<DeviationAnalysis>();
        require_sync::<DeviationAnalysis>();
        require_send::<CostBreakdown>();
        require_sync::<CostBreakdown>();
        require_send::<TaxEstimate>();
        require_sync::<TaxEstimate>();
        require_send::<RebalancingPlan>();
        require_sync::<RebalancingPlan>();
        require_send::<PatternAnalysis>();
        require_sync::<PatternAnalysis>();

        // Configuration
        require_send::<PlanSettings>();
        require_sync::<PlanSettings>();
        require_send::<PatternDetectionConfig>();
        require_sync::<PatternDetectionConfig>();

        // Errors
        require_send::<EngineError>();
        require_sync::<EngineError>();
        require_send::<PlanError>();
        require_sync::<PlanError>();

        // Detectors are shared across threads as trait objects.
        require_send::<Box<dyn PatternDetector>>();
        require_sync::<Box<dyn PatternDetector>>();
    }

    /// Scenario application must not mutate its input.
    #[test]
    fn scenario_leaves_input_untouched() {
        let positions =
            domain::PositionSet::from_positions(vec![domain::Position::new("A", 10.0, 100.0)])
                .unwrap();
        let before = positions.clone();
        let _ = scenario::apply(
            &positions,
            &[ScenarioChange::PriceChange {
                instrument_id: "A".into(),
                pct: -50.0,
            }],
            0.0,
        );
        assert_eq!(positions, before);
    }
}
