//! Rebalancing plan assembly.
//!
//! `build_plan` runs the whole pipeline:
//! analyze → generate → sequence → estimate costs and taxes → annotate.
//! The resulting plan is immutable apart from its status, which only moves
//! out of `Draft` once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

use crate::costs::{
    annotate, estimate_tax_impact, estimate_transaction_costs, CostBreakdown, CostModel, TaxEstimate,
    TaxRates,
};
use crate::deviation::{self, DeviationAnalysis};
use crate::domain::{PositionSet, TargetAllocation, TradeOrder};
use crate::error::{EngineError, InsufficientDataError};
use crate::fingerprint::InputHash;
use crate::orders::{generate_from_analysis, RebalanceOptions, RebalanceStrategy};
use crate::sequencer;

/// Everything besides positions and target that shapes a plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanSettings {
    pub options: RebalanceOptions,
    pub costs: CostModel,
    pub taxes: TaxRates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Draft,
    Approved,
    Rejected,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => f.write_str("draft"),
            Self::Approved => f.write_str("approved"),
            Self::Rejected => f.write_str("rejected"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("plan {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: PlanStatus,
        to: PlanStatus,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub trade_count: usize,
    pub buy_value: f64,
    pub sell_value: f64,
    /// Sell proceeds minus buy cost.
    pub net_cash_flow: f64,
    pub transaction_cost: f64,
    /// Known tax liability only; see `TaxEstimate::status`.
    pub tax_liability: f64,
    /// `transaction_cost + tax_liability`.
    pub net_cost: f64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalancingPlan {
    id: InputHash,
    strategy: RebalanceStrategy,
    target: TargetAllocation,
    analysis: DeviationAnalysis,
    orders: Vec<TradeOrder>,
    costs: CostBreakdown,
    taxes: TaxEstimate,
    summary: PlanSummary,
    status: PlanStatus,
    created_at: DateTime<Utc>,
}

impl RebalancingPlan {
    pub fn id(&self) -> &InputHash {
        &self.id
    }

    pub fn strategy(&self) -> RebalanceStrategy {
        self.strategy
    }

    pub fn target(&self) -> &TargetAllocation {
        &self.target
    }

    pub fn analysis(&self) -> &DeviationAnalysis {
        &self.analysis
    }

    /// Orders in execution sequence, annotated with cost and tax.
    pub fn orders(&self) -> &[TradeOrder] {
        &self.orders
    }

    pub fn costs(&self) -> &CostBreakdown {
        &self.costs
    }

    pub fn taxes(&self) -> &TaxEstimate {
        &self.taxes
    }

    pub fn summary(&self) -> &PlanSummary {
        &self.summary
    }

    pub fn status(&self) -> PlanStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn approve(&mut self) -> Result<(), PlanError> {
        self.transition(PlanStatus::Approved)
    }

    pub fn reject(&mut self) -> Result<(), PlanError> {
        self.transition(PlanStatus::Rejected)
    }

    fn transition(&mut self, to: PlanStatus) -> Result<(), PlanError> {
        if self.status != PlanStatus::Draft {
            return Err(PlanError::InvalidTransition {
                id: self.id.short().to_string(),
                from: self.status,
                to,
            });
        }
        info!(plan = %self.id.short(), status = %to, "plan status changed");
        self.status = to;
        Ok(())
    }
}

pub fn build_plan(
    positions: &PositionSet,
    target: &TargetAllocation,
    settings: &PlanSettings,
) -> Result<RebalancingPlan, EngineError> {
    build_plan_at(positions, target, settings, Utc::now())
}

/// Like [`build_plan`] with an explicit clock; holding periods for tax terms
/// are measured up to `now`, and its date is part of the plan id.
pub fn build_plan_at(
    positions: &PositionSet,
    target: &TargetAllocation,
    settings: &PlanSettings,
    now: DateTime<Utc>,
) -> Result<RebalancingPlan, EngineError> {
    settings.options.validate()?;
    settings.costs.validate()?;
    settings.taxes.validate()?;
    if positions.is_empty() {
        return Err(InsufficientDataError::NoPositions.into());
    }

    let target = target.normalized()?;
    let analysis = deviation::analyze(positions, &target)?;
    let generated = generate_from_analysis(positions, &analysis, &settings.options, &settings.costs)?;
    let orders = sequencer::optimize(generated.orders);
    let costs = estimate_transaction_costs(&orders, &settings.costs);
    let taxes = estimate_tax_impact(&orders, positions, &settings.taxes, now.date_naive());
    let orders = annotate(orders, &costs, &taxes);

    let mut warnings = generated.warnings;
    warnings.extend(taxes.warnings.iter().cloned());

    let buy_value: f64 = orders.iter().filter(|o| o.is_buy()).map(|o| o.estimated_total).sum();
    let sell_value: f64 = orders.iter().filter(|o| o.is_sell()).map(|o| o.estimated_total).sum();
    let summary = PlanSummary {
        trade_count: orders.len(),
        buy_value,
        sell_value,
        net_cash_flow: sell_value - buy_value,
        transaction_cost: costs.total_cost,
        tax_liability: taxes.total_liability,
        net_cost: costs.total_cost + taxes.total_liability,
        warnings,
    };

    let id = InputHash::rebalance_key(positions, &target, settings, now.date_naive());
    debug!(
        plan = %id.short(),
        trades = summary.trade_count,
        net_cost = summary.net_cost,
        "plan built"
    );

    Ok(RebalancingPlan {
        id,
        strategy: settings.options.strategy,
        target,
        analysis,
        orders,
        costs,
        taxes,
        summary,
        status: PlanStatus::Draft,
        created_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Dimension, Position};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn plan() -> RebalancingPlan {
        let positions = PositionSet::from_positions(vec![
            Position::new("A", 10.0, 100.0).with_average_price(80.0),
            Position::new("B", 5.0, 200.0).with_average_price(200.0),
        ])
        .unwrap();
        let target = TargetAllocation::from_pairs(Dimension::Instrument, [("A", 30.0), ("B", 70.0)]);
        build_plan_at(&positions, &target, &PlanSettings::default(), now()).unwrap()
    }

    #[test]
    fn plan_runs_full_pipeline() {
        let p = plan();
        assert_eq!(p.status(), PlanStatus::Draft);
        assert_eq!(p.orders().len(), 2);
        assert!(p.orders()[0].is_sell());
        assert!(p.orders().iter().all(|o| o.estimated_cost.is_some() && o.estimated_tax.is_some()));
        let s = p.summary();
        assert_eq!(s.sell_value, 400.0);
        assert_eq!(s.buy_value, 400.0);
        assert_eq!(s.net_cash_flow, 0.0);
        // Sell 4 A at 100 with cost 80: gain 80, short-term 30%.
        assert!((s.tax_liability - 24.0).abs() < 1e-9);
        assert!((s.net_cost - (s.transaction_cost + s.tax_liability)).abs() < 1e-12);
        assert_eq!(p.created_at(), now());
    }

    #[test]
    fn plan_id_is_deterministic() {
        assert_eq!(plan().id(), plan().id());
    }

    #[test]
    fn valuation_date_decides_holding_term() {
        let acquired = chrono::NaiveDate::from_ymd_opt(2023, 6, 15).unwrap();
        let positions = PositionSet::from_positions(vec![
            Position::new("A", 10.0, 100.0)
                .with_average_price(80.0)
                .with_acquired_on(acquired),
            Position::new("B", 5.0, 200.0).with_average_price(200.0),
        ])
        .unwrap();
        let target = TargetAllocation::from_pairs(Dimension::Instrument, [("A", 30.0), ("B", 70.0)]);
        let later = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();

        let short = build_plan_at(&positions, &target, &PlanSettings::default(), now()).unwrap();
        let long = build_plan_at(&positions, &target, &PlanSettings::default(), later).unwrap();

        // Gain of 80 on the 4 A sold: 30% before the one-year mark, 15% after.
        assert!((short.summary().tax_liability - 24.0).abs() < 1e-9);
        assert!((long.summary().tax_liability - 12.0).abs() < 1e-9);
        assert_ne!(short.id(), long.id());
    }

    #[test]
    fn plan_keeps_target_in_canonical_form() {
        let positions = PositionSet::from_positions(vec![
            Position::new("A", 10.0, 100.0).with_sector("tech"),
            Position::new("B", 10.0, 100.0).with_sector("energy"),
        ])
        .unwrap();
        let mixed = TargetAllocation::from_pairs(Dimension::Sector, [("Tech", 50.0), ("ENERGY", 50.0)]);
        let plain = TargetAllocation::from_pairs(Dimension::Sector, [("tech", 50.0), ("energy", 50.0)]);
        let p = build_plan_at(&positions, &mixed, &PlanSettings::default(), now()).unwrap();
        assert!(p.orders().is_empty());
        assert_eq!(p.target().weight_of("tech"), 50.0);
        let q = build_plan_at(&positions, &plain, &PlanSettings::default(), now()).unwrap();
        assert_eq!(p.id(), q.id());
    }

    #[test]
    fn status_moves_out_of_draft_once() {
        let mut p = plan();
        p.approve().unwrap();
        assert_eq!(p.status(), PlanStatus::Approved);
        assert!(matches!(p.reject(), Err(PlanError::InvalidTransition { .. })));
        assert!(p.approve().is_err());

        let mut q = plan();
        q.reject().unwrap();
        assert_eq!(q.status(), PlanStatus::Rejected);
        assert!(q.approve().is_err());
    }

    #[test]
    fn empty_positions_is_insufficient_data() {
        let target = TargetAllocation::from_pairs(Dimension::Instrument, [("A", 100.0)]);
        let err = build_plan_at(&PositionSet::new(), &target, &PlanSettings::default(), now()).unwrap_err();
        assert!(err.is_recoverable());
    }
}
