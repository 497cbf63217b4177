//! Trading pattern recognizer.
//!
//! Stateless: `analyze` takes a list of historical operations, pairs them
//! FIFO per instrument, classifies every closed pair and aggregates the
//! result into a behavioural risk score.

pub mod detectors;
pub mod matching;

pub use detectors::{
    classify, default_detectors, ImpulsiveDetector, PanicSellDetector, PatternDetector,
    StrategicDetector,
};
pub use matching::{OpenLot, PairDirection, TradePair};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

use crate::domain::Operation;
use crate::error::ConfigurationError;

/// Thresholds used by the default detectors. Percentages and days.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternDetectionConfig {
    pub panic_loss_pct: f64,
    pub quick_sell_days: u32,
    pub take_profit_pct: f64,
    pub min_holding_days: u32,
    pub stop_loss_pct: f64,
}

impl Default for PatternDetectionConfig {
    fn default() -> Self {
        Self {
            panic_loss_pct: 10.0,
            quick_sell_days: 7,
            take_profit_pct: 15.0,
            min_holding_days: 30,
            stop_loss_pct: 10.0,
        }
    }
}

impl PatternDetectionConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, value) in [
            ("panic_loss_pct", self.panic_loss_pct),
            ("take_profit_pct", self.take_profit_pct),
            ("stop_loss_pct", self.stop_loss_pct),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigurationError::InvalidOption {
                    name,
                    reason: format!("must be a positive percentage, got {value}"),
                });
            }
        }
        if self.min_holding_days == 0 {
            return Err(ConfigurationError::InvalidOption {
                name: "min_holding_days",
                reason: "must be at least one day".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeCategory {
    PanicSell,
    Strategic,
    Impulsive,
    Other,
}

impl TradeCategory {
    pub const ALL: [TradeCategory; 4] = [
        TradeCategory::PanicSell,
        TradeCategory::Strategic,
        TradeCategory::Impulsive,
        TradeCategory::Other,
    ];
}

impl fmt::Display for TradeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PanicSell => f.write_str("panic_sell"),
            Self::Strategic => f.write_str("strategic"),
            Self::Impulsive => f.write_str("impulsive"),
            Self::Other => f.write_str("other"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub count: usize,
    /// Percent of all closed pairs.
    pub share_pct: f64,
    pub avg_pnl_pct: f64,
    pub avg_holding_days: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => f.write_str("low"),
            Self::Medium => f.write_str("medium"),
            Self::High => f.write_str("high"),
        }
    }
}

/// Score ≥ 60 is high risk, ≥ 30 medium.
pub fn risk_level(score: f64) -> RiskLevel {
    if score >= 60.0 {
        RiskLevel::High
    } else if score >= 30.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAnalysis {
    pub pairs: Vec<TradePair>,
    /// Every category is present, with zeroed stats when unused.
    pub categories: BTreeMap<TradeCategory, CategoryStats>,
    pub pair_count: usize,
    /// Percent of pairs closed at a profit.
    pub win_rate: f64,
    pub avg_pnl_pct: f64,
    pub open_lots: Vec<OpenLot>,
    /// `100 × (panic + 0.5 × impulsive) / pairs`, 0 without pairs.
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub warnings: Vec<String>,
}

impl PatternAnalysis {
    pub fn count_of(&self, category: TradeCategory) -> usize {
        self.categories.get(&category).map(|s| s.count).unwrap_or(0)
    }
}

/// Analyze with the default detector chain.
pub fn analyze(operations: &[Operation], config: &PatternDetectionConfig) -> PatternAnalysis {
    analyze_with(operations, config, &default_detectors())
}

/// Analyze with a caller-supplied, ordered detector chain.
pub fn analyze_with(
    operations: &[Operation],
    config: &PatternDetectionConfig,
    detectors: &[Box<dyn PatternDetector>],
) -> PatternAnalysis {
    let matched = matching::match_operations(operations);
    for w in &matched.warnings {
        warn!("{w}");
    }

    let pairs: Vec<TradePair> = matched
        .pairs
        .into_iter()
        .map(|mut pair| {
            pair.category = classify(&pair, config, detectors);
            pair
        })
        .collect();

    let pair_count = pairs.len();
    let mut categories: BTreeMap<TradeCategory, CategoryStats> = TradeCategory::ALL
        .iter()
        .map(|c| (*c, CategoryStats::default()))
        .collect();
    for category in TradeCategory::ALL {
        let members: Vec<&TradePair> = pairs.iter().filter(|p| p.category == category).collect();
        if members.is_empty() {
            continue;
        }
        let n = members.len() as f64;
        categories.insert(
            category,
            CategoryStats {
                count: members.len(),
                share_pct: n / pair_count as f64 * 100.0,
                avg_pnl_pct: members.iter().map(|p| p.pnl_pct).sum::<f64>() / n,
                avg_holding_days: members.iter().map(|p| p.holding_days).sum::<f64>() / n,
            },
        );
    }

    let (win_rate, avg_pnl_pct, risk_score) = if pair_count == 0 {
        (0.0, 0.0, 0.0)
    } else {
        let n = pair_count as f64;
        let wins = pairs.iter().filter(|p| p.is_win()).count() as f64;
        let panic = categories[&TradeCategory::PanicSell].count as f64;
        let impulsive = categories[&TradeCategory::Impulsive].count as f64;
        (
            wins / n * 100.0,
            pairs.iter().map(|p| p.pnl_pct).sum::<f64>() / n,
            (100.0 * (panic + 0.5 * impulsive) / n).clamp(0.0, 100.0),
        )
    };

    debug!(
        operations = operations.len(),
        pairs = pair_count,
        open_lots = matched.open_lots.len(),
        risk_score,
        "pattern analysis complete"
    );

    PatternAnalysis {
        pairs,
        categories,
        pair_count,
        win_rate,
        avg_pnl_pct,
        open_lots: matched.open_lots,
        risk_score,
        risk_level: risk_level(risk_score),
        warnings: matched.warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;
    use chrono::NaiveDate;

    fn day(n: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(n)
    }

    #[test]
    fn risk_level_thresholds() {
        assert_eq!(risk_level(60.0), RiskLevel::High);
        assert_eq!(risk_level(59.9), RiskLevel::Medium);
        assert_eq!(risk_level(30.0), RiskLevel::Medium);
        assert_eq!(risk_level(29.9), RiskLevel::Low);
    }

    #[test]
    fn empty_history_is_low_risk() {
        let a = analyze(&[], &PatternDetectionConfig::default());
        assert_eq!(a.pair_count, 0);
        assert_eq!(a.risk_score, 0.0);
        assert_eq!(a.risk_level, RiskLevel::Low);
        assert_eq!(a.categories.len(), 4);
    }

    #[test]
    fn risk_score_weights_impulsive_half() {
        let ops = vec![
            // panic: -20% after 2 days
            Operation::new("A", Side::Buy, day(0), 1.0, 100.0),
            Operation::new("A", Side::Sell, day(2), 1.0, 80.0),
            // impulsive: +2% after 5 days
            Operation::new("B", Side::Buy, day(0), 1.0, 100.0),
            Operation::new("B", Side::Sell, day(5), 1.0, 102.0),
            // strategic: +20% after 60 days
            Operation::new("C", Side::Buy, day(0), 1.0, 100.0),
            Operation::new("C", Side::Sell, day(60), 1.0, 120.0),
            // other: +5% after 60 days
            Operation::new("D", Side::Buy, day(0), 1.0, 100.0),
            Operation::new("D", Side::Sell, day(60), 1.0, 105.0),
        ];
        let a = analyze(&ops, &PatternDetectionConfig::default());
        assert_eq!(a.pair_count, 4);
        assert_eq!(a.count_of(TradeCategory::PanicSell), 1);
        assert_eq!(a.count_of(TradeCategory::Impulsive), 1);
        assert_eq!(a.count_of(TradeCategory::Strategic), 1);
        assert_eq!(a.count_of(TradeCategory::Other), 1);
        // 100 × (1 + 0.5) / 4
        assert!((a.risk_score - 37.5).abs() < 1e-9);
        assert_eq!(a.risk_level, RiskLevel::Medium);
        assert!((a.win_rate - 75.0).abs() < 1e-9);
        assert!((a.categories[&TradeCategory::PanicSell].share_pct - 25.0).abs() < 1e-9);
    }

    #[test]
    fn config_rejects_zero_thresholds() {
        let cfg = PatternDetectionConfig {
            panic_loss_pct: 0.0,
            ..PatternDetectionConfig::default()
        };
        assert!(cfg.validate().is_err());
        assert!(PatternDetectionConfig::default().validate().is_ok());
    }
}
