//! Pattern detectors: each one recognises a single trade category.

use super::{PatternDetectionConfig, TradeCategory, TradePair};

/// Recognises one category of closed trade.
///
/// Detectors run in a fixed order and the first match wins, so a detector
/// may assume every earlier one already rejected the pair.
pub trait PatternDetector: Send + Sync {
    fn category(&self) -> TradeCategory;
    fn matches(&self, pair: &TradePair, config: &PatternDetectionConfig) -> bool;
}

/// Large loss realized shortly after opening.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicSellDetector;

impl PatternDetector for PanicSellDetector {
    fn category(&self) -> TradeCategory {
        TradeCategory::PanicSell
    }

    fn matches(&self, pair: &TradePair, config: &PatternDetectionConfig) -> bool {
        pair.pnl_pct <= -config.panic_loss_pct && pair.holding_days <= f64::from(config.quick_sell_days)
    }
}

/// Profit taken at target, or a loss cut within the stop, after a
/// considered holding period.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategicDetector;

impl PatternDetector for StrategicDetector {
    fn category(&self) -> TradeCategory {
        TradeCategory::Strategic
    }

    fn matches(&self, pair: &TradePair, config: &PatternDetectionConfig) -> bool {
        if pair.holding_days < f64::from(config.min_holding_days) {
            return false;
        }
        let took_profit = pair.pnl_pct >= config.take_profit_pct;
        let cut_loss = pair.pnl_pct < 0.0 && pair.pnl_pct >= -config.stop_loss_pct;
        took_profit || cut_loss
    }
}

/// Closed before the minimum holding period.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImpulsiveDetector;

impl PatternDetector for ImpulsiveDetector {
    fn category(&self) -> TradeCategory {
        TradeCategory::Impulsive
    }

    fn matches(&self, pair: &TradePair, config: &PatternDetectionConfig) -> bool {
        pair.holding_days < f64::from(config.min_holding_days)
    }
}

/// Panic sell, then strategic, then impulsive.
pub fn default_detectors() -> Vec<Box<dyn PatternDetector>> {
    vec![
        Box::new(PanicSellDetector),
        Box::new(StrategicDetector),
        Box::new(ImpulsiveDetector),
    ]
}

/// Category of the first matching detector, `Other` when none matches.
pub fn classify(
    pair: &TradePair,
    config: &PatternDetectionConfig,
    detectors: &[Box<dyn PatternDetector>],
) -> TradeCategory {
    detectors
        .iter()
        .find(|d| d.matches(pair, config))
        .map(|d| d.category())
        .unwrap_or(TradeCategory::Other)
}
