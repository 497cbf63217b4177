//! Trade sequencer.
//!
//! Orders are reordered, never changed: sells first so their proceeds fund
//! the buys, harvesting sells ahead of other sells, then by size.

use std::cmp::Ordering;

use crate::domain::{Side, TradeOrder};

/// Stable execution order for `orders`.
pub fn optimize(mut orders: Vec<TradeOrder>) -> Vec<TradeOrder> {
    orders.sort_by(execution_order);
    orders
}

fn execution_order(a: &TradeOrder, b: &TradeOrder) -> Ordering {
    side_rank(a.side)
        .cmp(&side_rank(b.side))
        .then_with(|| b.tax_loss_harvest.cmp(&a.tax_loss_harvest))
        .then_with(|| b.estimated_total.total_cmp(&a.estimated_total))
}

fn side_rank(side: Side) -> u8 {
    match side {
        Side::Sell => 0,
        Side::Buy => 1,
    }
}

/// Cash balance after each order, starting from `starting_cash`.
pub fn cash_path(orders: &[TradeOrder], starting_cash: f64) -> Vec<f64> {
    orders
        .iter()
        .scan(starting_cash, |cash, o| {
            *cash += o.cash_flow();
            Some(*cash)
        })
        .collect()
}

/// Lowest cash balance reached while executing `orders` in sequence.
pub fn min_running_cash(orders: &[TradeOrder], starting_cash: f64) -> f64 {
    cash_path(orders, starting_cash)
        .into_iter()
        .fold(starting_cash, f64::min)
}
