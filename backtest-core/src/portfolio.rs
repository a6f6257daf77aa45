/// portfolio.rs — Cash, open positions, closed-trade log, equity curve
///
/// Invariant: `cash + sum(|qty_i| * price_i) == total_equity(price_map)` at
/// all times (within floating-point tolerance); no two open positions share
/// a code; `positions.len() <= max_positions` is checked at entry time by
/// the execution layer, not here.
use std::collections::HashMap;

use crate::position::{ClosedTrade, EquityPoint, Position};

#[derive(Debug, Clone)]
pub struct Portfolio {
    pub cash: f64,
    pub positions: HashMap<String, Position>,
    pub closed_trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            cash: initial_capital,
            positions: HashMap::new(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    /// cash + sum over open positions of |qty| * price_map[code]. Positions
    /// whose code is absent from `price_map` contribute nothing (their last
    /// known close does not change the accounting key).
    pub fn total_equity(&self, price_map: &HashMap<String, f64>) -> f64 {
        let mark_to_market: f64 = self
            .positions
            .values()
            .filter_map(|p| price_map.get(&p.code).map(|px| p.quantity.abs() * px))
            .sum();
        self.cash + mark_to_market
    }

    pub fn record_equity(&mut self, date: i64, equity: f64) {
        self.equity_curve.push(EquityPoint { date, equity });
    }

    pub fn has_position(&self, code: &str) -> bool {
        self.positions.contains_key(code)
    }
}
