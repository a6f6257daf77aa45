/// position.rs — Open position and closed-trade records
use serde::{Deserialize, Serialize};

/// An open position. Signed quantity: positive = long, negative = short.
/// Never mutated in place after entry; replaced wholesale on exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub code: String,
    pub exchange: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub entry_date: i64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Commission paid at entry, carried so exit pnl can subtract both legs.
    pub entry_commission: f64,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub code: String,
    pub exchange: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_date: i64,
    pub exit_date: i64,
    pub pnl: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: i64,
    pub equity: f64,
}
