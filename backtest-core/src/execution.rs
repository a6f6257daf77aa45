/// execution.rs — Price/quantity/commission arithmetic and stateful entry/exit/trigger operations
///
/// The arithmetic helpers (`commission`, `slippage`, `quantity`) are pure.
/// `enter_long`/`enter_short`/`exit_position`/`check_triggers` mutate a
/// `Portfolio` in place and return a `CoreResult<()>` (or a count, for
/// triggers) — pre-condition failures are routine control flow
/// (`CoreError::ExecutionFailed`) and must not abort the surrounding
/// backtest loop.
use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};
use crate::portfolio::Portfolio;
use crate::position::{ClosedTrade, Position};

pub fn commission(trade_value: f64, flat: f64, pct: f64) -> f64 {
    flat + trade_value * pct / 100.0
}

/// `up = true` slips the price upward (paying more on entry); `up = false`
/// slips it downward (receiving less on exit).
pub fn slippage(price: f64, pct: f64, up: bool) -> f64 {
    if up {
        price * (1.0 + pct / 100.0)
    } else {
        price * (1.0 - pct / 100.0)
    }
}

/// Floor of available_cash / exec_price; 0 if either argument is non-positive.
pub fn quantity(available_cash: f64, exec_price: f64) -> f64 {
    if exec_price <= 0.0 || available_cash <= 0.0 {
        return 0.0;
    }
    (available_cash / exec_price).floor()
}

#[allow(clippy::too_many_arguments)]
pub fn enter_long(
    portfolio: &mut Portfolio,
    code: &str,
    exchange: &str,
    close: f64,
    date: i64,
    pos_size: f64,
    sl_pct: f64,
    tp_pct: f64,
    max_positions: usize,
    flat: f64,
    pct: f64,
    slip: f64,
) -> CoreResult<()> {
    if portfolio.positions.len() >= max_positions {
        return Err(CoreError::ExecutionFailed("max_positions reached".into()));
    }
    if portfolio.has_position(code) {
        return Err(CoreError::ExecutionFailed(format!("position already open for {code}")));
    }

    let exec = slippage(close, slip, true);
    let available = portfolio.cash * pos_size;
    let qty = quantity(available, exec);
    if qty == 0.0 {
        return Err(CoreError::ExecutionFailed("zero quantity at available cash".into()));
    }

    let trade_value = qty * exec;
    let comm = commission(trade_value, flat, pct);
    portfolio.cash -= trade_value + comm;

    portfolio.positions.insert(
        code.to_string(),
        Position {
            code: code.to_string(),
            exchange: exchange.to_string(),
            quantity: qty,
            entry_price: exec,
            entry_date: date,
            stop_loss: if sl_pct > 0.0 { exec * (1.0 - sl_pct / 100.0) } else { 0.0 },
            take_profit: if tp_pct > 0.0 { exec * (1.0 + tp_pct / 100.0) } else { 0.0 },
            entry_commission: comm,
        },
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn enter_short(
    portfolio: &mut Portfolio,
    code: &str,
    exchange: &str,
    close: f64,
    date: i64,
    pos_size: f64,
    sl_pct: f64,
    tp_pct: f64,
    max_positions: usize,
    flat: f64,
    pct: f64,
    slip: f64,
) -> CoreResult<()> {
    if portfolio.positions.len() >= max_positions {
        return Err(CoreError::ExecutionFailed("max_positions reached".into()));
    }
    if portfolio.has_position(code) {
        return Err(CoreError::ExecutionFailed(format!("position already open for {code}")));
    }

    let exec = slippage(close, slip, false);
    let available = portfolio.cash * pos_size;
    let qty = quantity(available, exec);
    if qty == 0.0 {
        return Err(CoreError::ExecutionFailed("zero quantity at available cash".into()));
    }

    let trade_value = qty * exec;
    let comm = commission(trade_value, flat, pct);
    portfolio.cash += trade_value - comm;

    portfolio.positions.insert(
        code.to_string(),
        Position {
            code: code.to_string(),
            exchange: exchange.to_string(),
            quantity: -qty,
            entry_price: exec,
            entry_date: date,
            stop_loss: if sl_pct > 0.0 { exec * (1.0 + sl_pct / 100.0) } else { 0.0 },
            take_profit: if tp_pct > 0.0 { exec * (1.0 - tp_pct / 100.0) } else { 0.0 },
            entry_commission: comm,
        },
    );
    Ok(())
}

pub fn exit_position(
    portfolio: &mut Portfolio,
    code: &str,
    close: f64,
    date: i64,
    flat: f64,
    pct: f64,
    slip: f64,
) -> CoreResult<()> {
    let Some(position) = portfolio.positions.get(code).cloned() else {
        return Err(CoreError::ExecutionFailed(format!("no open position for {code}")));
    };

    let is_long = position.is_long();
    let exec = slippage(close, slip, !is_long);
    let trade_value = position.quantity.abs() * exec;
    let exit_comm = commission(trade_value, flat, pct);

    if is_long {
        portfolio.cash += trade_value - exit_comm;
    } else {
        portfolio.cash -= trade_value + exit_comm;
    }

    let pnl = position.quantity * (exec - position.entry_price) - position.entry_commission - exit_comm;

    portfolio.closed_trades.push(ClosedTrade {
        code: position.code.clone(),
        exchange: position.exchange.clone(),
        quantity: position.quantity,
        entry_price: position.entry_price,
        exit_price: exec,
        entry_date: position.entry_date,
        exit_date: date,
        pnl,
    });
    portfolio.positions.remove(code);
    Ok(())
}

/// Check stop-loss/take-profit for every open position whose code is
/// present in `price_map`; exit any that trigger. Returns the number of
/// positions closed. Stops are checked before regular exit rules in the
/// backtest loop.
pub fn check_triggers(
    portfolio: &mut Portfolio,
    price_map: &HashMap<String, f64>,
    date: i64,
    flat: f64,
    pct: f64,
    slip: f64,
) -> CoreResult<usize> {
    let mut triggered = Vec::new();
    for (code, position) in portfolio.positions.iter() {
        let Some(&price) = price_map.get(code) else {
            continue;
        };
        let is_long = position.is_long();
        let sl_hit = position.stop_loss > 0.0
            && ((is_long && price <= position.stop_loss) || (!is_long && price >= position.stop_loss));
        let tp_hit = position.take_profit > 0.0
            && ((is_long && price >= position.take_profit) || (!is_long && price <= position.take_profit));
        if sl_hit || tp_hit {
            triggered.push((code.clone(), price));
        }
    }
    // HashMap iteration order is randomized per-run; sort by code so the
    // resulting closed-trade append order is deterministic across runs.
    triggered.sort_by(|a, b| a.0.cmp(&b.0));

    for (code, price) in &triggered {
        exit_position(portfolio, code, *price, date, flat, pct, slip)?;
    }
    Ok(triggered.len())
}
