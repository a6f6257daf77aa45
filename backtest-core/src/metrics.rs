/// metrics.rs — Aggregate performance statistics from closed trades and the equity curve
use std::collections::HashMap;

use crate::portfolio::Portfolio;

/// Trading days assumed per year for annualization. A fixed constant rather
/// than a parameter since this engine targets daily equity bars only.
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone)]
pub struct CodeMetrics {
    pub code: String,
    pub n_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
}

#[derive(Debug, Clone)]
pub struct Metrics {
    pub n_trades: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub profit_factor: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration_days: i64,
    pub calmar: f64,
    pub initial_equity: f64,
    pub final_equity: f64,
    pub code_breakdown: Vec<CodeMetrics>,
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "════════════════════════════════════════════")?;
        writeln!(f, "  BACKTEST PERFORMANCE REPORT")?;
        writeln!(f, "════════════════════════════════════════════")?;
        writeln!(f, "  Trades              : {}", self.n_trades)?;
        writeln!(f, "  Win Rate            : {:.2}%", self.win_rate * 100.0)?;
        writeln!(f, "  Avg Win             : {:.4}%", self.avg_win * 100.0)?;
        writeln!(f, "  Avg Loss            : {:.4}%", self.avg_loss * 100.0)?;
        writeln!(f, "  Profit Factor       : {:.3}", self.profit_factor)?;
        writeln!(f, "  Total Return        : {:.2}%", self.total_return * 100.0)?;
        writeln!(f, "  Annualized Return   : {:.2}%", self.annualized_return * 100.0)?;
        writeln!(f, "  Sharpe Ratio        : {:.3}", self.sharpe)?;
        writeln!(f, "  Sortino Ratio       : {:.3}", self.sortino)?;
        writeln!(f, "  Max Drawdown        : {:.2}%", self.max_drawdown * 100.0)?;
        writeln!(f, "  Max Drawdown (days) : {}", self.max_drawdown_duration_days)?;
        writeln!(f, "  Calmar Ratio        : {:.3}", self.calmar)?;
        writeln!(f, "  Initial Equity      : ${:.2}", self.initial_equity)?;
        writeln!(f, "  Final Equity        : ${:.2}", self.final_equity)?;
        writeln!(f, "════════════════════════════════════════════")
    }
}

fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Sample standard deviation (n-1 denominator); 0 for fewer than two points.
fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = data.iter().sum::<f64>() / data.len() as f64;
    let var = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    var.sqrt()
}

/// Drawdown magnitude as a fraction (negative) plus the longest stretch, in
/// calendar days, spent below a prior peak. Dates come from `equity_curve`
/// directly, so the duration is measured in wall-clock days, not bar counts.
fn max_drawdown_with_duration(equity_curve: &[(i64, f64)]) -> (f64, i64) {
    if equity_curve.is_empty() {
        return (0.0, 0);
    }
    let mut peak = equity_curve[0].1;
    let mut peak_date = equity_curve[0].0;
    let mut max_dd = 0.0f64;
    let mut max_duration = 0i64;

    for &(date, equity) in equity_curve {
        if equity > peak {
            peak = equity;
            peak_date = date;
        }
        let dd = (equity - peak) / peak;
        if dd < max_dd {
            max_dd = dd;
        }
        let duration_seconds = date - peak_date;
        let duration_days = duration_seconds / 86_400;
        if duration_days > max_duration {
            max_duration = duration_days;
        }
    }
    (max_dd, max_duration)
}

/// Aggregate the portfolio's closed trades and equity curve into a full
/// performance report, plus a per-instrument breakdown across `universe_codes`.
pub fn compute_metrics(portfolio: &Portfolio, universe_codes: &[String], risk_free_rate: f64) -> Metrics {
    let initial_equity = portfolio.equity_curve.first().map(|p| p.equity).unwrap_or(portfolio.cash);
    let final_equity = portfolio.equity_curve.last().map(|p| p.equity).unwrap_or(portfolio.cash);

    let code_breakdown = code_metrics(portfolio, universe_codes);

    let n = portfolio.closed_trades.len();
    if n == 0 {
        return Metrics {
            n_trades: 0,
            win_rate: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            profit_factor: 0.0,
            total_return: 0.0,
            annualized_return: 0.0,
            sharpe: 0.0,
            sortino: 0.0,
            max_drawdown: 0.0,
            max_drawdown_duration_days: 0,
            calmar: 0.0,
            initial_equity,
            final_equity,
            code_breakdown,
        };
    }

    // Per-trade return as a fraction of the capital committed at entry.
    let returns: Vec<f64> = portfolio
        .closed_trades
        .iter()
        .map(|t| {
            let committed = t.quantity.abs() * t.entry_price;
            if committed.abs() < 1e-12 {
                0.0
            } else {
                t.pnl / committed
            }
        })
        .collect();

    let winners: Vec<f64> = returns.iter().filter(|&&r| r > 0.0).cloned().collect();
    let losers: Vec<f64> = returns.iter().filter(|&&r| r <= 0.0).cloned().collect();

    let win_rate = winners.len() as f64 / n as f64;
    let avg_win = mean(&winners).unwrap_or(0.0);
    let avg_loss = mean(&losers.iter().map(|x| x.abs()).collect::<Vec<_>>()).unwrap_or(0.0);

    // profit_factor is defined on raw PnL, not normalized returns: gross
    // winnings over absolute gross losings.
    let gross_win: f64 = portfolio.closed_trades.iter().map(|t| t.pnl).filter(|&p| p > 0.0).sum();
    let gross_loss: f64 = portfolio.closed_trades.iter().map(|t| t.pnl).filter(|&p| p <= 0.0).sum::<f64>().abs();
    let profit_factor = if gross_loss < 1e-10 { f64::INFINITY } else { gross_win / gross_loss };

    let total_return = if initial_equity.abs() < 1e-12 { 0.0 } else { (final_equity - initial_equity) / initial_equity };

    let trading_days = portfolio.equity_curve.len().max(1) as f64;
    let annualized_return = if total_return <= -1.0 {
        total_return
    } else {
        (1.0 + total_return).powf(TRADING_DAYS_PER_YEAR / trading_days) - 1.0
    };

    // Daily returns from successive equity-curve points, not per-trade
    // returns: r_i = (e_i - e_{i-1}) / e_{i-1}.
    let daily_returns: Vec<f64> = portfolio
        .equity_curve
        .windows(2)
        .filter_map(|w| {
            let (prev, cur) = (w[0].equity, w[1].equity);
            if prev.abs() < 1e-12 { None } else { Some((cur - prev) / prev) }
        })
        .collect();

    let r_mean = mean(&daily_returns).unwrap_or(0.0);
    let r_std = std_dev(&daily_returns);
    let daily_risk_free = risk_free_rate / TRADING_DAYS_PER_YEAR;
    let sharpe = if r_std < 1e-12 { 0.0 } else { ((r_mean - daily_risk_free) / r_std) * TRADING_DAYS_PER_YEAR.sqrt() };

    let downside_sq: Vec<f64> = daily_returns.iter().map(|&r| if r < 0.0 { r * r } else { 0.0 }).collect();
    let sigma_d = mean(&downside_sq).unwrap_or(0.0).sqrt();
    let sortino = if sigma_d < 1e-12 {
        f64::INFINITY
    } else {
        ((r_mean - daily_risk_free) / sigma_d) * TRADING_DAYS_PER_YEAR.sqrt()
    };

    let curve: Vec<(i64, f64)> = portfolio.equity_curve.iter().map(|p| (p.date, p.equity)).collect();
    let (max_drawdown, max_drawdown_duration_days) = max_drawdown_with_duration(&curve);

    let calmar = if max_drawdown.abs() < 1e-10 { f64::INFINITY } else { annualized_return / max_drawdown.abs() };

    Metrics {
        n_trades: n,
        win_rate,
        avg_win,
        avg_loss,
        profit_factor,
        total_return,
        annualized_return,
        sharpe,
        sortino,
        max_drawdown,
        max_drawdown_duration_days,
        calmar,
        initial_equity,
        final_equity,
        code_breakdown,
    }
}

fn code_metrics(portfolio: &Portfolio, universe_codes: &[String]) -> Vec<CodeMetrics> {
    let mut by_code: HashMap<&str, (usize, usize, f64)> = HashMap::new();
    for trade in &portfolio.closed_trades {
        let entry = by_code.entry(&trade.code).or_insert((0, 0, 0.0));
        entry.0 += 1;
        if trade.pnl > 0.0 {
            entry.1 += 1;
        }
        entry.2 += trade.pnl;
    }

    universe_codes
        .iter()
        .map(|code| {
            let (n_trades, wins, total_pnl) = by_code.get(code.as_str()).copied().unwrap_or((0, 0, 0.0));
            let win_rate = if n_trades == 0 { 0.0 } else { wins as f64 / n_trades as f64 };
            CodeMetrics { code: code.clone(), n_trades, win_rate, total_pnl }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::{ClosedTrade, EquityPoint};

    fn trade(code: &str, qty: f64, entry: f64, exit: f64, pnl: f64) -> ClosedTrade {
        ClosedTrade { code: code.into(), exchange: "ASX".into(), quantity: qty, entry_price: entry, exit_price: exit, entry_date: 0, exit_date: 1, pnl }
    }

    #[test]
    fn zero_trades_yields_zeroed_report() {
        let portfolio = Portfolio::new(100_000.0);
        let metrics = compute_metrics(&portfolio, &["BHP".to_string()], 0.0);
        assert_eq!(metrics.n_trades, 0);
        assert_eq!(metrics.win_rate, 0.0);
        assert_eq!(metrics.code_breakdown.len(), 1);
        assert_eq!(metrics.code_breakdown[0].n_trades, 0);
    }

    #[test]
    fn win_rate_and_profit_factor_from_mixed_trades() {
        let mut portfolio = Portfolio::new(100_000.0);
        portfolio.closed_trades.push(trade("BHP", 100.0, 100.0, 110.0, 1000.0));
        portfolio.closed_trades.push(trade("BHP", 100.0, 100.0, 95.0, -500.0));
        portfolio.equity_curve.push(EquityPoint { date: 0, equity: 100_000.0 });
        portfolio.equity_curve.push(EquityPoint { date: 86_400 * 30, equity: 100_500.0 });

        let metrics = compute_metrics(&portfolio, &["BHP".to_string()], 0.0);
        assert_eq!(metrics.n_trades, 2);
        approx::assert_relative_eq!(metrics.win_rate, 0.5, epsilon = 1e-9);
        assert!(metrics.profit_factor > 0.0);
        assert_eq!(metrics.code_breakdown[0].n_trades, 2);
        approx::assert_relative_eq!(metrics.code_breakdown[0].total_pnl, 500.0, epsilon = 1e-9);
    }

    #[test]
    fn max_drawdown_picks_worst_peak_to_trough() {
        let curve = vec![(0i64, 100.0), (86_400, 120.0), (172_800, 60.0), (259_200, 80.0)];
        let (dd, _) = max_drawdown_with_duration(&curve);
        approx::assert_relative_eq!(dd, -0.5, epsilon = 1e-9);
    }

    #[test]
    fn max_drawdown_duration_measures_days_below_peak() {
        let curve = vec![(0i64, 100.0), (86_400, 90.0), (86_400 * 5, 95.0), (86_400 * 10, 101.0)];
        let (_, duration) = max_drawdown_with_duration(&curve);
        assert_eq!(duration, 10);
    }

    #[test]
    fn flat_equity_curve_has_no_drawdown() {
        let curve = vec![(0i64, 100.0), (86_400, 100.0), (172_800, 100.0)];
        let (dd, duration) = max_drawdown_with_duration(&curve);
        assert_eq!(dd, 0.0);
        assert_eq!(duration, 0);
    }

    /// E5: equity curve [10000, 10000, 10500, 10000, 9500, 9750], one point
    /// per day. Peak-to-trough drawdown ~9.52%, 3 days to set a new peak.
    #[test]
    fn e5_max_drawdown_and_duration() {
        let equity = [10_000.0, 10_000.0, 10_500.0, 10_000.0, 9_500.0, 9_750.0];
        let curve: Vec<(i64, f64)> = equity.iter().enumerate().map(|(i, &e)| (i as i64 * 86_400, e)).collect();
        let (dd, duration) = max_drawdown_with_duration(&curve);
        approx::assert_relative_eq!(dd, -(500.0 / 10_500.0), epsilon = 1e-9);
        assert_eq!(duration, 3);
    }

    #[test]
    fn profit_factor_is_gross_win_over_gross_loss() {
        let mut portfolio = Portfolio::new(100_000.0);
        portfolio.closed_trades.push(trade("BHP", 100.0, 100.0, 110.0, 1000.0));
        portfolio.closed_trades.push(trade("BHP", 100.0, 100.0, 95.0, -500.0));
        portfolio.equity_curve.push(EquityPoint { date: 0, equity: 100_000.0 });
        portfolio.equity_curve.push(EquityPoint { date: 86_400, equity: 100_500.0 });
        let metrics = compute_metrics(&portfolio, &["BHP".to_string()], 0.0);
        approx::assert_relative_eq!(metrics.profit_factor, 2.0, epsilon = 1e-9);
    }

    /// Sharpe/Sortino are derived from successive equity-point returns, not
    /// per-trade returns: a single trade whose pnl/committed fraction differs
    /// wildly from the equity curve's day-to-day moves must not leak into
    /// the ratio.
    #[test]
    fn sharpe_uses_daily_equity_returns_not_per_trade_returns() {
        let mut portfolio = Portfolio::new(100_000.0);
        // One trade with a huge per-trade return...
        portfolio.closed_trades.push(trade("BHP", 1.0, 100.0, 1000.0, 900.0));
        // ...against a flat equity curve (no day-to-day variance at all).
        for i in 0..5 {
            portfolio.equity_curve.push(EquityPoint { date: i * 86_400, equity: 100_000.0 });
        }
        let metrics = compute_metrics(&portfolio, &["BHP".to_string()], 0.0);
        // Zero variance in the daily return series collapses Sharpe/Sortino
        // to the zero-std branch, not some value driven by the 9x trade return.
        assert_eq!(metrics.sharpe, 0.0);
    }

    /// annualized_return's exponent is 252/trading_days where trading_days
    /// is the equity-curve length, not a wall-clock date span.
    #[test]
    fn annualized_return_uses_equity_curve_length_as_trading_days() {
        let mut portfolio = Portfolio::new(100_000.0);
        portfolio.closed_trades.push(trade("BHP", 100.0, 100.0, 110.0, 1000.0));
        // 252 equity points (one full trading year) at +1% total return.
        for i in 0..252 {
            portfolio.equity_curve.push(EquityPoint { date: i * 86_400, equity: 100_000.0 });
        }
        portfolio.equity_curve.push(EquityPoint { date: 252 * 86_400, equity: 101_000.0 });
        let metrics = compute_metrics(&portfolio, &["BHP".to_string()], 0.0);
        let total_return = metrics.total_return;
        let trading_days = portfolio.equity_curve.len() as f64;
        let expected = (1.0 + total_return).powf(252.0 / trading_days) - 1.0;
        approx::assert_relative_eq!(metrics.annualized_return, expected, epsilon = 1e-9);
    }
}
