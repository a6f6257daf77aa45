/// backtest.rs — Multi-instrument backtest loop
///
/// Walks the unified timeline ascending. Per date: check stop/take-profit
/// triggers, evaluate exit rules on open positions, evaluate entry rules on
/// flat instruments, then record equity. Instruments are processed in
/// universe-declared order so `max_positions` enforcement is deterministic.
use tracing::{debug, info};

use crate::code_data::CodeData;
use crate::error::CoreResult;
use crate::execution;
use crate::metrics::{self, Metrics};
use crate::portfolio::Portfolio;
use crate::rule::evaluate;
use crate::strategy::Strategy;

#[derive(Debug, Clone, Copy)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub commission_flat: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
    pub risk_free_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            commission_flat: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
            risk_free_rate: 0.05,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub portfolio: Portfolio,
    pub metrics: Metrics,
}

/// A named collection of backtest results, e.g. one per instrument when a
/// caller wants an independent single-instrument run alongside the unified
/// multi-instrument one. Consumed only by `ReportPort::write_multi`.
#[derive(Debug, Clone)]
pub struct MultiBacktestResult {
    pub runs: Vec<(String, BacktestResult)>,
}

/// Run the unified-timeline backtest loop over `code_data_list` (in
/// universe-declared order) and `timeline` (ascending, deduplicated dates).
pub fn run_backtest(
    code_data_list: &[CodeData],
    timeline: &[i64],
    strategy: &Strategy,
    config: &BacktestConfig,
) -> CoreResult<BacktestResult> {
    let mut portfolio = Portfolio::new(config.initial_capital);
    let flat = config.commission_flat;
    let pct = config.commission_pct;
    let slip = config.slippage_pct;

    info!(strategy = %strategy.name, instruments = code_data_list.len(), bars = timeline.len(), "starting backtest run");

    for &date in timeline {
        let price_map: std::collections::HashMap<String, f64> = code_data_list
            .iter()
            .filter_map(|cd| cd.date_index.get(&date).map(|&i| (cd.code.clone(), cd.bars[i].close)))
            .collect();

        // Stops before rule evaluation; failures here are routine control
        // flow (e.g. nothing to trigger) and never abort the loop.
        let _ = execution::check_triggers(&mut portfolio, &price_map, date, flat, pct, slip);

        for cd in code_data_list {
            let Some(&i) = cd.date_index.get(&date) else {
                continue;
            };

            if portfolio.has_position(&cd.code) {
                let position = portfolio.positions.get(&cd.code).expect("checked has_position");
                let exit_rule = if position.is_long() { Some(&strategy.exit_long) } else { strategy.exit_short.as_ref() };
                if let Some(rule) = exit_rule {
                    if evaluate(rule, &cd.bars, &cd.indicators, i) {
                        if execution::exit_position(&mut portfolio, &cd.code, cd.bars[i].close, date, flat, pct, slip).is_ok() {
                            debug!(code = %cd.code, date, "exit rule fired");
                        }
                    }
                }
            }

            // A position closed above (or never open) leaves the slot free
            // for re-entry within the same bar.
            if !portfolio.has_position(&cd.code) {
                let entry_long_signal = evaluate(&strategy.entry_long, &cd.bars, &cd.indicators, i);
                if entry_long_signal {
                    let outcome = execution::enter_long(
                        &mut portfolio,
                        &cd.code,
                        &cd.exchange,
                        cd.bars[i].close,
                        date,
                        strategy.position_size,
                        strategy.stop_loss_pct,
                        strategy.take_profit_pct,
                        strategy.max_positions,
                        flat,
                        pct,
                        slip,
                    );
                    match outcome {
                        Ok(()) => debug!(code = %cd.code, date, "entered long"),
                        Err(e) => debug!(code = %cd.code, date, %e, "long entry rejected"),
                    }
                } else if strategy.allow_shorting {
                    if let Some(entry_short) = &strategy.entry_short {
                        if evaluate(entry_short, &cd.bars, &cd.indicators, i) {
                            let outcome = execution::enter_short(
                                &mut portfolio,
                                &cd.code,
                                &cd.exchange,
                                cd.bars[i].close,
                                date,
                                strategy.position_size,
                                strategy.stop_loss_pct,
                                strategy.take_profit_pct,
                                strategy.max_positions,
                                flat,
                                pct,
                                slip,
                            );
                            match outcome {
                                Ok(()) => debug!(code = %cd.code, date, "entered short"),
                                Err(e) => debug!(code = %cd.code, date, %e, "short entry rejected"),
                            }
                        }
                    }
                }
            }
        }

        let equity = portfolio.total_equity(&price_map);
        portfolio.record_equity(date, equity);
    }

    let universe_codes: Vec<String> = code_data_list.iter().map(|cd| cd.code.clone()).collect();
    let computed_metrics = metrics::compute_metrics(&portfolio, &universe_codes, config.risk_free_rate);

    info!(
        trades = computed_metrics.n_trades,
        total_return = computed_metrics.total_return,
        max_drawdown = computed_metrics.max_drawdown,
        "backtest run complete"
    );

    Ok(BacktestResult { portfolio, metrics: computed_metrics })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::{Bar, PriceField};
    use crate::code_data::{build_date_index, build_timeline};
    use crate::rule::{CompareOp, Operand, Rule};

    fn mkbars(code: &str, closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar { code: code.into(), exchange: "ASX".into(), date: i as i64 * 86400, open: c, high: c + 1.0, low: c - 1.0, close: c, volume: 1000 })
            .collect()
    }

    fn simple_strategy(entry_above: f64, exit_above: f64, max_positions: usize, position_size: f64, stop_loss_pct: f64) -> Strategy {
        Strategy {
            name: "test".into(),
            description: "".into(),
            entry_long: Rule::Compare { op: CompareOp::Above, left: Operand::price(PriceField::Close), right: Operand::constant(entry_above) },
            exit_long: Rule::Compare { op: CompareOp::Above, left: Operand::price(PriceField::Close), right: Operand::constant(exit_above) },
            entry_short: None,
            exit_short: None,
            position_size,
            stop_loss_pct,
            take_profit_pct: 0.0,
            max_positions,
            allow_shorting: false,
        }
    }

    fn code_data_for(code: &str, closes: &[f64]) -> CodeData {
        let bars = mkbars(code, closes);
        let date_index = build_date_index(&bars);
        CodeData { code: code.into(), exchange: "ASX".into(), bars, indicators: std::collections::HashMap::new(), date_index }
    }

    /// E1: stop-loss trigger closes a 500-share long at a loss.
    #[test]
    fn e1_stop_loss_trigger() {
        let closes = [90.0, 100.0, 110.0, 105.0, 100.0, 92.0, 88.0, 85.0];
        let cd = code_data_for("X", &closes);
        let timeline = build_timeline(&[cd.clone()]);
        let strategy = simple_strategy(95.0, 999.0, 5, 0.5, 10.0);
        let config = BacktestConfig { initial_capital: 100_000.0, commission_flat: 0.0, commission_pct: 0.0, slippage_pct: 0.0, risk_free_rate: 0.05 };

        let result = run_backtest(&[cd], &timeline, &strategy, &config).unwrap();

        assert_eq!(result.portfolio.closed_trades.len(), 1);
        let trade = &result.portfolio.closed_trades[0];
        assert!((trade.pnl - (-6000.0)).abs() < 1e-6);
        assert!(result.portfolio.positions.is_empty());
    }

    /// E3: two instruments, independent entries, max_positions=2 allows both.
    #[test]
    fn e3_two_instruments_both_enter() {
        let a = code_data_for("A", &[90.0, 100.0, 110.0, 120.0, 130.0]);
        let mut b_bars = vec![
            Bar { code: "B".into(), exchange: "ASX".into(), date: 0, open: 85.0, high: 86.0, low: 84.0, close: 85.0, volume: 1000 },
            Bar { code: "B".into(), exchange: "ASX".into(), date: 86400, open: 85.0, high: 86.0, low: 84.0, close: 85.0, volume: 1000 },
        ];
        b_bars.extend(
            [95.0, 105.0, 115.0, 125.0]
                .iter()
                .enumerate()
                .map(|(i, &c)| Bar { code: "B".into(), exchange: "ASX".into(), date: (i as i64 + 2) * 86400, open: c, high: c + 1.0, low: c - 1.0, close: c, volume: 1000 }),
        );
        let b_date_index = build_date_index(&b_bars);
        let b = CodeData { code: "B".into(), exchange: "ASX".into(), bars: b_bars, indicators: std::collections::HashMap::new(), date_index: b_date_index };

        let timeline = build_timeline(&[a.clone(), b.clone()]);
        let strategy = simple_strategy(95.0, 99999.0, 2, 0.25, 0.0);
        let config = BacktestConfig { initial_capital: 100_000.0, commission_flat: 0.0, commission_pct: 0.0, slippage_pct: 0.0, risk_free_rate: 0.05 };

        let result = run_backtest(&[a, b], &timeline, &strategy, &config).unwrap();
        assert_eq!(result.portfolio.positions.len(), 2);
    }

    /// E4: max_positions=1, first instrument in universe order fills the slot.
    #[test]
    fn e4_max_positions_one_first_in_order_wins() {
        let a = code_data_for("A", &[90.0, 100.0, 110.0, 120.0, 130.0]);
        let b = code_data_for("B", &[90.0, 100.0, 110.0, 120.0, 130.0]);
        let timeline = build_timeline(&[a.clone(), b.clone()]);
        let strategy = simple_strategy(95.0, 99999.0, 1, 0.25, 0.0);
        let config = BacktestConfig::default();

        let result = run_backtest(&[a, b], &timeline, &strategy, &config).unwrap();
        assert_eq!(result.portfolio.positions.len(), 1);
        assert!(result.portfolio.has_position("A"));
        assert!(!result.portfolio.has_position("B"));
    }

    /// E2: SMA(3) crossover entry/exit, with a re-entry after the first
    /// round trip closes at a loss.
    #[test]
    fn e2_sma_crossover_with_reentry() {
        use crate::indicators::{IndicatorKind, IndicatorParams};

        let closes = [100.0, 102.0, 104.0, 103.0, 101.0, 99.0, 97.0, 98.0, 100.0, 103.0];
        let mut cd = code_data_for("X", &closes);
        let entry_long = Rule::Compare {
            op: CompareOp::Above,
            left: Operand::price(PriceField::Close),
            right: Operand::indicator(IndicatorKind::Sma, IndicatorParams::period(3)),
        };
        let exit_long = Rule::Compare {
            op: CompareOp::Below,
            left: Operand::price(PriceField::Close),
            right: Operand::indicator(IndicatorKind::Sma, IndicatorParams::period(3)),
        };
        let strategy = Strategy {
            name: "sma_cross".into(),
            description: "".into(),
            entry_long,
            exit_long,
            entry_short: None,
            exit_short: None,
            position_size: 0.5,
            stop_loss_pct: 0.0,
            take_profit_pct: 0.0,
            max_positions: 1,
            allow_shorting: false,
        };
        crate::code_data::compute_indicators(&mut cd, &strategy).unwrap();
        let timeline = build_timeline(&[cd.clone()]);
        let config = BacktestConfig { initial_capital: 100_000.0, commission_flat: 0.0, commission_pct: 0.0, slippage_pct: 0.0, risk_free_rate: 0.05 };

        let result = run_backtest(&[cd], &timeline, &strategy, &config).unwrap();

        assert_eq!(result.portfolio.closed_trades.len(), 1);
        let first = &result.portfolio.closed_trades[0];
        assert_eq!(first.quantity, 480.0);
        assert!((first.pnl - (-1440.0)).abs() < 1e-6);

        assert!(result.portfolio.has_position("X"));
        let open = &result.portfolio.positions["X"];
        assert_eq!(open.quantity, 492.0);
    }

    /// A position closed at date t by an exit rule may be re-entered at the
    /// same date within the same bar (exit then entry, per the ordering
    /// rule), not merely on a later date.
    #[test]
    fn exit_and_reentry_can_happen_on_the_same_bar() {
        let closes = [50.0, 100.0, 90.0, 100.0];
        let cd = code_data_for("X", &closes);
        let timeline = build_timeline(&[cd.clone()]);
        // Enter above 60, exit below 95: bar1 (100) enters, bar2 (90) exits
        // *and* re-enters in the same pass since 90 is still above 60.
        let strategy = Strategy {
            name: "reentry".into(),
            description: "".into(),
            entry_long: Rule::Compare { op: CompareOp::Above, left: Operand::price(PriceField::Close), right: Operand::constant(60.0) },
            exit_long: Rule::Compare { op: CompareOp::Below, left: Operand::price(PriceField::Close), right: Operand::constant(95.0) },
            entry_short: None,
            exit_short: None,
            position_size: 0.5,
            stop_loss_pct: 0.0,
            take_profit_pct: 0.0,
            max_positions: 1,
            allow_shorting: false,
        };
        let config = BacktestConfig { initial_capital: 100_000.0, commission_flat: 0.0, commission_pct: 0.0, slippage_pct: 0.0, risk_free_rate: 0.05 };

        let result = run_backtest(&[cd], &timeline, &strategy, &config).unwrap();

        // One closed trade from the bar1 entry being exited at bar2, and a
        // fresh position re-opened at bar2's close in the same pass.
        assert_eq!(result.portfolio.closed_trades.len(), 1);
        assert_eq!(result.portfolio.closed_trades[0].entry_date, 86_400);
        assert_eq!(result.portfolio.closed_trades[0].exit_date, 2 * 86_400);
        assert!(result.portfolio.has_position("X"));
        assert_eq!(result.portfolio.positions["X"].entry_date, 2 * 86_400);
    }

    /// Short entry/exit end to end: a falling price opens a short, a rally
    /// back above the exit threshold closes it at a loss (shorts lose money
    /// when price rises).
    #[test]
    fn short_entry_and_exit_through_the_loop() {
        let closes = [100.0, 90.0, 80.0, 95.0];
        let cd = code_data_for("X", &closes);
        let timeline = build_timeline(&[cd.clone()]);
        let strategy = Strategy {
            name: "short_test".into(),
            description: "".into(),
            entry_long: Rule::Compare { op: CompareOp::Above, left: Operand::price(PriceField::Close), right: Operand::constant(99999.0) },
            exit_long: Rule::Compare { op: CompareOp::Above, left: Operand::price(PriceField::Close), right: Operand::constant(99999.0) },
            entry_short: Some(Rule::Compare { op: CompareOp::Below, left: Operand::price(PriceField::Close), right: Operand::constant(95.0) }),
            exit_short: Some(Rule::Compare { op: CompareOp::Above, left: Operand::price(PriceField::Close), right: Operand::constant(92.0) }),
            position_size: 0.5,
            stop_loss_pct: 0.0,
            take_profit_pct: 0.0,
            max_positions: 1,
            allow_shorting: true,
        };
        let config = BacktestConfig { initial_capital: 100_000.0, commission_flat: 0.0, commission_pct: 0.0, slippage_pct: 0.0, risk_free_rate: 0.05 };

        let result = run_backtest(&[cd], &timeline, &strategy, &config).unwrap();

        assert_eq!(result.portfolio.closed_trades.len(), 1);
        let trade = &result.portfolio.closed_trades[0];
        assert!(trade.quantity < 0.0, "short trade has negative quantity");
        assert!(trade.pnl < 0.0, "covering a short after a rally loses money");
        assert!(result.portfolio.positions.is_empty());
    }
}
