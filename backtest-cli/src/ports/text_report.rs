/// ports/text_report.rs — Plain-text ReportPort adapter
///
/// Emits the same information a Typst writer would lay out (metrics table,
/// per-instrument breakdown, closed-trade log) as a human-readable text
/// artifact, since Typst rendering is outside this crate's scope.
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use backtest_core::backtest::{BacktestResult, MultiBacktestResult};
use backtest_core::error::{CoreError, CoreResult};
use backtest_core::ports::ReportPort;
use backtest_core::strategy::Strategy;

pub struct TextReportWriter;

impl TextReportWriter {
    fn render(result: &BacktestResult, strategy: &Strategy) -> String {
        let mut out = String::new();
        writeln!(out, "Strategy: {}", strategy.name).ok();
        if !strategy.description.is_empty() {
            writeln!(out, "  {}", strategy.description).ok();
        }
        writeln!(out, "  entry_long: {}", strategy.entry_long).ok();
        writeln!(out, "  exit_long : {}", strategy.exit_long).ok();
        if let Some(r) = &strategy.entry_short {
            writeln!(out, "  entry_short: {r}").ok();
        }
        if let Some(r) = &strategy.exit_short {
            writeln!(out, "  exit_short : {r}").ok();
        }
        writeln!(out).ok();
        writeln!(out, "{}", result.metrics).ok();

        writeln!(out, "\nPer-instrument breakdown:").ok();
        for code_metrics in &result.metrics.code_breakdown {
            writeln!(
                out,
                "  {:<10} trades={:<4} win_rate={:>6.2}% pnl={:>12.2}",
                code_metrics.code,
                code_metrics.n_trades,
                code_metrics.win_rate * 100.0,
                code_metrics.total_pnl
            )
            .ok();
        }

        writeln!(out, "\nClosed trades:").ok();
        for trade in &result.portfolio.closed_trades {
            writeln!(
                out,
                "  {:<10} qty={:>10.2} entry={:>10.2}@{} exit={:>10.2}@{} pnl={:>12.2}",
                trade.code, trade.quantity, trade.entry_price, trade.entry_date, trade.exit_price, trade.exit_date, trade.pnl
            )
            .ok();
        }

        out
    }
}

impl ReportPort for TextReportWriter {
    fn write(&self, result: &BacktestResult, strategy: &Strategy, path: &Path) -> CoreResult<()> {
        let rendered = Self::render(result, strategy);
        fs::write(path, rendered).map_err(|e| CoreError::Internal(format!("failed to write report to {path:?}: {e}")))
    }

    fn write_multi(&self, result: &MultiBacktestResult, strategy: &Strategy, path: &Path) -> CoreResult<()> {
        let mut out = String::new();
        for (label, run) in &result.runs {
            writeln!(out, "=== {label} ===").ok();
            out.push_str(&Self::render(run, strategy));
            out.push('\n');
        }
        fs::write(path, out).map_err(|e| CoreError::Internal(format!("failed to write report to {path:?}: {e}")))
    }
}
