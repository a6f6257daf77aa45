/// main.rs — Backtest driver entry point
///
/// Loads INI config, validates the instrument universe against Postgres,
/// parses the strategy rule text, runs the event-driven backtest, and
/// writes a text report. Exit codes follow the core's error taxonomy.
mod ports;
mod rule_text;

use std::path::PathBuf;
use std::process::ExitCode;

use backtest_core::backtest::{run_backtest, BacktestConfig};
use backtest_core::code_data::{build_timeline, compute_indicators, load_code_data};
use backtest_core::error::CoreError;
use backtest_core::ports::{ConfigPort, ReportPort};
use backtest_core::strategy::Strategy;
use backtest_core::universe::{parse_universe, validate_universe};
use chrono::NaiveDate;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ports::{IniConfigPort, PostgresDataPort, TextReportWriter};

#[derive(Parser, Debug)]
#[command(name = "backtest", about = "Event-driven equity strategy backtester")]
struct Cli {
    /// Path to the INI config file.
    #[arg(long)]
    config: PathBuf,

    /// Path to write the text report to.
    #[arg(long, default_value = "report.txt")]
    out: PathBuf,

    /// `postgres://` connection string.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

const EXIT_SUCCESS: u8 = 0;
const EXIT_GENERAL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_DATA_SOURCE_ERROR: u8 = 3;
const EXIT_INVALID_STRATEGY: u8 = 4;
const EXIT_INSUFFICIENT_DATA: u8 = 5;

fn core_error_exit_code(e: &CoreError) -> u8 {
    match e {
        CoreError::InvalidArgument(_) => EXIT_CONFIG_ERROR,
        CoreError::InsufficientData(_) => EXIT_INSUFFICIENT_DATA,
        CoreError::StrategyInvalid(_) => EXIT_INVALID_STRATEGY,
        CoreError::ExecutionFailed(_) => EXIT_GENERAL,
        CoreError::Internal(_) => EXIT_GENERAL,
    }
}

fn parse_date(s: &str) -> anyhow::Result<i64> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")?;
    Ok(date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp())
}

fn build_strategy(cfg: &dyn ConfigPort) -> Result<Strategy, CoreError> {
    let entry_long_text = cfg.get_string("strategy", "entry_long", "");
    let exit_long_text = cfg.get_string("strategy", "exit_long", "");
    if entry_long_text.is_empty() || exit_long_text.is_empty() {
        return Err(CoreError::StrategyInvalid("entry_long and exit_long rule text are required".into()));
    }

    let entry_long = rule_text::parse_rule_text(&entry_long_text)
        .map_err(|e| CoreError::StrategyInvalid(format!("entry_long: {e}")))?;
    let exit_long = rule_text::parse_rule_text(&exit_long_text).map_err(|e| CoreError::StrategyInvalid(format!("exit_long: {e}")))?;

    let entry_short_text = cfg.get_string("strategy", "entry_short", "");
    let exit_short_text = cfg.get_string("strategy", "exit_short", "");
    let entry_short = if entry_short_text.is_empty() {
        None
    } else {
        Some(rule_text::parse_rule_text(&entry_short_text).map_err(|e| CoreError::StrategyInvalid(format!("entry_short: {e}")))?)
    };
    let exit_short = if exit_short_text.is_empty() {
        None
    } else {
        Some(rule_text::parse_rule_text(&exit_short_text).map_err(|e| CoreError::StrategyInvalid(format!("exit_short: {e}")))?)
    };

    let position_size = cfg.get_float("strategy", "position_size", 1.0);
    if !(0.0..=1.0).contains(&position_size) || position_size <= 0.0 {
        return Err(CoreError::InvalidArgument("position_size must be in (0, 1]".into()));
    }

    let max_positions_raw = cfg.get_int("strategy", "max_positions", 1);
    if max_positions_raw < 1 {
        return Err(CoreError::InvalidArgument("max_positions must be >= 1".into()));
    }

    Ok(Strategy {
        name: cfg.get_string("strategy", "name", "unnamed"),
        description: cfg.get_string("strategy", "description", ""),
        entry_long,
        exit_long,
        entry_short,
        exit_short,
        position_size,
        stop_loss_pct: cfg.get_float("strategy", "stop_loss", 0.0),
        take_profit_pct: cfg.get_float("strategy", "take_profit", 0.0),
        max_positions: max_positions_raw as usize,
        allow_shorting: cfg.get_bool("backtest", "allow_shorting", false),
    })
}

async fn run() -> Result<(), (CoreError, u8)> {
    let cli = Cli::parse();

    let config = IniConfigPort::load(cli.config.to_str().unwrap_or_default())
        .map_err(|e| (CoreError::InvalidArgument(e.to_string()), EXIT_CONFIG_ERROR))?;

    let pool = ports::postgres_data::build_pool(&cli.database_url)
        .map_err(|e| (CoreError::InsufficientData(e.to_string()), EXIT_DATA_SOURCE_ERROR))?;
    let data_port = PostgresDataPort::new(pool);

    let exchange = config.get_string("backtest", "exchange", "ASX");
    let codes_text = config.get_string("backtest", "codes", "");
    if codes_text.is_empty() {
        return Err((CoreError::InvalidArgument("config key [backtest] codes is required".into()), EXIT_CONFIG_ERROR));
    }
    let universe = parse_universe(&codes_text, &exchange).map_err(|e| (e.clone(), core_error_exit_code(&e)))?;

    let start_text = config.get_string("backtest", "start_date", "");
    let end_text = config.get_string("backtest", "end_date", "");
    let start = parse_date(&start_text).map_err(|e| (CoreError::InvalidArgument(e.to_string()), EXIT_CONFIG_ERROR))?;
    let end = parse_date(&end_text).map_err(|e| (CoreError::InvalidArgument(e.to_string()), EXIT_CONFIG_ERROR))?;

    let validated = validate_universe(&data_port, universe.codes, &exchange, start, end).map_err(|e| (e.clone(), core_error_exit_code(&e)))?;
    for skipped in &validated.skipped {
        warn!(code = %skipped.code, reason = ?skipped.reason, "instrument dropped from universe");
    }

    let strategy = build_strategy(&config).map_err(|e| (e.clone(), core_error_exit_code(&e)))?;

    let mut code_data_list = Vec::new();
    for (code, bars) in validated.bars_by_code {
        let mut cd = load_code_data(&code, &exchange, bars);
        compute_indicators(&mut cd, &strategy).map_err(|e| (e.clone(), core_error_exit_code(&e)))?;
        code_data_list.push(cd);
    }

    let timeline = build_timeline(&code_data_list);

    let backtest_config = BacktestConfig {
        initial_capital: config.get_float("backtest", "initial_capital", 100_000.0),
        commission_flat: config.get_float("backtest", "commission_per_trade", 0.0),
        commission_pct: config.get_float("backtest", "commission_pct", 0.0),
        slippage_pct: config.get_float("backtest", "slippage_pct", 0.0),
        risk_free_rate: config.get_float("backtest", "risk_free_rate", 0.05),
    };

    let result = run_backtest(&code_data_list, &timeline, &strategy, &backtest_config).map_err(|e| (e.clone(), core_error_exit_code(&e)))?;

    let report_writer = TextReportWriter;
    report_writer
        .write(&result, &strategy, &cli.out)
        .map_err(|e| (e.clone(), core_error_exit_code(&e)))?;

    info!(path = %cli.out.display(), "report written");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    match run().await {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err((e, code)) => {
            tracing::error!(error = %e, "backtest run failed");
            ExitCode::from(code)
        }
    }
}
