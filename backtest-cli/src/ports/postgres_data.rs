/// ports/postgres_data.rs — PostgreSQL-backed DataPort adapter
///
/// The core's `DataPort` trait is synchronous; this adapter bridges into it
/// from a `tokio`/`deadpool-postgres` connection pool via
/// `block_in_place` + `Handle::block_on`, so the core's event loop never
/// sees a suspension point.
use backtest_core::bar::Bar;
use backtest_core::error::{CoreError, CoreResult};
use backtest_core::ports::DataPort;
use deadpool_postgres::Pool;
use tracing::debug;

pub struct PostgresDataPort {
    pool: Pool,
}

impl PostgresDataPort {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn fetch_ohlcv_async(&self, code: &str, exchange: &str, start: i64, end: i64) -> CoreResult<Vec<Bar>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| CoreError::InsufficientData(format!("postgres pool checkout failed: {e}")))?;

        let rows = client
            .query(
                "SELECT date, open, high, low, close, volume FROM ohlcv_bars \
                 WHERE code = $1 AND exchange = $2 AND date BETWEEN $3 AND $4 \
                 ORDER BY date ASC",
                &[&code, &exchange, &start, &end],
            )
            .await
            .map_err(|e| CoreError::InsufficientData(format!("postgres query failed: {e}")))?;

        let bars = rows
            .iter()
            .map(|row| Bar {
                code: code.to_string(),
                exchange: exchange.to_string(),
                date: row.get(0),
                open: row.get(1),
                high: row.get(2),
                low: row.get(3),
                close: row.get(4),
                volume: row.get(5),
            })
            .collect();
        Ok(bars)
    }

    async fn list_symbols_async(&self, exchange: &str) -> CoreResult<Vec<String>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| CoreError::InsufficientData(format!("postgres pool checkout failed: {e}")))?;

        let rows = client
            .query("SELECT DISTINCT code FROM ohlcv_bars WHERE exchange = $1 ORDER BY code ASC", &[&exchange])
            .await
            .map_err(|e| CoreError::InsufficientData(format!("postgres query failed: {e}")))?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}

impl DataPort for PostgresDataPort {
    fn fetch_ohlcv(&self, code: &str, exchange: &str, start: i64, end: i64) -> CoreResult<Vec<Bar>> {
        debug!(code, exchange, start, end, "fetching ohlcv bars from postgres");
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(self.fetch_ohlcv_async(code, exchange, start, end)))
    }

    fn list_symbols(&self, exchange: &str) -> CoreResult<Vec<String>> {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(self.list_symbols_async(exchange)))
    }
}

/// Build a connection pool from a `postgres://` URL, as parsed by
/// `tokio_postgres::Config`.
pub fn build_pool(database_url: &str) -> anyhow::Result<Pool> {
    let pg_config: tokio_postgres::Config = database_url.parse()?;
    let mgr_config = deadpool_postgres::ManagerConfig { recycling_method: deadpool_postgres::RecyclingMethod::Fast };
    let mgr = deadpool_postgres::Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
    let pool = Pool::builder(mgr).max_size(16).build()?;
    Ok(pool)
}
