// =============================================================================
// Persistence — SQLite-backed store for the durable entity families
// =============================================================================
//
// Two pools per §4.11's "synchronous (blocking services) and asynchronous
// (HTTP layer)" split would be one pool too many for a single `sqlx`
// runtime that's async end to end; both the hunter cycles and the API
// layer share one `SqlitePool` here, sized for the concurrency the
// scheduler actually produces (one connection per in-flight cycle plus
// the API). Schema creation runs `CREATE TABLE IF NOT EXISTS` the same
// way the teacher's adapters treat their own setup as idempotent
// (`broker/*.rs` instrument caches rebuild themselves the same way on
// every process start).

use sqlx::sqlite::{SqlitePoolOptions, SqliteSynchronous};
use sqlx::ConnectOptions;

pub mod repo;

pub use repo::Persistence;

/// Open (creating if necessary) the SQLite database at `path` and run the
/// schema migration. `path` may be `:memory:` for tests.
pub async fn connect(path: &str) -> anyhow::Result<sqlx::SqlitePool> {
    let mut options: sqlx::sqlite::SqliteConnectOptions = path.parse()?;
    options = options
        .create_if_missing(true)
        .synchronous(SqliteSynchronous::Normal)
        .disable_statement_logging();

    let pool = SqlitePoolOptions::new().max_connections(10).connect_with(options).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &sqlx::SqlitePool) -> anyhow::Result<()> {
    sqlx::query(SCHEMA).execute(pool).await?;
    Ok(())
}

/// Table set per the entity families this system persists: agents and
/// their run history, the two hunters' trade/position/watchlist rows kept
/// separate per asset class, the orchestrator's regimes and
/// recommendations, the shared activity log, a quote cache for crypto, and
/// the two metrics tables.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'idle',
    config TEXT NOT NULL,
    allocated_capital REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    last_run_at TEXT
);

CREATE TABLE IF NOT EXISTS agent_runs (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    scanned INTEGER NOT NULL DEFAULT 0,
    analysed INTEGER NOT NULL DEFAULT 0,
    added INTEGER NOT NULL DEFAULT 0,
    executed INTEGER NOT NULL DEFAULT 0,
    closed INTEGER NOT NULL DEFAULT 0,
    aborted_reason TEXT,
    started_at TEXT NOT NULL,
    finished_at TEXT
);

CREATE TABLE IF NOT EXISTS agent_activities (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    type TEXT NOT NULL,
    message TEXT NOT NULL,
    details TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS trades (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    position_id TEXT,
    symbol TEXT NOT NULL,
    side TEXT NOT NULL,
    quantity REAL NOT NULL,
    price REAL NOT NULL,
    notional REAL NOT NULL,
    fees REAL NOT NULL DEFAULT 0,
    order_id TEXT,
    order_type TEXT NOT NULL,
    status TEXT NOT NULL,
    pnl REAL,
    executed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS crypto_trades (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    position_id TEXT,
    symbol TEXT NOT NULL,
    side TEXT NOT NULL,
    quantity REAL NOT NULL,
    price REAL NOT NULL,
    notional REAL NOT NULL,
    fees REAL NOT NULL DEFAULT 0,
    order_id TEXT,
    order_type TEXT NOT NULL,
    status TEXT NOT NULL,
    pnl REAL,
    executed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS gem_positions (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    side TEXT NOT NULL,
    quantity REAL NOT NULL,
    entry_price REAL NOT NULL,
    allocated_amount REAL NOT NULL,
    stop_loss REAL NOT NULL,
    take_profit REAL NOT NULL,
    current_price REAL NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    realized_pnl REAL NOT NULL DEFAULT 0,
    unrealized_pnl REAL NOT NULL DEFAULT 0,
    entry_reason TEXT NOT NULL,
    exit_reason TEXT,
    entry_order_id TEXT,
    exit_order_id TEXT,
    created_at TEXT NOT NULL,
    closed_at TEXT
);

CREATE TABLE IF NOT EXISTS crypto_positions (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    side TEXT NOT NULL,
    quantity REAL NOT NULL,
    entry_price REAL NOT NULL,
    allocated_amount REAL NOT NULL,
    stop_loss REAL NOT NULL,
    take_profit REAL NOT NULL,
    current_price REAL NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    realized_pnl REAL NOT NULL DEFAULT 0,
    unrealized_pnl REAL NOT NULL DEFAULT 0,
    entry_reason TEXT NOT NULL,
    exit_reason TEXT,
    entry_order_id TEXT,
    exit_order_id TEXT,
    created_at TEXT NOT NULL,
    closed_at TEXT
);

CREATE TABLE IF NOT EXISTS gem_watchlist (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    composite_score REAL NOT NULL,
    technical_score REAL NOT NULL,
    fundamental_score REAL NOT NULL,
    momentum_score REAL NOT NULL,
    entry_price REAL NOT NULL,
    target_price REAL NOT NULL,
    stop_loss REAL NOT NULL,
    entry_trigger TEXT NOT NULL,
    status TEXT NOT NULL,
    analysis TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS crypto_watchlist (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    composite_score REAL NOT NULL,
    technical_score REAL NOT NULL,
    fundamental_score REAL NOT NULL,
    momentum_score REAL NOT NULL,
    entry_price REAL NOT NULL,
    target_price REAL NOT NULL,
    stop_loss REAL NOT NULL,
    entry_trigger TEXT NOT NULL,
    status TEXT NOT NULL,
    analysis TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS crypto_quote_cache (
    symbol TEXT PRIMARY KEY,
    mark REAL NOT NULL,
    bid REAL NOT NULL,
    ask REAL NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS regimes (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    regime TEXT NOT NULL,
    vix REAL NOT NULL,
    qqq_price REAL NOT NULL,
    short_put_strike REAL,
    recovery_strike REAL,
    started_at TEXT NOT NULL,
    ended_at TEXT
);

CREATE TABLE IF NOT EXISTS trade_recommendations (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    action TEXT NOT NULL,
    rationale TEXT NOT NULL,
    status TEXT NOT NULL,
    order_id TEXT,
    execution_price REAL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    executed_at TEXT
);

CREATE TABLE IF NOT EXISTS agent_metrics (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    metric_name TEXT NOT NULL,
    value REAL NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS system_metrics (
    id TEXT PRIMARY KEY,
    metric_name TEXT NOT NULL,
    value REAL NOT NULL,
    recorded_at TEXT NOT NULL
);
"#;
