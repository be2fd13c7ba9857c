// =============================================================================
// Central Application State
// =============================================================================
//
// The single source of truth the API layer and the scheduled jobs both hold
// an `Arc` to. Each agent kind (crypto hunter, equities hunter) gets its own
// `AgentStack` — broker, market data gateway, risk engine, executor, and the
// in-memory books (positions/watchlist/trades) it trades against — plus the
// orchestrator's regime controller and recommendation store sit alongside,
// sharing the same activity log and persistence handle.
//
// Thread safety:
//   - AtomicU64 for lock-free version tracking (the WS feed's dirty flag).
//   - parking_lot::RwLock for mutable shared collections.
//   - Arc wrappers for subsystem engines that manage their own interior
//     mutability.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::activity::{Activity, ActivityLog};
use crate::api::ws::WsFrame;
use crate::broker::crypto::CryptoBroker;
use crate::broker::equities::EquitiesBroker;
use crate::broker::BrokerAdapter;
use crate::execution::Executor;
use crate::hunter::{HunterCycleConfig, HunterService};
use crate::market_data::{BrokerHistoryProvider, MarketDataGateway};
use crate::orchestrator::{RecommendationStore, RegimeController};
use crate::persistence::Persistence;
use crate::position_engine::{Position, PositionManager, PositionSide};
use crate::risk::{AssetClass, RiskConfig, RiskEngine, RiskState};
use crate::runtime_config::{RiskTunables, RuntimeConfig};
use crate::scheduler::Scheduler;
use crate::trade::{Trade, TradeLedger};
use crate::types::{AgentKind, AgentStatus};
use crate::watchlist::{Watchlist, WatchlistAssetClass, WatchlistEntry};

fn risk_config_from(tunables: &RiskTunables, asset_class: AssetClass) -> RiskConfig {
    RiskConfig {
        allocated_capital: tunables.allocated_capital,
        stop_loss_pct: tunables.stop_loss_pct,
        take_profit_pct: tunables.take_profit_pct,
        max_hold: std::time::Duration::from_secs(u64::from(tunables.max_hold_hours) * 3600),
        max_positions: tunables.max_positions,
        max_position_pct: tunables.max_position_pct,
        kelly_multiplier: tunables.kelly_multiplier,
        daily_loss_limit_pct: tunables.daily_loss_limit_pct,
        asset_class,
    }
}

/// Everything one hunter agent needs to run its own cycle independent of
/// the other: its broker, its market data source, its risk/execution
/// engines, and its own positions/watchlist/trade books.
pub struct AgentStack {
    pub agent_id: String,
    pub kind: AgentKind,
    pub asset_class: WatchlistAssetClass,
    pub status: RwLock<AgentStatus>,
    pub broker: Arc<dyn BrokerAdapter>,
    pub market_data: Arc<MarketDataGateway>,
    pub risk: Arc<RiskEngine>,
    pub executor: Arc<Executor>,
    pub positions: Arc<PositionManager>,
    pub watchlist: Arc<Watchlist>,
    pub trades: Arc<TradeLedger>,
    pub hunter: Arc<HunterService>,
}

impl AgentStack {
    fn build(
        agent_id: &str,
        kind: AgentKind,
        asset_class: WatchlistAssetClass,
        position_side: PositionSide,
        broker: Arc<dyn BrokerAdapter>,
        risk_asset_class: AssetClass,
        tunables: &RiskTunables,
        cycle_config: HunterCycleConfig,
        dry_run: bool,
        order_timeout_secs: u64,
        activity: Arc<ActivityLog>,
    ) -> Self {
        let market_data = Arc::new(MarketDataGateway::new(vec![Arc::new(
            BrokerHistoryProvider::new(broker.clone()),
        )]));
        let risk = Arc::new(RiskEngine::new(risk_config_from(tunables, risk_asset_class)));
        let executor = Arc::new(
            Executor::new(broker.clone(), dry_run)
                .with_timeout(std::time::Duration::from_secs(order_timeout_secs)),
        );
        let positions = Arc::new(PositionManager::new());
        let watchlist = Arc::new(Watchlist::new());
        let trades = Arc::new(TradeLedger::new());

        let hunter = Arc::new(HunterService::new(
            agent_id,
            asset_class,
            position_side,
            broker.clone(),
            market_data.clone(),
            risk.clone(),
            executor.clone(),
            positions.clone(),
            watchlist.clone(),
            trades.clone(),
            activity,
            cycle_config,
        ));

        Self {
            agent_id: agent_id.to_string(),
            kind,
            asset_class,
            status: RwLock::new(AgentStatus::Idle),
            broker,
            market_data,
            risk,
            executor,
            positions,
            watchlist,
            trades,
            hunter,
        }
    }

    fn snapshot(&self) -> AgentSnapshot {
        let risk_state = self.risk.get_state();
        AgentSnapshot {
            agent_id: self.agent_id.clone(),
            kind: self.kind.to_string(),
            status: self.status.read().to_string(),
            open_positions: self.positions.open_for_agent(&self.agent_id).len(),
            watching: self.watchlist.watching_for(&self.agent_id).len(),
            risk: risk_state,
        }
    }
}

/// Central application state shared across API handlers and scheduled jobs
/// via `Arc<AppState>`.
pub struct AppState {
    /// Monotonically increasing counter. Incremented on every meaningful
    /// mutation so the WebSocket feed can detect fresh state cheaply.
    pub state_version: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
    pub config_path: String,

    pub activity: Arc<ActivityLog>,
    pub persistence: Arc<Persistence>,
    pub scheduler: Arc<Scheduler>,

    pub crypto: Arc<AgentStack>,
    pub equities: Arc<AgentStack>,

    pub regime: Arc<RegimeController>,
    pub recommendations: Arc<RecommendationStore>,

    /// Broadcast bus for the WebSocket feed's typed frames (agent_update,
    /// trade_update, regime_change, alert). Scheduled jobs publish into it;
    /// a lagging or absent subscriber never blocks a publisher.
    pub events: tokio::sync::broadcast::Sender<WsFrame>,

    pub start_time: Instant,
}

impl AppState {
    /// Construct the full component graph from a loaded `RuntimeConfig` and
    /// an open `Persistence` handle. Reads broker credentials from the
    /// environment; neither broker has a demo-mode fallback, since even a
    /// dry run needs real quotes and historical prices to analyse against.
    pub fn new(
        config: RuntimeConfig,
        config_path: impl Into<String>,
        persistence: Persistence,
    ) -> anyhow::Result<Self> {
        let activity = Arc::new(ActivityLog::new());
        let persistence = Arc::new(persistence);

        let crypto_broker: Arc<dyn BrokerAdapter> = Arc::new(
            CryptoBroker::new(
                std::env::var("CRYPTO_API_KEY").unwrap_or_default(),
                &std::env::var("CRYPTO_API_SEED")
                    .context("CRYPTO_API_SEED must be set (see `keygen` for generating one)")?,
                std::env::var("CRYPTO_API_BASE_URL")
                    .unwrap_or_else(|_| "https://api.exchange.example".into()),
            )
            .context("failed to construct crypto broker")?,
        );

        let equities_broker: Arc<dyn BrokerAdapter> = Arc::new(EquitiesBroker::new(
            std::env::var("EQUITIES_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            std::env::var("EQUITIES_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(7497),
            std::env::var("EQUITIES_CLIENT_ID").unwrap_or_else(|_| "aegis-trader".into()),
        ));

        let crypto = Arc::new(AgentStack::build(
            "crypto-hunter",
            AgentKind::CryptoHunter,
            WatchlistAssetClass::Crypto,
            PositionSide::Long,
            crypto_broker,
            AssetClass::Crypto,
            &config.crypto_hunter.hunter.risk,
            HunterCycleConfig::crypto_default(),
            config.dry_run,
            config.crypto_hunter.hunter.order_timeout_secs,
            activity.clone(),
        ));

        let equities = Arc::new(AgentStack::build(
            "gem-hunter",
            AgentKind::GemHunter,
            WatchlistAssetClass::Equities,
            PositionSide::Stock,
            equities_broker,
            AssetClass::Equities,
            &config.gem_hunter.hunter.risk,
            HunterCycleConfig::equities_default(),
            config.dry_run,
            config.gem_hunter.hunter.order_timeout_secs,
            activity.clone(),
        ));

        let regime = Arc::new(RegimeController::new(
            "orchestrator",
            config.orchestrator.vix_shutdown_threshold,
            equities.positions.clone(),
            activity.clone(),
        ));
        let recommendations = Arc::new(RecommendationStore::new(
            config.orchestrator.recommendation_ttl_hours,
        ));

        let (events, _) = tokio::sync::broadcast::channel(256);

        Ok(Self {
            state_version: AtomicU64::new(1),
            runtime_config: Arc::new(RwLock::new(config)),
            config_path: config_path.into(),
            activity,
            persistence,
            scheduler: Arc::new(Scheduler::new()),
            crypto,
            equities,
            regime,
            recommendations,
            events,
            start_time: Instant::now(),
        })
    }

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    pub fn stack_for(&self, agent_id: &str) -> Option<&Arc<AgentStack>> {
        if self.crypto.agent_id == agent_id {
            Some(&self.crypto)
        } else if self.equities.agent_id == agent_id {
            Some(&self.equities)
        } else {
            None
        }
    }

    pub fn open_positions(&self) -> Vec<Position> {
        let mut positions = self.crypto.positions.get_open_positions();
        positions.extend(self.equities.positions.get_open_positions());
        positions
    }

    pub fn recent_trades(&self, count: usize) -> Vec<Trade> {
        let mut trades = self.crypto.trades.recent(count);
        trades.extend(self.equities.trades.recent(count));
        trades.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        trades.truncate(count);
        trades
    }

    pub fn watching(&self) -> Vec<WatchlistEntry> {
        let mut entries = self.crypto.watchlist.watching_for(&self.crypto.agent_id);
        entries.extend(self.equities.watchlist.watching_for(&self.equities.agent_id));
        entries
    }

    pub fn recent_activity(&self, limit: usize) -> Vec<Activity> {
        self.activity.recent(limit)
    }

    /// Persist the current runtime config to disk. Called after any
    /// in-place edit made through the API.
    pub async fn save_config(&self) -> anyhow::Result<()> {
        let config = self.runtime_config.read().clone();
        config.save(&self.config_path)
    }

    /// Build a complete, serialisable snapshot for the dashboard REST
    /// endpoint and the WebSocket push feed.
    pub fn build_snapshot(&self) -> StateSnapshot {
        let version = self.current_state_version();
        let risk_state_report = [self.crypto.snapshot(), self.equities.snapshot()];

        StateSnapshot {
            state_version: version,
            server_time: Utc::now().timestamp_millis(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            agents: risk_state_report.to_vec(),
            regime: self.regime.current(),
            pending_recommendations: self.recommendations.pending().len(),
            open_positions: self.open_positions().len(),
            scheduler: self.scheduler.status(),
        }
    }
}

/// Per-agent summary used in the dashboard snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    pub agent_id: String,
    pub kind: String,
    pub status: String,
    pub open_positions: usize,
    pub watching: usize,
    pub risk: RiskState,
}

/// Top-level engine state snapshot sent to the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_secs: u64,
    pub agents: Vec<AgentSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regime: Option<crate::orchestrator::RegimeSnapshot>,
    pub pending_recommendations: usize,
    pub open_positions: usize,
    pub scheduler: crate::scheduler::SchedulerStatus,
}
