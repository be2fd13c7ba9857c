// =============================================================================
// Scheduled jobs — glue between `Scheduler` and the hunters/orchestrator
// =============================================================================
//
// Three `ScheduledJob` kinds: one per hunter agent (runs a full cycle and
// persists whatever changed), one for the orchestrator's regime evaluation,
// and one maintenance sweep (activity retention, watchlist/recommendation
// expiry). Each `tick` is one complete, self-contained unit of work — the
// `Scheduler`'s loop shape is what keeps two ticks of the same job from
// ever overlapping.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::activity::ActivityLog;
use crate::api::ws::WsFrame;
use crate::broker::{BrokerAdapter, PutSpreadCandidate, PutSpreadCriteria};
use crate::hunter::HunterService;
use crate::market_hours;
use crate::orchestrator::{RecommendationStore, RegimeController, RegimeSnapshot};
use crate::persistence::Persistence;
use crate::position_engine::{PositionManager, PositionSide};
use crate::risk::RiskEngine;
use crate::runtime_config::RuntimeConfig;
use crate::scheduler::ScheduledJob;
use crate::trade::TradeLedger;
use crate::types::{ActivityType, RecommendationAction, RecommendationStatus, RegimeType};
use crate::watchlist::{Watchlist, WatchlistAssetClass};

/// Activity milestones worth surfacing as a WebSocket `alert` frame, rather
/// than just sitting in the activity log for the next REST poll.
fn is_alert_worthy(activity_type: ActivityType) -> bool {
    matches!(
        activity_type,
        ActivityType::Error
            | ActivityType::Warning
            | ActivityType::StopTriggered
            | ActivityType::TargetHit
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HunterKind {
    Crypto,
    Equities,
}

/// Runs one hunter's full cycle on a schedule and persists whatever the
/// cycle touched: the run summary, positions opened/closed this cycle, any
/// new trade fills, and the refreshed watchlist.
pub struct HunterJob {
    kind: HunterKind,
    hunter: Arc<HunterService>,
    config: Arc<RwLock<RuntimeConfig>>,
    positions: Arc<PositionManager>,
    trades: Arc<TradeLedger>,
    watchlist: Arc<Watchlist>,
    activity: Arc<ActivityLog>,
    persistence: Arc<Persistence>,
    events: tokio::sync::broadcast::Sender<WsFrame>,
    persisted_trades: Mutex<usize>,
    last_alerted: Mutex<chrono::DateTime<Utc>>,
}

impl HunterJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: HunterKind,
        hunter: Arc<HunterService>,
        config: Arc<RwLock<RuntimeConfig>>,
        positions: Arc<PositionManager>,
        trades: Arc<TradeLedger>,
        watchlist: Arc<Watchlist>,
        activity: Arc<ActivityLog>,
        persistence: Arc<Persistence>,
        events: tokio::sync::broadcast::Sender<WsFrame>,
    ) -> Self {
        Self {
            kind,
            hunter,
            config,
            positions,
            trades,
            watchlist,
            activity,
            persistence,
            events,
            persisted_trades: Mutex::new(0),
            last_alerted: Mutex::new(Utc::now()),
        }
    }

    fn candidates(&self) -> Vec<String> {
        let config = self.config.read();
        match self.kind {
            HunterKind::Crypto => config
                .crypto_hunter
                .coins
                .iter()
                .filter(|c| !config.crypto_hunter.exclude_coins.contains(c))
                .cloned()
                .collect(),
            HunterKind::Equities => config.gem_hunter.universe.clone(),
        }
    }

    fn asset_class(&self) -> WatchlistAssetClass {
        match self.kind {
            HunterKind::Crypto => WatchlistAssetClass::Crypto,
            HunterKind::Equities => WatchlistAssetClass::Equities,
        }
    }

    async fn persist_cycle(&self, agent_id: &str, summary: &crate::hunter::CycleSummary, started_at: chrono::DateTime<Utc>) {
        if let Err(e) = self.persistence.record_run(agent_id, summary, started_at).await {
            warn!(agent_id, error = %e, "failed to record agent run");
        }

        let asset_class = self.asset_class();

        for position in self.positions.open_for_agent(agent_id) {
            if let Err(e) = self.persistence.save_position(asset_class, &position).await {
                warn!(agent_id, symbol = %position.symbol, error = %e, "failed to persist open position");
            }
        }
        for position in self.positions.get_closed_positions(summary.closed) {
            if let Err(e) = self.persistence.save_position(asset_class, &position).await {
                warn!(agent_id, symbol = %position.symbol, error = %e, "failed to persist closed position");
            }
        }

        let all_trades = self.trades.for_agent(agent_id);
        let already = *self.persisted_trades.lock();
        for trade in all_trades.iter().skip(already) {
            if let Err(e) = self.persistence.save_trade(asset_class, trade).await {
                warn!(agent_id, symbol = %trade.symbol, error = %e, "failed to persist trade");
            }
            let _ = self.events.send(WsFrame::TradeUpdate {
                agent_id: agent_id.to_string(),
                symbol: trade.symbol.clone(),
                side: trade.side.to_string(),
                quantity: trade.quantity,
                price: trade.price,
                status: trade.status.to_string(),
            });
        }
        *self.persisted_trades.lock() = all_trades.len();

        for entry in self.watchlist.all_for(agent_id) {
            if let Err(e) = self.persistence.upsert_watchlist_entry(asset_class, &entry).await {
                warn!(agent_id, symbol = %entry.symbol, error = %e, "failed to persist watchlist entry");
            }
        }

        if let Err(e) = self.persistence.touch_agent_last_run(agent_id, Utc::now()).await {
            warn!(agent_id, error = %e, "failed to touch agent last_run_at");
        }

        let mut last_alerted = self.last_alerted.lock();
        for entry in self.activity.for_agent(agent_id, 50) {
            if entry.created_at > *last_alerted && is_alert_worthy(entry.activity_type) {
                let _ = self.events.send(WsFrame::Alert {
                    agent_id: agent_id.to_string(),
                    activity_type: entry.activity_type.to_string(),
                    message: entry.message.clone(),
                });
            }
        }
        *last_alerted = Utc::now();

        let _ = self.events.send(WsFrame::AgentUpdate {
            agent_id: agent_id.to_string(),
            status: "running".to_string(),
            open_positions: self.positions.open_for_agent(agent_id).len(),
            watching: self.watchlist.watching_for(agent_id).len(),
        });
    }
}

#[async_trait]
impl ScheduledJob for HunterJob {
    fn name(&self) -> &str {
        &self.hunter.agent_id
    }

    fn interval_minutes(&self) -> u32 {
        let config = self.config.read();
        match self.kind {
            HunterKind::Crypto => config.crypto_hunter.scan_interval_minutes,
            HunterKind::Equities => config.gem_hunter.scan_interval_minutes,
        }
    }

    async fn tick(&self) {
        let market_open = match self.kind {
            HunterKind::Crypto => true,
            HunterKind::Equities => market_hours::is_regular_session(Utc::now()),
        };
        let started_at = Utc::now();
        let candidates = self.candidates();
        let summary = self.hunter.run_cycle(market_open, &candidates).await;
        self.persist_cycle(&self.hunter.agent_id, &summary, started_at).await;
    }
}

/// Evaluates the options orchestrator's regime on a fixed cadence, using the
/// equities broker's VIX/QQQ quotes and whatever short-put position the
/// orchestrator currently has open as the threshold the regime watches.
pub struct RegimeJob {
    agent_id: String,
    interval_minutes: u32,
    controller: Arc<RegimeController>,
    broker: Arc<dyn BrokerAdapter>,
    positions: Arc<PositionManager>,
    persistence: Arc<Persistence>,
    events: tokio::sync::broadcast::Sender<WsFrame>,
    recommendations: Arc<RecommendationStore>,
    risk: Arc<RiskEngine>,
    config: Arc<RwLock<RuntimeConfig>>,
}

impl RegimeJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: impl Into<String>,
        interval_minutes: u32,
        controller: Arc<RegimeController>,
        broker: Arc<dyn BrokerAdapter>,
        positions: Arc<PositionManager>,
        persistence: Arc<Persistence>,
        events: tokio::sync::broadcast::Sender<WsFrame>,
        recommendations: Arc<RecommendationStore>,
        risk: Arc<RiskEngine>,
        config: Arc<RwLock<RuntimeConfig>>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            interval_minutes,
            controller,
            broker,
            positions,
            persistence,
            events,
            recommendations,
            risk,
            config,
        }
    }

    /// `normal_bull` is the only regime the original analysis path recommends
    /// a fresh entry from; other regimes are either defensive or waiting on a
    /// recovery condition, not searching for a new put spread to sell.
    async fn maybe_recommend_put_spread(&self, snapshot: &RegimeSnapshot) {
        if snapshot.regime != RegimeType::NormalBull {
            return;
        }

        let already_outstanding = self.recommendations.for_agent(&self.agent_id).into_iter().any(|r| {
            r.action == RecommendationAction::OpenPutSpread
                && matches!(r.status, RecommendationStatus::Pending | RecommendationStatus::Approved)
        });
        if already_outstanding {
            return;
        }

        let criteria = {
            let config = self.config.read();
            PutSpreadCriteria {
                symbol: "QQQ".to_string(),
                target_short_delta: config.orchestrator.target_short_delta,
                min_days_to_expiration: config.orchestrator.min_days_to_expiration,
                max_days_to_expiration: config.orchestrator.max_days_to_expiration,
                spread_width: config.orchestrator.spread_width,
            }
        };
        let target_short_delta = criteria.target_short_delta;

        let candidates = match self.broker.find_put_spread(criteria).await {
            Ok(c) => c,
            Err(e) => {
                warn!(agent_id = %self.agent_id, error = %e, "failed to search put spread candidates");
                return;
            }
        };

        let best: Option<PutSpreadCandidate> = candidates.into_iter().min_by(|a, b| {
            (a.short_delta - target_short_delta)
                .abs()
                .partial_cmp(&(b.short_delta - target_short_delta).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let Some(best) = best else {
            return;
        };

        let max_position_pct = self.config.read().orchestrator.max_position_pct_per_trade;
        let risk_budget = self.risk.allocated_capital() * max_position_pct;
        let contracts = if best.max_risk > 0.0 {
            ((risk_budget / best.max_risk) as u32).max(1)
        } else {
            1
        };

        let rationale = format!(
            "{} regime, VIX {:.1}: sell {:.0}/{:.0} put spread expiring {} ({:.0}-delta short leg)",
            snapshot.regime, snapshot.vix, best.short_strike, best.long_strike, best.expiration, best.short_delta * 100.0
        );
        let risk_assessment = format!(
            "{} contract(s) sized to {:.0}% of allocated capital (${:.0} max risk/contract)",
            contracts,
            max_position_pct * 100.0,
            best.max_risk
        );

        let rec = self.recommendations.create(
            &self.agent_id,
            "QQQ",
            RecommendationAction::OpenPutSpread,
            snapshot.regime,
            snapshot.qqq_price,
            snapshot.vix,
            rationale,
            risk_assessment,
            Some(&best),
            Some(contracts),
            None,
        );

        let _ = self.events.send(WsFrame::Alert {
            agent_id: self.agent_id.clone(),
            activity_type: ActivityType::TradeSignal.to_string(),
            message: format!("new put spread recommendation {} awaiting approval", rec.id),
        });
    }
}

#[async_trait]
impl ScheduledJob for RegimeJob {
    fn name(&self) -> &str {
        &self.agent_id
    }

    fn interval_minutes(&self) -> u32 {
        self.interval_minutes
    }

    async fn tick(&self) {
        let vix = match self.broker.quote("VIX").await {
            Ok(q) => q.mark,
            Err(e) => {
                warn!(error = %e, "failed to fetch VIX quote, skipping regime evaluation");
                return;
            }
        };
        let qqq = match self.broker.quote("QQQ").await {
            Ok(q) => q.mark,
            Err(e) => {
                warn!(error = %e, "failed to fetch QQQ quote, skipping regime evaluation");
                return;
            }
        };

        // The short put's strike isn't tracked as a distinct field on
        // `Position` (see DESIGN.md); the position's stop level stands in
        // for it, since both mark the price below which the spread is
        // breached.
        let short_put_strike = self
            .positions
            .open_for_agent(&self.agent_id)
            .into_iter()
            .find(|p| p.side == PositionSide::Put)
            .map(|p| p.stop_loss);

        let before = self.controller.current().map(|s| s.regime);
        let snapshot = self.controller.evaluate(vix, qqq, short_put_strike, None);

        if before != Some(snapshot.regime) {
            if let Err(e) = self.persistence.record_regime_change(&self.agent_id, &snapshot).await {
                warn!(agent_id = %self.agent_id, error = %e, "failed to persist regime change");
            }
            let _ = self.events.send(WsFrame::RegimeChange {
                regime: snapshot.regime.to_string(),
                vix,
                qqq_price: qqq,
            });
        }

        self.maybe_recommend_put_spread(&snapshot).await;
    }
}

/// Retention sweep: activity log pruning, watchlist expiry, recommendation
/// expiry. Runs once per tick, independent of either hunter's cadence.
pub struct MaintenanceJob {
    interval_minutes: u32,
    activity: Arc<ActivityLog>,
    recommendations: Arc<RecommendationStore>,
    watchlists: Vec<Arc<Watchlist>>,
}

impl MaintenanceJob {
    pub fn new(
        interval_minutes: u32,
        activity: Arc<ActivityLog>,
        recommendations: Arc<RecommendationStore>,
        watchlists: Vec<Arc<Watchlist>>,
    ) -> Self {
        Self {
            interval_minutes,
            activity,
            recommendations,
            watchlists,
        }
    }
}

#[async_trait]
impl ScheduledJob for MaintenanceJob {
    fn name(&self) -> &str {
        "maintenance"
    }

    fn interval_minutes(&self) -> u32 {
        self.interval_minutes
    }

    async fn tick(&self) {
        let pruned = self.activity.prune();
        let expired_recs = self.recommendations.sweep_expired();
        let mut expired_watchlist = 0;
        for wl in &self.watchlists {
            expired_watchlist += wl.expire_stale();
        }
        if pruned > 0 || expired_recs > 0 || expired_watchlist > 0 {
            tracing::info!(pruned, expired_recs, expired_watchlist, "maintenance sweep complete");
        }
    }
}
