// =============================================================================
// HunterService — per-agent scan/analyse/watch/enter cycle
// =============================================================================
//
// One `HunterService` instance owns one agent's full cycle: manage open
// positions against the risk engine's exit rule, discover candidates, score
// them through Trend + Fundamental analysis, refresh the watchlist, and
// (if auto_trade is on and the daily loss gate is clear) enter the
// highest-scoring candidates. Grounded on the teacher's `StrategyEngine`
// gather-score-gate-propose pipeline (`strategy.rs`), generalised from one
// symbol per call to a whole-universe cycle and from a single ensemble
// score to the three-analyser composite this system scores candidates on.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use crate::activity::ActivityLog;
use crate::analysis::{FundamentalAnalyzer, FundamentalMetrics, TrendAnalyzer};
use crate::broker::BrokerAdapter;
use crate::execution::{ExecutionRequest, Executor};
use crate::market_data::MarketDataGateway;
use crate::position_engine::{PositionManager, PositionSide};
use crate::risk::RiskEngine;
use crate::trade::TradeLedger;
use crate::types::{ActivityType, EntryTrigger, OrderStatus, Side, WatchlistStatus};
use crate::watchlist::{Watchlist, WatchlistAssetClass, WatchlistScores};

/// Per-cycle tunables distinct from the process-wide risk config: the
/// composite-score weights and thresholds that decide whether a candidate
/// makes the watchlist and whether a watchlist row is worth entering.
#[derive(Debug, Clone, Copy)]
pub struct HunterCycleConfig {
    pub weight_trend: f64,
    pub weight_fundamental: f64,
    pub weight_momentum: f64,
    pub min_composite_score: f64,
    pub max_watchlist: usize,
    pub entry_score_threshold: f64,
    pub auto_trade: bool,
    pub history_days: u32,
}

impl HunterCycleConfig {
    pub fn crypto_default() -> Self {
        Self {
            weight_trend: 0.5,
            weight_fundamental: 0.3,
            weight_momentum: 0.2,
            min_composite_score: 60.0,
            max_watchlist: 20,
            entry_score_threshold: 70.0,
            auto_trade: true,
            history_days: 30,
        }
    }

    pub fn equities_default() -> Self {
        Self {
            weight_trend: 0.4,
            weight_fundamental: 0.3,
            weight_momentum: 0.3,
            min_composite_score: 60.0,
            max_watchlist: 20,
            entry_score_threshold: 75.0,
            auto_trade: true,
            history_days: 60,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CycleSummary {
    pub scanned: usize,
    pub analysed: usize,
    pub added: usize,
    pub executed: usize,
    pub closed: usize,
    pub aborted_reason: Option<String>,
}

pub struct HunterService {
    pub agent_id: String,
    asset_class: WatchlistAssetClass,
    position_side: PositionSide,
    broker: Arc<dyn BrokerAdapter>,
    market_data: Arc<MarketDataGateway>,
    risk: Arc<RiskEngine>,
    executor: Arc<Executor>,
    positions: Arc<PositionManager>,
    watchlist: Arc<Watchlist>,
    trades: Arc<TradeLedger>,
    activity: Arc<ActivityLog>,
    config: HunterCycleConfig,
}

impl HunterService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: impl Into<String>,
        asset_class: WatchlistAssetClass,
        position_side: PositionSide,
        broker: Arc<dyn BrokerAdapter>,
        market_data: Arc<MarketDataGateway>,
        risk: Arc<RiskEngine>,
        executor: Arc<Executor>,
        positions: Arc<PositionManager>,
        watchlist: Arc<Watchlist>,
        trades: Arc<TradeLedger>,
        activity: Arc<ActivityLog>,
        config: HunterCycleConfig,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            asset_class,
            position_side,
            broker,
            market_data,
            risk,
            executor,
            positions,
            watchlist,
            trades,
            activity,
            config,
        }
    }

    /// Run one cycle. `market_open` gates equities agents per §4.8 step 1;
    /// crypto agents always pass `true`.
    pub async fn run_cycle(&self, market_open: bool, candidates: &[String]) -> CycleSummary {
        if !market_open {
            self.activity
                .log(&self.agent_id, ActivityType::MarketClosed, "market session is not regular hours");
            return CycleSummary {
                aborted_reason: Some("market_closed".to_string()),
                ..Default::default()
            };
        }

        self.activity.log(&self.agent_id, ActivityType::CycleBegin, "cycle begin");
        let mut summary = CycleSummary::default();

        if !self.risk.can_open_new() {
            self.activity
                .log(&self.agent_id, ActivityType::Warning, "daily loss limit hit, aborting cycle");
            summary.aborted_reason = Some("daily_loss_limit".to_string());
            self.activity.log(&self.agent_id, ActivityType::CycleEnd, "cycle end (aborted)");
            return summary;
        }

        summary.closed = self.manage_open_positions().await;
        summary.scanned = candidates.len();

        let mut scored = Vec::new();
        for symbol in candidates {
            match self.analyse(symbol).await {
                Some(row) => {
                    summary.analysed += 1;
                    if row.composite >= self.config.min_composite_score {
                        scored.push(row);
                    }
                }
                None => continue,
            }
        }

        scored.sort_by(|a, b| b.composite.partial_cmp(&a.composite).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.config.max_watchlist);

        for row in &scored {
            self.watchlist.upsert(
                &self.agent_id,
                &row.symbol,
                self.asset_class,
                WatchlistScores {
                    composite: row.composite,
                    technical: row.trend_score,
                    fundamental: row.fundamental_score,
                    momentum: row.momentum_score,
                },
                row.price,
                row.target,
                row.stop,
                row.entry_trigger,
                row.analysis.clone(),
            );
            summary.added += 1;
        }
        self.watchlist.expire_stale();

        if self.config.auto_trade && self.risk.can_open_new() {
            summary.executed = self.enter_candidates().await;
        }

        self.activity.log_with_details(
            &self.agent_id,
            ActivityType::CycleEnd,
            "cycle end",
            Some(json!({
                "scanned": summary.scanned,
                "analysed": summary.analysed,
                "added": summary.added,
                "executed": summary.executed,
                "closed": summary.closed,
            })),
        );

        summary
    }

    async fn manage_open_positions(&self) -> usize {
        let due = self.positions.due_for_exit(&self.risk);
        let mut closed = 0;
        for (position_id, reason) in due {
            let open = self.positions.open_for_agent(&self.agent_id);
            let Some(position) = open.into_iter().find(|p| p.id == position_id) else {
                continue;
            };

            let quote = match self.broker.quote(&position.symbol).await {
                Ok(q) => q,
                Err(e) => {
                    warn!(symbol = %position.symbol, error = %e, "quote failed during exit management");
                    continue;
                }
            };

            let outcome = self
                .executor
                .place_and_wait(ExecutionRequest {
                    symbol: position.symbol.clone(),
                    side: Side::Sell,
                    quantity: position.quantity,
                    mark_price: quote.mark,
                    use_limit: false,
                    exit_reason: Some(reason),
                })
                .await;

            if outcome.status != OrderStatus::Filled && outcome.status != OrderStatus::PartiallyFilled {
                warn!(symbol = %position.symbol, status = %outcome.status, "exit order did not fill");
                continue;
            }

            let fill_price = outcome.filled_price.unwrap_or(quote.mark);
            if let Some(pnl) = self.positions.close_position(&position_id, reason, fill_price, outcome.order_id.clone()) {
                let pnl_pct = if position.entry_price > 0.0 {
                    pnl / (position.entry_price * position.quantity)
                } else {
                    0.0
                };
                self.risk.record_trade_result(pnl, pnl_pct);
                self.trades.record(
                    &self.agent_id,
                    Some(position_id.clone()),
                    &position.symbol,
                    Side::Sell,
                    outcome.filled_qty,
                    fill_price,
                    0.0,
                    outcome.order_id,
                    outcome.kind,
                    outcome.status,
                    Some(pnl),
                );
                self.activity.log(
                    &self.agent_id,
                    ActivityType::PositionClosed,
                    format!("{} closed via {reason} at {fill_price:.4}, pnl {pnl:.2}", position.symbol),
                );
                closed += 1;
            }
        }
        closed
    }

    async fn analyse(&self, symbol: &str) -> Option<CandidateRow> {
        let closes = match self.market_data.get_closes(symbol, self.config.history_days).await {
            Ok(c) => c,
            Err(_) => return None,
        };
        let quote = self.broker.quote(symbol).await.ok()?;

        let mut series = closes;
        series.push(quote.mark);

        let trend = TrendAnalyzer::analyze(&series);

        let change_24h = quote
            .open
            .filter(|&o| o > 0.0)
            .map(|o| (quote.mark - o) / o * 100.0);
        let change_7d = if series.len() >= 8 {
            let prior = series[series.len() - 8];
            if prior > 0.0 {
                Some((quote.mark - prior) / prior * 100.0)
            } else {
                None
            }
        } else {
            None
        };

        let metrics = FundamentalMetrics {
            volume_ratio: None,
            price: None,
            low_52w: None,
            high_52w: None,
            market_cap_rank: None,
            change_24h_pct: change_24h,
            change_7d_pct: change_7d,
        };
        let fundamental = FundamentalAnalyzer::analyze(&metrics);
        let momentum_score = match (change_24h, change_7d) {
            (Some(c24), Some(c7)) => (50.0 + 2.0 * c24 + 0.5 * c7).clamp(0.0, 100.0),
            _ => 50.0,
        };

        let composite = self.config.weight_trend * trend.score
            + self.config.weight_fundamental * fundamental.composite_score
            + self.config.weight_momentum * momentum_score;

        let entry_trigger = match (trend.direction, trend.strength) {
            (crate::types::Direction::Bullish, s) if s >= 60.0 => EntryTrigger::Breakout,
            (crate::types::Direction::Bullish, _) => EntryTrigger::Pullback,
            _ => EntryTrigger::Manual,
        };

        let (stop, target) = self.risk.stop_target(quote.mark, None);

        Some(CandidateRow {
            symbol: symbol.to_string(),
            price: quote.mark,
            composite,
            trend_score: trend.score,
            fundamental_score: fundamental.composite_score,
            momentum_score,
            entry_trigger,
            stop,
            target,
            analysis: json!({ "trend": trend, "fundamental": fundamental }),
        })
    }

    async fn enter_candidates(&self) -> usize {
        let mut rows = self.watchlist.watching_for(&self.agent_id);
        rows.sort_by(|a, b| b.scores.composite.partial_cmp(&a.scores.composite).unwrap_or(std::cmp::Ordering::Equal));

        let mut executed = 0;
        for row in rows {
            if row.scores.composite < self.config.entry_score_threshold {
                continue;
            }
            if !self.risk.can_open_new() {
                break;
            }

            let quote = match self.broker.quote(&row.symbol).await {
                Ok(q) => q,
                Err(_) => continue,
            };

            let instruments = match self.broker.instruments().await {
                Ok(i) => i,
                Err(_) => continue,
            };
            let Some(instrument) = instruments.iter().find(|i| i.symbol == row.symbol) else {
                continue;
            };

            let deployed = self.positions.deployed_capital(&self.agent_id);
            let open_count = self.positions.open_count(&self.agent_id);
            let quantity = match self.risk.position_size(
                quote.mark,
                Some(row.stop_loss),
                deployed,
                open_count,
                instrument.quantity_increment,
            ) {
                Ok(q) => q,
                Err(reason) => {
                    self.activity.log(&self.agent_id, ActivityType::Warning, format!("{}: {reason}", row.symbol));
                    continue;
                }
            };

            let outcome = self
                .executor
                .place_and_wait(ExecutionRequest {
                    symbol: row.symbol.clone(),
                    side: Side::Buy,
                    quantity,
                    mark_price: quote.mark,
                    use_limit: true,
                    exit_reason: None,
                })
                .await;

            if outcome.status != OrderStatus::Filled {
                continue;
            }

            let fill_price = outcome.filled_price.unwrap_or(quote.mark);
            let position_id = self.positions.open_position(
                &self.agent_id,
                &row.symbol,
                self.position_side,
                outcome.filled_qty,
                fill_price,
                row.stop_loss,
                row.target_price,
                &format!("{:?}", row.entry_trigger),
                outcome.order_id.clone(),
            );
            self.trades.record(
                &self.agent_id,
                Some(position_id),
                &row.symbol,
                Side::Buy,
                outcome.filled_qty,
                fill_price,
                0.0,
                outcome.order_id,
                outcome.kind,
                outcome.status,
                None,
            );
            self.watchlist.set_status(&row.id, WatchlistStatus::Entered);
            self.activity.log(
                &self.agent_id,
                ActivityType::PositionOpened,
                format!("{} opened at {fill_price:.4}, qty {:.6}", row.symbol, outcome.filled_qty),
            );
            executed += 1;
        }
        executed
    }
}

struct CandidateRow {
    symbol: String,
    price: f64,
    composite: f64,
    trend_score: f64,
    fundamental_score: f64,
    momentum_score: f64,
    entry_trigger: EntryTrigger,
    stop: f64,
    target: f64,
    analysis: serde_json::Value,
}
