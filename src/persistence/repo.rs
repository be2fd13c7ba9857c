// =============================================================================
// Persistence::Persistence — typed read/write methods over the schema
// =============================================================================
//
// One method per write the system actually performs (per-row writes, as
// §4.11 requires outside the regime-change transaction) plus the handful
// of reads the API surface needs. Crypto and equities keep separate
// tables per §6, so every position/trade/watchlist method is parameterised
// on `WatchlistAssetClass` and picks its table name from that.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::activity::Activity;
use crate::orchestrator::recommendation::Recommendation;
use crate::orchestrator::regime::RegimeSnapshot;
use crate::position_engine::Position;
use crate::trade::Trade;
use crate::watchlist::{WatchlistAssetClass, WatchlistEntry};

pub struct Persistence {
    pool: SqlitePool,
}

fn position_table(asset_class: WatchlistAssetClass) -> &'static str {
    match asset_class {
        WatchlistAssetClass::Crypto => "crypto_positions",
        WatchlistAssetClass::Equities => "gem_positions",
    }
}

fn watchlist_table(asset_class: WatchlistAssetClass) -> &'static str {
    match asset_class {
        WatchlistAssetClass::Crypto => "crypto_watchlist",
        WatchlistAssetClass::Equities => "gem_watchlist",
    }
}

fn trade_table(asset_class: WatchlistAssetClass) -> &'static str {
    match asset_class {
        WatchlistAssetClass::Crypto => "crypto_trades",
        WatchlistAssetClass::Equities => "trades",
    }
}

impl Persistence {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert_agent(
        &self,
        id: &str,
        name: &str,
        kind: &str,
        status: &str,
        config_json: &str,
        allocated_capital: f64,
    ) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO agents (id, name, kind, status, config, allocated_capital, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(id) DO UPDATE SET name=?2, kind=?3, status=?4, config=?5, allocated_capital=?6",
        )
        .bind(id)
        .bind(name)
        .bind(kind)
        .bind(status)
        .bind(config_json)
        .bind(allocated_capital)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_agent_status(&self, agent_id: &str, status: &str) -> sqlx::Result<()> {
        sqlx::query("UPDATE agents SET status = ?1 WHERE id = ?2")
            .bind(status)
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn touch_agent_last_run(&self, agent_id: &str, at: DateTime<Utc>) -> sqlx::Result<()> {
        sqlx::query("UPDATE agents SET last_run_at = ?1 WHERE id = ?2")
            .bind(at.to_rfc3339())
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_run(
        &self,
        agent_id: &str,
        summary: &crate::hunter::CycleSummary,
        started_at: DateTime<Utc>,
    ) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO agent_runs (id, agent_id, scanned, analysed, added, executed, closed, aborted_reason, started_at, finished_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(agent_id)
        .bind(summary.scanned as i64)
        .bind(summary.analysed as i64)
        .bind(summary.added as i64)
        .bind(summary.executed as i64)
        .bind(summary.closed as i64)
        .bind(&summary.aborted_reason)
        .bind(started_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn log_activity(&self, activity: &Activity) -> sqlx::Result<()> {
        let activity_type = serde_json::to_value(activity.activity_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "info".to_string());
        sqlx::query(
            "INSERT INTO agent_activities (id, agent_id, type, message, details, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&activity.id)
        .bind(&activity.agent_id)
        .bind(activity_type)
        .bind(&activity.message)
        .bind(activity.details.as_ref().map(Value::to_string))
        .bind(activity.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_position(&self, asset_class: WatchlistAssetClass, position: &Position) -> sqlx::Result<()> {
        let table = position_table(asset_class);
        let query = format!(
            "INSERT INTO {table} (id, agent_id, symbol, side, quantity, entry_price, allocated_amount, stop_loss, \
             take_profit, current_price, status, realized_pnl, unrealized_pnl, entry_reason, exit_reason, \
             entry_order_id, exit_order_id, created_at, closed_at) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19) \
             ON CONFLICT(id) DO UPDATE SET current_price=?10, status=?11, realized_pnl=?12, unrealized_pnl=?13, \
             exit_reason=?15, exit_order_id=?17, closed_at=?19"
        );
        sqlx::query(&query)
            .bind(&position.id)
            .bind(&position.agent_id)
            .bind(&position.symbol)
            .bind(position.side.to_string())
            .bind(position.quantity)
            .bind(position.entry_price)
            .bind(position.allocated_amount)
            .bind(position.stop_loss)
            .bind(position.take_profit)
            .bind(position.current_price)
            .bind(serde_json::to_value(position.status).ok().and_then(|v| v.as_str().map(str::to_string)))
            .bind(position.realized_pnl)
            .bind(position.unrealized_pnl)
            .bind(&position.entry_reason)
            .bind(position.exit_reason.map(|r| r.to_string()))
            .bind(&position.entry_order_id)
            .bind(&position.exit_order_id)
            .bind(position.created_at.to_rfc3339())
            .bind(position.closed_at.map(|t| t.to_rfc3339()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn save_trade(&self, asset_class: WatchlistAssetClass, trade: &Trade) -> sqlx::Result<()> {
        let table = trade_table(asset_class);
        let query = format!(
            "INSERT INTO {table} (id, agent_id, position_id, symbol, side, quantity, price, notional, fees, \
             order_id, order_type, status, pnl, executed_at) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)"
        );
        sqlx::query(&query)
            .bind(&trade.id)
            .bind(&trade.agent_id)
            .bind(&trade.position_id)
            .bind(&trade.symbol)
            .bind(trade.side.to_string())
            .bind(trade.quantity)
            .bind(trade.price)
            .bind(trade.notional)
            .bind(trade.fees)
            .bind(&trade.order_id)
            .bind(trade.order_type.to_string())
            .bind(serde_json::to_value(trade.status).ok().and_then(|v| v.as_str().map(str::to_string)))
            .bind(trade.pnl)
            .bind(trade.executed_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn upsert_watchlist_entry(&self, asset_class: WatchlistAssetClass, entry: &WatchlistEntry) -> sqlx::Result<()> {
        let table = watchlist_table(asset_class);
        let query = format!(
            "INSERT INTO {table} (id, agent_id, symbol, composite_score, technical_score, fundamental_score, \
             momentum_score, entry_price, target_price, stop_loss, entry_trigger, status, analysis, created_at, updated_at) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15) \
             ON CONFLICT(id) DO UPDATE SET composite_score=?4, technical_score=?5, fundamental_score=?6, \
             momentum_score=?7, entry_price=?8, target_price=?9, stop_loss=?10, status=?12, analysis=?13, updated_at=?15"
        );
        sqlx::query(&query)
            .bind(&entry.id)
            .bind(&entry.agent_id)
            .bind(&entry.symbol)
            .bind(entry.scores.composite)
            .bind(entry.scores.technical)
            .bind(entry.scores.fundamental)
            .bind(entry.scores.momentum)
            .bind(entry.entry_price)
            .bind(entry.target_price)
            .bind(entry.stop_loss)
            .bind(entry.entry_trigger.to_string())
            .bind(serde_json::to_value(entry.status).ok().and_then(|v| v.as_str().map(str::to_string)))
            .bind(entry.analysis.to_string())
            .bind(entry.created_at.to_rfc3339())
            .bind(entry.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn save_recommendation(&self, rec: &Recommendation) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO trade_recommendations (id, agent_id, symbol, action, rationale, status, order_id, \
             execution_price, created_at, expires_at, executed_at) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11) \
             ON CONFLICT(id) DO UPDATE SET status=?6, order_id=?7, execution_price=?8, executed_at=?11",
        )
        .bind(&rec.id)
        .bind(&rec.agent_id)
        .bind(&rec.symbol)
        .bind(serde_json::to_value(rec.action).ok().and_then(|v| v.as_str().map(str::to_string)))
        .bind(&rec.rationale)
        .bind(serde_json::to_value(rec.status).ok().and_then(|v| v.as_str().map(str::to_string)))
        .bind(&rec.order_id)
        .bind(rec.execution_price)
        .bind(rec.created_at.to_rfc3339())
        .bind(rec.expires_at.to_rfc3339())
        .bind(rec.executed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// End the previous open regime row and insert the new one atomically —
    /// the one multi-row transaction §4.11 calls out explicitly.
    pub async fn record_regime_change(&self, agent_id: &str, snapshot: &RegimeSnapshot) -> sqlx::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE regimes SET ended_at = ?1 WHERE agent_id = ?2 AND ended_at IS NULL")
            .bind(Utc::now().to_rfc3339())
            .bind(agent_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO regimes (id, agent_id, regime, vix, qqq_price, short_put_strike, recovery_strike, started_at, ended_at) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,NULL)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(agent_id)
        .bind(snapshot.regime.to_string())
        .bind(snapshot.vix)
        .bind(snapshot.qqq_price)
        .bind(snapshot.short_put_strike)
        .bind(snapshot.recovery_strike)
        .bind(snapshot.changed_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn record_agent_metric(&self, agent_id: &str, metric_name: &str, value: f64) -> sqlx::Result<()> {
        sqlx::query("INSERT INTO agent_metrics (id, agent_id, metric_name, value, recorded_at) VALUES (?1,?2,?3,?4,?5)")
            .bind(Uuid::new_v4().to_string())
            .bind(agent_id)
            .bind(metric_name)
            .bind(value)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_system_metric(&self, metric_name: &str, value: f64) -> sqlx::Result<()> {
        sqlx::query("INSERT INTO system_metrics (id, metric_name, value, recorded_at) VALUES (?1,?2,?3,?4)")
            .bind(Uuid::new_v4().to_string())
            .bind(metric_name)
            .bind(value)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
