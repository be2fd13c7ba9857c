// =============================================================================
// Position Engine — tracks open/closed positions and evaluates exits
// =============================================================================
//
// Single-exit model: a position is opened once, tracked while open, and
// closed once, in full, against one of the exit reasons `RiskEngine` decides
// (stop-loss, take-profit, max-hold-time, trailing-stop) or a manual close.
// There is no partial take-profit step — that was the teacher's TP1/TP2
// split, which this system's spec doesn't carry.
//
// Thread-safety: all mutable state is behind `parking_lot::RwLock`, same as
// the teacher's manager.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::risk::RiskEngine;
use crate::types::{ExitReason, PositionStatus};

/// Asset/side discriminator. Crypto positions are always `Long`; equities
/// positions additionally carry the instrument type being held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Stock,
    Call,
    Put,
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Long => "long",
            Self::Stock => "stock",
            Self::Call => "call",
            Self::Put => "put",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub agent_id: String,
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub allocated_amount: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    #[serde(default)]
    pub current_price: f64,
    pub status: PositionStatus,
    #[serde(default)]
    pub realized_pnl: f64,
    #[serde(default)]
    pub unrealized_pnl: f64,
    pub entry_reason: String,
    #[serde(default)]
    pub exit_reason: Option<ExitReason>,
    pub entry_order_id: Option<String>,
    #[serde(default)]
    pub exit_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn held(&self) -> ChronoDuration {
        let end = self.closed_at.unwrap_or_else(Utc::now);
        end - self.created_at
    }
}

pub struct PositionManager {
    open: RwLock<Vec<Position>>,
    closed: RwLock<Vec<Position>>,
}

impl PositionManager {
    pub fn new() -> Self {
        Self {
            open: RwLock::new(Vec::new()),
            closed: RwLock::new(Vec::new()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn open_position(
        &self,
        agent_id: &str,
        symbol: &str,
        side: PositionSide,
        quantity: f64,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
        entry_reason: &str,
        entry_order_id: Option<String>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let position = Position {
            id: id.clone(),
            agent_id: agent_id.to_string(),
            symbol: symbol.to_string(),
            side,
            quantity,
            entry_price,
            allocated_amount: quantity * entry_price,
            stop_loss,
            take_profit,
            current_price: entry_price,
            status: PositionStatus::Open,
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            entry_reason: entry_reason.to_string(),
            exit_reason: None,
            entry_order_id,
            exit_order_id: None,
            created_at: now,
            closed_at: None,
        };
        info!(id = %id, agent_id, symbol, side = %side, quantity, entry_price, "position opened");
        self.open.write().push(position);
        id
    }

    pub fn update_price(&self, symbol: &str, current_price: f64) {
        let mut positions = self.open.write();
        for pos in positions.iter_mut().filter(|p| p.symbol == symbol) {
            pos.current_price = current_price;
            pos.unrealized_pnl = (current_price - pos.entry_price) * pos.quantity;
        }
    }

    /// Evaluate every open position against `risk`'s exit rule. Does not
    /// mutate state; the caller closes positions that come back due.
    pub fn due_for_exit(&self, risk: &RiskEngine) -> Vec<(String, ExitReason)> {
        self.open
            .read()
            .iter()
            .filter_map(|pos| {
                let held = pos
                    .held()
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO);
                let (exit, reason) = risk.should_exit(
                    pos.current_price,
                    pos.entry_price,
                    pos.stop_loss,
                    pos.take_profit,
                    held,
                );
                if exit {
                    reason.map(|r| (pos.id.clone(), r))
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn close_position(
        &self,
        id: &str,
        exit_reason: ExitReason,
        close_price: f64,
        exit_order_id: Option<String>,
    ) -> Option<f64> {
        let mut open = self.open.write();
        let idx = open.iter().position(|p| p.id == id)?;
        let mut pos = open.remove(idx);

        let final_pnl = (close_price - pos.entry_price) * pos.quantity;
        pos.realized_pnl = final_pnl;
        pos.unrealized_pnl = 0.0;
        pos.current_price = close_price;
        pos.status = match exit_reason {
            ExitReason::StopLoss => PositionStatus::StoppedOut,
            ExitReason::TakeProfit => PositionStatus::TargetHit,
            _ => PositionStatus::Closed,
        };
        pos.exit_reason = Some(exit_reason);
        pos.exit_order_id = exit_order_id;
        pos.closed_at = Some(Utc::now());

        let pnl = pos.realized_pnl;
        info!(id, exit_reason = %exit_reason, close_price, realized_pnl = pnl, "position closed");
        self.closed.write().push(pos);
        Some(pnl)
    }

    pub fn get_open_positions(&self) -> Vec<Position> {
        self.open.read().clone()
    }

    pub fn open_for_agent(&self, agent_id: &str) -> Vec<Position> {
        self.open
            .read()
            .iter()
            .filter(|p| p.agent_id == agent_id)
            .cloned()
            .collect()
    }

    /// Total capital deployed across an agent's currently open positions,
    /// the figure `RiskEngine::position_size` needs as `deployed_capital`.
    pub fn deployed_capital(&self, agent_id: &str) -> f64 {
        self.open
            .read()
            .iter()
            .filter(|p| p.agent_id == agent_id)
            .map(|p| p.allocated_amount)
            .sum()
    }

    pub fn open_count(&self, agent_id: &str) -> u32 {
        self.open
            .read()
            .iter()
            .filter(|p| p.agent_id == agent_id)
            .count() as u32
    }

    pub fn get_closed_positions(&self, count: usize) -> Vec<Position> {
        let closed = self.closed.read();
        closed.iter().rev().take(count).cloned().collect()
    }
}

impl Default for PositionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PositionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let open_count = self.open.read().len();
        let closed_count = self.closed.read().len();
        f.debug_struct("PositionManager")
            .field("open_positions", &open_count)
            .field("closed_positions", &closed_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{AssetClass, RiskConfig};
    use std::time::Duration;

    fn risk() -> RiskEngine {
        RiskEngine::new(RiskConfig {
            allocated_capital: 10_000.0,
            stop_loss_pct: 0.08,
            take_profit_pct: 0.20,
            max_hold: Duration::from_secs(3600 * 24 * 5),
            max_positions: 5,
            max_position_pct: 0.25,
            kelly_multiplier: 0.5,
            daily_loss_limit_pct: 0.05,
            asset_class: AssetClass::Crypto,
        })
    }

    #[test]
    fn open_then_close_records_pnl() {
        let pm = PositionManager::new();
        let id = pm.open_position(
            "agent-1",
            "BTC-USD",
            PositionSide::Long,
            1.0,
            100.0,
            92.0,
            120.0,
            "breakout",
            None,
        );
        assert_eq!(pm.open_count("agent-1"), 1);
        let pnl = pm.close_position(&id, ExitReason::TakeProfit, 120.0, None).unwrap();
        assert_eq!(pnl, 20.0);
        assert_eq!(pm.open_count("agent-1"), 0);
        assert_eq!(pm.get_closed_positions(1)[0].status, PositionStatus::TargetHit);
    }

    #[test]
    fn due_for_exit_flags_stop_loss() {
        let pm = PositionManager::new();
        let id = pm.open_position(
            "agent-1",
            "BTC-USD",
            PositionSide::Long,
            1.0,
            100.0,
            92.0,
            120.0,
            "breakout",
            None,
        );
        pm.update_price("BTC-USD", 91.0);
        let due = pm.due_for_exit(&risk());
        assert_eq!(due, vec![(id, ExitReason::StopLoss)]);
    }

    #[test]
    fn deployed_capital_sums_open_positions() {
        let pm = PositionManager::new();
        pm.open_position("agent-1", "BTC-USD", PositionSide::Long, 1.0, 100.0, 92.0, 120.0, "x", None);
        pm.open_position("agent-1", "ETH-USD", PositionSide::Long, 2.0, 50.0, 45.0, 60.0, "x", None);
        assert_eq!(pm.deployed_capital("agent-1"), 200.0);
    }
}
