// =============================================================================
// Trade — immutable record of a single fill
// =============================================================================
//
// Trades are never mutated once recorded; a closing trade references the
// position it closes via `position_id` and carries the realised pnl for that
// fill. The ledger itself is a simple append-only store, mirroring the
// teacher's `PositionManager` split between live and historical state but
// without any in-place mutation.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{OrderKind, OrderStatus, Side};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub agent_id: String,
    pub position_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub notional: f64,
    pub fees: f64,
    pub order_id: Option<String>,
    pub order_type: OrderKind,
    pub status: OrderStatus,
    pub pnl: Option<f64>,
    pub executed_at: DateTime<Utc>,
}

pub struct TradeLedger {
    trades: RwLock<Vec<Trade>>,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self {
            trades: RwLock::new(Vec::new()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        agent_id: &str,
        position_id: Option<String>,
        symbol: &str,
        side: Side,
        quantity: f64,
        price: f64,
        fees: f64,
        order_id: Option<String>,
        order_type: OrderKind,
        status: OrderStatus,
        pnl: Option<f64>,
    ) -> Trade {
        let trade = Trade {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            position_id,
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
            notional: quantity * price,
            fees,
            order_id,
            order_type,
            status,
            pnl,
            executed_at: Utc::now(),
        };
        self.trades.write().push(trade.clone());
        trade
    }

    pub fn for_agent(&self, agent_id: &str) -> Vec<Trade> {
        self.trades
            .read()
            .iter()
            .filter(|t| t.agent_id == agent_id)
            .cloned()
            .collect()
    }

    pub fn for_position(&self, position_id: &str) -> Vec<Trade> {
        self.trades
            .read()
            .iter()
            .filter(|t| t.position_id.as_deref() == Some(position_id))
            .cloned()
            .collect()
    }

    pub fn recent(&self, count: usize) -> Vec<Trade> {
        let trades = self.trades.read();
        trades.iter().rev().take(count).cloned().collect()
    }
}

impl Default for TradeLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TradeLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeLedger")
            .field("trades", &self.trades.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_computes_notional() {
        let ledger = TradeLedger::new();
        let trade = ledger.record(
            "agent-1",
            Some("pos-1".to_string()),
            "BTC-USD",
            Side::Buy,
            0.5,
            100.0,
            0.1,
            Some("order-1".to_string()),
            OrderKind::Market,
            OrderStatus::Filled,
            None,
        );
        assert_eq!(trade.notional, 50.0);
    }

    #[test]
    fn for_position_filters_correctly() {
        let ledger = TradeLedger::new();
        ledger.record(
            "agent-1",
            Some("pos-1".to_string()),
            "BTC-USD",
            Side::Buy,
            1.0,
            100.0,
            0.0,
            None,
            OrderKind::Market,
            OrderStatus::Filled,
            None,
        );
        ledger.record(
            "agent-1",
            Some("pos-2".to_string()),
            "ETH-USD",
            Side::Buy,
            1.0,
            100.0,
            0.0,
            None,
            OrderKind::Market,
            OrderStatus::Filled,
            None,
        );
        assert_eq!(ledger.for_position("pos-1").len(), 1);
    }

    #[test]
    fn recent_returns_newest_first() {
        let ledger = TradeLedger::new();
        ledger.record(
            "agent-1", None, "BTC-USD", Side::Buy, 1.0, 100.0, 0.0, None,
            OrderKind::Market, OrderStatus::Filled, None,
        );
        ledger.record(
            "agent-1", None, "ETH-USD", Side::Buy, 1.0, 100.0, 0.0, None,
            OrderKind::Market, OrderStatus::Filled, None,
        );
        let recent = ledger.recent(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].symbol, "ETH-USD");
    }
}
