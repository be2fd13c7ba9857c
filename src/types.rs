// =============================================================================
// Shared domain types used across the trading engine
// =============================================================================
//
// Enums and small value types referenced from more than one module. Entity
// structs that belong to a single subsystem (Position, Trade, Watchlist
// entry, Regime, Recommendation, Activity) live next to the code that owns
// them; this file only holds the vocabulary shared across subsystem
// boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which family of venue an agent trades through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    CryptoHunter,
    GemHunter,
    Orchestrator,
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CryptoHunter => write!(f, "crypto_hunter"),
            Self::GemHunter => write!(f, "gem_hunter"),
            Self::Orchestrator => write!(f, "orchestrator"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Running,
    Paused,
    Error,
    Stopped,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Error => "error",
            Self::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Market,
    Limit,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "market"),
            Self::Limit => write!(f, "limit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

/// Order status as reported by `BrokerAdapter::get_order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Submitted,
    Open,
    Filled,
    PartiallyFilled,
    Cancelled,
    Rejected,
    Failed,
}

impl OrderStatus {
    /// Terminal statuses are the ones the executor's fill-wait loop stops on.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::PartiallyFilled | Self::Cancelled | Self::Rejected | Self::Failed
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Open => "open",
            Self::Filled => "filled",
            Self::PartiallyFilled => "partially_filled",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryTrigger {
    Immediate,
    Breakout,
    Pullback,
    VolumeSurge,
    Manual,
}

impl fmt::Display for EntryTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Immediate => "immediate",
            Self::Breakout => "breakout",
            Self::Pullback => "pullback",
            Self::VolumeSurge => "volume_surge",
            Self::Manual => "manual",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchlistStatus {
    Watching,
    Triggered,
    Entered,
    Expired,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed,
    StoppedOut,
    TargetHit,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    MaxHoldTime,
    TrailingStop,
    Manual,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StopLoss => "stop_loss",
            Self::TakeProfit => "take_profit",
            Self::MaxHoldTime => "max_hold_time",
            Self::TrailingStop => "trailing_stop",
            Self::Manual => "manual",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeType {
    NormalBull,
    DefenseTrigger,
    RecoveryMode,
    RecoveryComplete,
}

impl fmt::Display for RegimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NormalBull => "normal_bull",
            Self::DefenseTrigger => "defense_trigger",
            Self::RecoveryMode => "recovery_mode",
            Self::RecoveryComplete => "recovery_complete",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationAction {
    OpenPutSpread,
    ClosePutSpread,
    OpenCallSpread,
    OpenLongCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    CycleBegin,
    CycleEnd,
    MarketClosed,
    TradeSignal,
    OrderPlaced,
    OrderFilled,
    OrderCancelled,
    PositionOpened,
    PositionClosed,
    StopTriggered,
    TargetHit,
    Error,
    Warning,
    Info,
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CycleBegin => "cycle_begin",
            Self::CycleEnd => "cycle_end",
            Self::MarketClosed => "market_closed",
            Self::TradeSignal => "trade_signal",
            Self::OrderPlaced => "order_placed",
            Self::OrderFilled => "order_filled",
            Self::OrderCancelled => "order_cancelled",
            Self::PositionOpened => "position_opened",
            Self::PositionClosed => "position_closed",
            Self::StopTriggered => "stop_triggered",
            Self::TargetHit => "target_hit",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        };
        write!(f, "{s}")
    }
}

/// Trend direction produced by the indicator-composition analysers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bullish => write!(f, "bullish"),
            Self::Bearish => write!(f, "bearish"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_terminal_set() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::PartiallyFilled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Submitted.is_terminal());
        assert!(!OrderStatus::Open.is_terminal());
    }

    #[test]
    fn agent_kind_display() {
        assert_eq!(AgentKind::CryptoHunter.to_string(), "crypto_hunter");
        assert_eq!(AgentKind::GemHunter.to_string(), "gem_hunter");
        assert_eq!(AgentKind::Orchestrator.to_string(), "orchestrator");
    }
}
