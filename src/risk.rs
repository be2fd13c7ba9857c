// =============================================================================
// Risk Engine — fractional Kelly sizing, daily loss gate, stop/target, exit rule
// =============================================================================
//
// Position sizing follows the fractional-Kelly criterion: empirical
// win-rate/avg-win/avg-loss from closed-trade history (or asset-class
// defaults when history is empty) feed b=W/L, k=(b*p-(1-p))/b, clamped and
// scaled by `kelly_multiplier`. The daily loss gate and per-trade exit rule
// are evaluated independently of sizing. Kept the teacher's
// `RwLock<Inner>`-behind-immutable-config shape (see the old circuit-breaker
// engine this replaces) since trade history and daily pnl are exactly the
// kind of process-local mutable counters that pattern was built for.

use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::decimal::floor_to_increment;
use crate::types::ExitReason;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Crypto,
    Equities,
}

impl AssetClass {
    fn kelly_ceiling(self) -> f64 {
        match self {
            Self::Crypto => 0.15,
            Self::Equities => 0.25,
        }
    }

    fn default_win_rate(self) -> f64 {
        match self {
            Self::Crypto => 0.45,
            Self::Equities => 0.50,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RiskConfig {
    pub allocated_capital: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub max_hold: Duration,
    pub max_positions: u32,
    pub max_position_pct: f64,
    pub kelly_multiplier: f64,
    pub daily_loss_limit_pct: f64,
    pub asset_class: AssetClass,
}

/// Snapshot of the risk engine's mutable state, serialisable for dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub daily_pnl: f64,
    pub can_open_new: bool,
    pub kelly_fraction: f64,
    pub trade_count: usize,
    pub win_rate: f64,
    pub current_date: String,
}

struct Inner {
    daily_pnl: f64,
    /// pnl_pct per closed trade (positive == win, negative == loss).
    trade_history: Vec<f64>,
    current_date: String,
}

pub struct RiskEngine {
    config: RiskConfig,
    state: RwLock<Inner>,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        info!(
            allocated_capital = config.allocated_capital,
            kelly_multiplier = config.kelly_multiplier,
            daily_loss_limit_pct = config.daily_loss_limit_pct,
            "RiskEngine initialised"
        );
        Self {
            config,
            state: RwLock::new(Inner {
                daily_pnl: 0.0,
                trade_history: Vec::new(),
                current_date: today,
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Trade recording
    // -------------------------------------------------------------------------

    /// Record a closed trade's dollar pnl and percentage pnl, feeding both
    /// the daily loss gate and the Kelly history.
    pub fn record_trade_result(&self, pnl_amount: f64, pnl_pct: f64) {
        self.maybe_reset_daily();
        let mut s = self.state.write();
        s.daily_pnl += pnl_amount;
        s.trade_history.push(pnl_pct);
        debug!(
            pnl_amount,
            pnl_pct,
            daily_pnl = s.daily_pnl,
            trades = s.trade_history.len(),
            "trade result recorded"
        );
    }

    // -------------------------------------------------------------------------
    // Kelly fraction
    // -------------------------------------------------------------------------

    /// Pure Kelly computation: b=W/L, k=(b*p-(1-p))/b, scaled by
    /// `kelly_multiplier` and clamped to [0, min(max_position_pct, ceiling)].
    pub fn kelly_fraction(
        win_rate: f64,
        avg_win: f64,
        avg_loss: f64,
        kelly_multiplier: f64,
        max_position_pct: f64,
        ceiling: f64,
    ) -> f64 {
        if avg_loss <= 0.0 {
            return 0.0;
        }
        let b = avg_win / avg_loss;
        if b <= 0.0 {
            return 0.0;
        }
        let k = (b * win_rate - (1.0 - win_rate)) / b;
        let adjusted = k * kelly_multiplier;
        let cap = max_position_pct.min(ceiling);
        adjusted.clamp(0.0, cap)
    }

    /// Empirical win_rate/avg_win/avg_loss from trade history, or the
    /// asset-class defaults when history is empty. `avg_loss` is floored to
    /// `stop_loss_pct` per §4.6.
    fn trade_stats(&self, s: &Inner) -> (f64, f64, f64) {
        if s.trade_history.is_empty() {
            return (
                self.config.asset_class.default_win_rate(),
                self.config.take_profit_pct,
                self.config.stop_loss_pct,
            );
        }

        let wins: Vec<f64> = s.trade_history.iter().copied().filter(|&p| p > 0.0).collect();
        let losses: Vec<f64> = s.trade_history.iter().copied().filter(|&p| p <= 0.0).collect();

        let win_rate = wins.len() as f64 / s.trade_history.len() as f64;
        let avg_win = if wins.is_empty() {
            self.config.take_profit_pct
        } else {
            wins.iter().sum::<f64>() / wins.len() as f64
        };
        let avg_loss_raw = if losses.is_empty() {
            self.config.stop_loss_pct
        } else {
            losses.iter().map(|l| l.abs()).sum::<f64>() / losses.len() as f64
        };
        let avg_loss = avg_loss_raw.max(self.config.stop_loss_pct);

        (win_rate, avg_win, avg_loss)
    }

    /// Current Kelly fraction from live history/defaults.
    pub fn current_kelly_fraction(&self) -> f64 {
        self.maybe_reset_daily();
        let s = self.state.read();
        let (p, w, l) = self.trade_stats(&s);
        Self::kelly_fraction(
            p,
            w,
            l,
            self.config.kelly_multiplier,
            self.config.max_position_pct,
            self.config.asset_class.kelly_ceiling(),
        )
    }

    // -------------------------------------------------------------------------
    // Position sizing
    // -------------------------------------------------------------------------

    /// Size a new position. Returns the floored quantity, or an `Err` with a
    /// human-readable rejection reason.
    #[allow(clippy::too_many_arguments)]
    pub fn position_size(
        &self,
        entry_price: f64,
        stop: Option<f64>,
        deployed_capital: f64,
        open_positions: u32,
        quantity_increment: f64,
    ) -> Result<f64, String> {
        if open_positions >= self.config.max_positions {
            return Err(format!(
                "max open positions reached ({open_positions}/{})",
                self.config.max_positions
            ));
        }

        let available = self.config.allocated_capital - deployed_capital;
        if available <= 0.0 {
            return Err("no capital available for a new position".to_string());
        }

        let k = self.current_kelly_fraction();
        let kelly_amount = self.config.allocated_capital * k;

        let mut candidates = vec![
            kelly_amount,
            self.config.allocated_capital * self.config.max_position_pct,
            available,
        ];
        if let Some(stop_price) = stop {
            let risk_fraction = (entry_price - stop_price).abs() / entry_price;
            if risk_fraction > 0.0 {
                let risk_amount = (self.config.allocated_capital * 0.02) / risk_fraction;
                candidates.push(risk_amount);
            }
        }

        let position = candidates.into_iter().fold(f64::INFINITY, f64::min);
        if !position.is_finite() || position <= 0.0 {
            return Err("sized position is non-positive".to_string());
        }

        let quantity = floor_to_increment(position / entry_price, quantity_increment)
            .to_f64()
            .unwrap_or(0.0);

        if quantity <= 0.0 {
            return Err("sized quantity rounds to zero at this increment".to_string());
        }

        Ok(quantity)
    }

    // -------------------------------------------------------------------------
    // Stop / target / exit
    // -------------------------------------------------------------------------

    /// stop = entry*(1-stop_loss_pct), or entry-2*ATR if supplied.
    /// target = entry + 2.5*(entry-stop), a 2.5:1 risk-reward off the stop.
    pub fn stop_target(&self, entry: f64, atr: Option<f64>) -> (f64, f64) {
        let stop = match atr {
            Some(atr) => entry - 2.0 * atr,
            None => entry * (1.0 - self.config.stop_loss_pct),
        };
        let target = entry + 2.5 * (entry - stop);
        (stop, target)
    }

    /// Evaluate the five-branch exit priority list.
    pub fn should_exit(
        &self,
        price: f64,
        entry: f64,
        stop: f64,
        target: f64,
        held: Duration,
    ) -> (bool, Option<ExitReason>) {
        if price <= stop {
            return (true, Some(ExitReason::StopLoss));
        }
        if price >= target {
            return (true, Some(ExitReason::TakeProfit));
        }
        if held >= self.config.max_hold {
            return (true, Some(ExitReason::MaxHoldTime));
        }
        let pnl_pct = (price - entry) / entry;
        if pnl_pct > 0.15 && price <= entry * 1.01 {
            return (true, Some(ExitReason::TrailingStop));
        }
        (false, None)
    }

    // -------------------------------------------------------------------------
    // Daily loss gate
    // -------------------------------------------------------------------------

    pub fn allocated_capital(&self) -> f64 {
        self.config.allocated_capital
    }

    /// daily_pnl <= -allocated*daily_loss_limit_pct => trading disabled.
    pub fn can_open_new(&self) -> bool {
        self.maybe_reset_daily();
        let s = self.state.read();
        let threshold = -self.config.allocated_capital * self.config.daily_loss_limit_pct;
        s.daily_pnl > threshold
    }

    // -------------------------------------------------------------------------
    // State snapshot / daily reset
    // -------------------------------------------------------------------------

    pub fn get_state(&self) -> RiskState {
        self.maybe_reset_daily();
        let s = self.state.read();
        let (win_rate, ..) = self.trade_stats(&s);
        RiskState {
            daily_pnl: s.daily_pnl,
            can_open_new: self.can_open_new(),
            kelly_fraction: self.current_kelly_fraction(),
            trade_count: s.trade_history.len(),
            win_rate: if s.trade_history.is_empty() { 0.0 } else { win_rate },
            current_date: s.current_date.clone(),
        }
    }

    pub fn reset_daily(&self) {
        let mut s = self.state.write();
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        s.daily_pnl = 0.0;
        s.current_date = today.clone();
        info!(date = %today, "daily risk counters reset (manual)");
    }

    fn maybe_reset_daily(&self) {
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        {
            let s = self.state.read();
            if s.current_date == today {
                return;
            }
        }
        let mut s = self.state.write();
        if s.current_date != today {
            info!(old_date = %s.current_date, new_date = %today, "date rolled — resetting daily pnl");
            s.daily_pnl = 0.0;
            s.current_date = today;
        }
    }
}

impl std::fmt::Debug for RiskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskEngine")
            .field("allocated_capital", &self.config.allocated_capital)
            .field("max_positions", &self.config.max_positions)
            .field("max_position_pct", &self.config.max_position_pct)
            .field("kelly_multiplier", &self.config.kelly_multiplier)
            .field("daily_loss_limit_pct", &self.config.daily_loss_limit_pct)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equities_config() -> RiskConfig {
        RiskConfig {
            allocated_capital: 10_000.0,
            stop_loss_pct: 0.08,
            take_profit_pct: 0.20,
            max_hold: Duration::from_secs(7 * 24 * 3600),
            max_positions: 10,
            max_position_pct: 0.25,
            kelly_multiplier: 0.5,
            daily_loss_limit_pct: 0.05,
            asset_class: AssetClass::Equities,
        }
    }

    // S1: Kelly sizing, kelly_amount=2200.
    #[test]
    fn s1_kelly_sizing() {
        let k = RiskEngine::kelly_fraction(0.6, 0.20, 0.08, 0.5, 0.25, 0.25);
        assert!((k - 0.22).abs() < 1e-9);
        let kelly_amount = 10_000.0 * k;
        assert!((kelly_amount - 2200.0).abs() < 1e-6);
    }

    #[test]
    fn kelly_no_edge_is_zero() {
        // p=0.5, W=L => b=1, k=(1*0.5-0.5)/1=0.
        let k = RiskEngine::kelly_fraction(0.5, 0.08, 0.08, 0.5, 0.25, 0.25);
        assert!(k.abs() < 1e-12);
    }

    // S2: stop=92.00, target=120.00; should_exit boundary checks.
    #[test]
    fn s2_stop_target_and_exit() {
        let engine = RiskEngine::new(equities_config());
        let (stop, target) = engine.stop_target(100.0, None);
        assert!((stop - 92.0).abs() < 1e-9);
        assert!((target - 120.0).abs() < 1e-9);

        let (exit, reason) = engine.should_exit(91.99, 100.0, stop, target, Duration::ZERO);
        assert!(exit);
        assert_eq!(reason, Some(ExitReason::StopLoss));

        let (exit, reason) = engine.should_exit(120.00, 100.0, stop, target, Duration::ZERO);
        assert!(exit);
        assert_eq!(reason, Some(ExitReason::TakeProfit));
    }

    // S3: daily gate boundary at exactly -250.00 vs -249.99.
    #[test]
    fn s3_daily_loss_gate_boundary() {
        let config = RiskConfig {
            allocated_capital: 5_000.0,
            daily_loss_limit_pct: 0.05,
            ..equities_config()
        };
        let engine = RiskEngine::new(config);

        engine.record_trade_result(-250.00, -0.05);
        assert!(!engine.can_open_new(), "exactly -250.00 must hit the gate");
    }

    #[test]
    fn s3_daily_loss_gate_just_under_limit() {
        let config = RiskConfig {
            allocated_capital: 5_000.0,
            daily_loss_limit_pct: 0.05,
            ..equities_config()
        };
        let engine = RiskEngine::new(config);

        engine.record_trade_result(-249.99, -0.05);
        assert!(engine.can_open_new(), "-249.99 must not hit the gate");
    }

    #[test]
    fn position_size_rejects_at_max_positions() {
        let engine = RiskEngine::new(equities_config());
        let result = engine.position_size(100.0, Some(92.0), 0.0, 10, 1.0);
        assert!(result.is_err());
    }

    #[test]
    fn position_size_rejects_zero_available_capital() {
        let engine = RiskEngine::new(equities_config());
        let result = engine.position_size(100.0, Some(92.0), 10_000.0, 0, 1.0);
        assert!(result.is_err());
    }

    #[test]
    fn position_size_produces_positive_quantity_with_history_defaults() {
        let engine = RiskEngine::new(equities_config());
        let result = engine.position_size(100.0, Some(92.0), 0.0, 0, 1.0);
        assert!(result.is_ok());
        assert!(result.unwrap() > 0.0);
    }

    #[test]
    fn boundary_tiny_quantity_increment_rejected() {
        let engine = RiskEngine::new(RiskConfig {
            allocated_capital: 1.0,
            ..equities_config()
        });
        // Entry price absurdly high so the sized notional is far below one
        // increment at this tiny allocation.
        let result = engine.position_size(100_000_000.0, None, 0.0, 0, 1e-8);
        assert!(result.is_err());
    }
}
