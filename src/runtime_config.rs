// =============================================================================
// Runtime Configuration — per-agent-kind tunables with atomic save
// =============================================================================
//
// Each agent kind gets its own typed config struct instead of one flat
// bag of fields; `RuntimeConfig` is the on-disk envelope holding one of
// each plus the process-wide DRY_RUN toggle. Persistence keeps the
// teacher's atomic tmp+rename write and `#[serde(default)]` forward
// compatibility discipline.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

fn default_true() -> bool {
    true
}

fn default_crypto_coins() -> Vec<String> {
    vec![
        "BTC-USD".to_string(),
        "ETH-USD".to_string(),
        "SOL-USD".to_string(),
        "XRP-USD".to_string(),
        "ADA-USD".to_string(),
    ]
}

fn default_equities_universe() -> Vec<String> {
    vec![
        "AAPL".to_string(),
        "MSFT".to_string(),
        "NVDA".to_string(),
        "AMZN".to_string(),
        "GOOGL".to_string(),
    ]
}

fn default_crypto_scan_interval() -> u32 {
    15
}

fn default_equities_scan_interval() -> u32 {
    60
}

fn default_min_composite_score() -> f64 {
    60.0
}

fn default_max_watchlist() -> usize {
    20
}

fn default_entry_score_threshold() -> f64 {
    70.0
}

fn default_equities_immediate_entry_score() -> f64 {
    75.0
}

fn default_max_position_pct() -> f64 {
    0.15
}

fn default_kelly_multiplier() -> f64 {
    0.5
}

fn default_daily_loss_limit_pct() -> f64 {
    0.05
}

fn default_stop_loss_pct() -> f64 {
    0.08
}

fn default_take_profit_pct() -> f64 {
    0.20
}

fn default_max_positions() -> u32 {
    5
}

fn default_max_hold_hours() -> u32 {
    120
}

fn default_allocated_capital() -> f64 {
    10_000.0
}

fn default_order_timeout_secs() -> u64 {
    60
}

fn default_limit_offset_pct() -> f64 {
    0.001
}

fn default_vix_shutdown_threshold() -> f64 {
    45.0
}

fn default_recommendation_ttl_hours() -> i64 {
    4
}

fn default_target_short_delta() -> f64 {
    0.16
}

fn default_spread_width() -> f64 {
    5.0
}

fn default_min_days_to_expiration() -> u32 {
    5
}

fn default_max_days_to_expiration() -> u32 {
    10
}

fn default_max_position_pct_per_trade() -> f64 {
    0.05
}

/// Shared sizing/risk tunables every agent kind carries, reused directly as
/// `risk::RiskConfig`'s inputs once the agent's allocated capital is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskTunables {
    #[serde(default = "default_allocated_capital")]
    pub allocated_capital: f64,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    #[serde(default = "default_max_hold_hours")]
    pub max_hold_hours: u32,
    #[serde(default = "default_max_positions")]
    pub max_positions: u32,
    #[serde(default = "default_kelly_multiplier")]
    pub kelly_multiplier: f64,
    #[serde(default = "default_daily_loss_limit_pct")]
    pub daily_loss_limit_pct: f64,
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: f64,
}

/// Config shared by both hunter agent kinds (crypto + equities).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HunterTunables {
    #[serde(default = "default_true")]
    pub auto_trade: bool,
    #[serde(default = "default_min_composite_score")]
    pub min_composite_score: f64,
    #[serde(default = "default_max_watchlist")]
    pub max_watchlist: usize,
    #[serde(default = "default_entry_score_threshold")]
    pub entry_score_threshold: f64,
    #[serde(default = "default_order_timeout_secs")]
    pub order_timeout_secs: u64,
    #[serde(default = "default_limit_offset_pct")]
    pub limit_offset_pct: f64,
    #[serde(default)]
    pub risk: RiskTunables,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoHunterConfig {
    #[serde(default = "default_crypto_coins")]
    pub coins: Vec<String>,
    #[serde(default)]
    pub exclude_coins: Vec<String>,
    #[serde(default = "default_crypto_scan_interval")]
    pub scan_interval_minutes: u32,
    #[serde(flatten)]
    pub hunter: HunterTunables,
}

impl Default for CryptoHunterConfig {
    fn default() -> Self {
        Self {
            coins: default_crypto_coins(),
            exclude_coins: Vec::new(),
            scan_interval_minutes: default_crypto_scan_interval(),
            hunter: HunterTunables {
                auto_trade: true,
                min_composite_score: default_min_composite_score(),
                max_watchlist: default_max_watchlist(),
                entry_score_threshold: default_entry_score_threshold(),
                order_timeout_secs: default_order_timeout_secs(),
                limit_offset_pct: default_limit_offset_pct(),
                risk: RiskTunables::default_for(0.15),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GemHunterConfig {
    #[serde(default = "default_equities_universe")]
    pub universe: Vec<String>,
    #[serde(default = "default_equities_scan_interval")]
    pub scan_interval_minutes: u32,
    #[serde(default = "default_equities_immediate_entry_score")]
    pub immediate_entry_score: f64,
    #[serde(flatten)]
    pub hunter: HunterTunables,
}

impl Default for GemHunterConfig {
    fn default() -> Self {
        Self {
            universe: default_equities_universe(),
            scan_interval_minutes: default_equities_scan_interval(),
            immediate_entry_score: default_equities_immediate_entry_score(),
            hunter: HunterTunables {
                auto_trade: true,
                min_composite_score: default_min_composite_score(),
                max_watchlist: default_max_watchlist(),
                entry_score_threshold: default_entry_score_threshold(),
                order_timeout_secs: default_order_timeout_secs(),
                limit_offset_pct: default_limit_offset_pct(),
                risk: RiskTunables::default_for(0.25),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_vix_shutdown_threshold")]
    pub vix_shutdown_threshold: f64,
    #[serde(default = "default_recommendation_ttl_hours")]
    pub recommendation_ttl_hours: i64,
    /// Target short-leg delta `find_put_spread` searches around.
    #[serde(default = "default_target_short_delta")]
    pub target_short_delta: f64,
    #[serde(default = "default_spread_width")]
    pub spread_width: f64,
    #[serde(default = "default_min_days_to_expiration")]
    pub min_days_to_expiration: u32,
    #[serde(default = "default_max_days_to_expiration")]
    pub max_days_to_expiration: u32,
    /// Fraction of the equities agent's allocated capital a single
    /// recommended spread's max risk is sized against.
    #[serde(default = "default_max_position_pct_per_trade")]
    pub max_position_pct_per_trade: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            vix_shutdown_threshold: default_vix_shutdown_threshold(),
            recommendation_ttl_hours: default_recommendation_ttl_hours(),
            target_short_delta: default_target_short_delta(),
            spread_width: default_spread_width(),
            min_days_to_expiration: default_min_days_to_expiration(),
            max_days_to_expiration: default_max_days_to_expiration(),
            max_position_pct_per_trade: default_max_position_pct_per_trade(),
        }
    }
}

impl RiskTunables {
    fn default_for(max_position_pct: f64) -> Self {
        Self {
            max_position_pct,
            ..Self::default()
        }
    }
}

impl Default for RiskTunables {
    fn default() -> Self {
        Self {
            allocated_capital: default_allocated_capital(),
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            max_hold_hours: default_max_hold_hours(),
            max_positions: default_max_positions(),
            kelly_multiplier: default_kelly_multiplier(),
            daily_loss_limit_pct: default_daily_loss_limit_pct(),
            max_position_pct: default_max_position_pct(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub crypto_hunter: CryptoHunterConfig,
    #[serde(default)]
    pub gem_hunter: GemHunterConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl RuntimeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;
        info!(path = %path.display(), dry_run = config.dry_run, "runtime config loaded");
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).context("failed to serialise runtime config to JSON")?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;
        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crypto_defaults_use_15m_scan_and_15pct_ceiling() {
        let cfg = CryptoHunterConfig::default();
        assert_eq!(cfg.scan_interval_minutes, 15);
        assert!((cfg.hunter.risk.max_position_pct - 0.15).abs() < 1e-9);
    }

    #[test]
    fn equities_defaults_use_60m_scan_and_25pct_ceiling() {
        let cfg = GemHunterConfig::default();
        assert_eq!(cfg.scan_interval_minutes, 60);
        assert!((cfg.hunter.risk.max_position_pct - 0.25).abs() < 1e-9);
        assert!((cfg.immediate_entry_score - 75.0).abs() < 1e-9);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert!(!cfg.dry_run);
        assert_eq!(cfg.crypto_hunter.coins[0], "BTC-USD");
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.crypto_hunter.coins, cfg2.crypto_hunter.coins);
        assert_eq!(cfg.gem_hunter.universe, cfg2.gem_hunter.universe);
    }
}
