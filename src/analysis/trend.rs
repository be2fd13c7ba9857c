// =============================================================================
// TrendAnalyzer / ScreenerAnalyzer
// =============================================================================
//
// Composes the indicator kit into a single `TrendAnalysis`: a direction, a
// strength, a 0-100 score, and the raw indicator values behind them. The
// equities screener layers named "plays" and extra factors (52-week
// distance, MA alignment, volume ratio, P/E bands, growth tiers) on top of
// the same composite, grounded on the teacher's `strategy.rs` pipeline shape
// (gather → indicators → score → signals) generalised to the two asset
// families the spec names.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::indicators::bollinger::{calculate_bollinger, BollingerResult};
use crate::indicators::ema::{calculate_ema, ema_trend_aligned};
use crate::indicators::macd::{calculate_macd_default, MacdResult};
use crate::indicators::rsi::current_rsi;
use crate::indicators::support_resistance::find_support_resistance;
use crate::types::Direction;

const MIN_POINTS: usize = 20;
const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;
const BB_POSITION_BULLISH: f64 = 0.2;
const BB_POSITION_BEARISH: f64 = 0.8;

#[derive(Debug, Clone, Serialize)]
pub struct TrendAnalysis {
    pub direction: Direction,
    pub strength: f64,
    pub score: f64,
    pub ema_9: Option<f64>,
    pub ema_21: Option<f64>,
    pub ema_55: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<MacdResult>,
    pub bollinger: Option<BollingerResult>,
    pub support: Vec<f64>,
    pub resistance: Vec<f64>,
    pub signals: Vec<String>,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

impl TrendAnalysis {
    fn insufficient_data() -> Self {
        Self {
            direction: Direction::Neutral,
            strength: 0.0,
            score: 50.0,
            ema_9: None,
            ema_21: None,
            ema_55: None,
            rsi: None,
            macd: None,
            bollinger: None,
            support: Vec::new(),
            resistance: Vec::new(),
            signals: Vec::new(),
            summary: "insufficient data".to_string(),
            timestamp: Utc::now(),
        }
    }
}

pub struct TrendAnalyzer;

impl TrendAnalyzer {
    /// Compute a `TrendAnalysis` from an oldest→newest close-price series.
    pub fn analyze(prices: &[f64]) -> TrendAnalysis {
        if prices.len() < MIN_POINTS {
            return TrendAnalysis::insufficient_data();
        }

        let mut signals: Vec<String> = Vec::new();
        let mut bull_count: u32 = 0;
        let mut bear_count: u32 = 0;

        let rsi = current_rsi(prices, 14).map(|(v, _)| v);
        if let Some(rsi_val) = rsi {
            if rsi_val <= RSI_OVERSOLD {
                bull_count += 1;
                signals.push(format!("RSI oversold ({rsi_val:.1})"));
            } else if rsi_val >= RSI_OVERBOUGHT {
                bear_count += 1;
                signals.push(format!("RSI overbought ({rsi_val:.1})"));
            }
        }

        let bollinger = calculate_bollinger(prices, 20, 2.0);
        if let Some(bb) = &bollinger {
            let range = bb.upper - bb.lower;
            if range > 0.0 {
                let position = (prices.last().copied().unwrap_or(bb.middle) - bb.lower) / range;
                if position < BB_POSITION_BULLISH {
                    bull_count += 1;
                    signals.push(format!("Bollinger position low ({position:.2})"));
                } else if position > BB_POSITION_BEARISH {
                    bear_count += 1;
                    signals.push(format!("Bollinger position high ({position:.2})"));
                }
            }
        }

        if let Some((is_bullish, strength)) = ema_trend_aligned(prices) {
            if is_bullish {
                bull_count += 1;
                signals.push(format!("EMA stack bullish aligned (strength {strength:.3})"));
            } else {
                bear_count += 1;
                signals.push(format!("EMA stack bearish aligned (strength {strength:.3})"));
            }
        }

        let macd = calculate_macd_default(prices);
        if let Some(m) = &macd {
            if m.histogram > 0.0 {
                bull_count += 1;
                signals.push("MACD histogram positive".to_string());
            } else if m.histogram < 0.0 {
                bear_count += 1;
                signals.push("MACD histogram negative".to_string());
            }
        }

        let total = bull_count + bear_count;
        let (direction, strength, score) = if total == 0 {
            (Direction::Neutral, 0.0, 50.0)
        } else {
            let direction = match bull_count.cmp(&bear_count) {
                std::cmp::Ordering::Greater => Direction::Bullish,
                std::cmp::Ordering::Less => Direction::Bearish,
                std::cmp::Ordering::Equal => Direction::Neutral,
            };
            let strength = (bull_count.max(bear_count) as f64 / total as f64) * 100.0;
            let base_score = 50.0 + (bull_count as f64 / total as f64 - 0.5) * 100.0;
            let score = (base_score * (0.5 + strength / 200.0)).clamp(0.0, 100.0);
            (direction, strength, score)
        };

        let (support, resistance) = find_support_resistance(prices, 3);

        let ema_9 = calculate_ema(prices, 9).last().copied();
        let ema_21 = calculate_ema(prices, 21).last().copied();
        let ema_55 = calculate_ema(prices, 55).last().copied();

        let summary = format!(
            "{direction} trend, score {score:.1}, {} signal(s)",
            signals.len()
        );

        TrendAnalysis {
            direction,
            strength,
            score,
            ema_9,
            ema_21,
            ema_55,
            rsi,
            macd,
            bollinger,
            support,
            resistance,
            signals,
            summary,
            timestamp: Utc::now(),
        }
    }
}

/// Screened equity row: the bits of fundamental context the named plays
/// filter over, alongside the composite trend analysis.
#[derive(Debug, Clone)]
pub struct ScreenerRow {
    pub symbol: String,
    pub price: f64,
    pub sma_20: f64,
    pub sma_50: f64,
    pub sma_200: f64,
    pub high_52w: f64,
    pub low_52w: f64,
    pub volume_ratio: f64,
    pub pe_ratio: Option<f64>,
    pub revenue_growth: f64,
    pub rsi: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Play {
    OversoldGem,
    Breakout,
    Value,
    Momentum,
}

impl std::fmt::Display for Play {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OversoldGem => "oversold_gem",
            Self::Breakout => "breakout",
            Self::Value => "value",
            Self::Momentum => "momentum",
        };
        write!(f, "{s}")
    }
}

pub struct ScreenerAnalyzer;

impl ScreenerAnalyzer {
    fn pct_below_high(row: &ScreenerRow) -> f64 {
        if row.high_52w <= 0.0 {
            return 0.0;
        }
        (row.high_52w - row.price) / row.high_52w * 100.0
    }

    fn pct_above_low(row: &ScreenerRow) -> f64 {
        if row.low_52w <= 0.0 {
            return 0.0;
        }
        (row.price - row.low_52w) / row.low_52w * 100.0
    }

    fn ma_aligned(row: &ScreenerRow) -> bool {
        row.price > row.sma_20 && row.sma_20 > row.sma_50 && row.sma_50 > row.sma_200
    }

    /// §4.4's "oversold gem": RSI<35 ∧ price>SMA200 ∧ volume_ratio>1.5.
    pub fn is_oversold_gem(row: &ScreenerRow) -> bool {
        row.rsi < 35.0 && row.price > row.sma_200 && row.volume_ratio > 1.5
    }

    /// §4.4's "breakout": within 5% of 52w high ∧ 50<RSI<70 ∧ volume_ratio>2.0
    /// ∧ price>SMA20 ∧ price>SMA50.
    pub fn is_breakout(row: &ScreenerRow) -> bool {
        Self::pct_below_high(row) <= 5.0
            && row.rsi > 50.0
            && row.rsi < 70.0
            && row.volume_ratio > 2.0
            && row.price > row.sma_20
            && row.price > row.sma_50
    }

    /// §4.4's "value": (P/E unset ∨ <20) ∧ revenue_growth>0.10 ∧ >15% below
    /// high ∧ RSI<50.
    pub fn is_value(row: &ScreenerRow) -> bool {
        row.pe_ratio.map(|pe| pe < 20.0).unwrap_or(true)
            && row.revenue_growth > 0.10
            && Self::pct_below_high(row) > 15.0
            && row.rsi < 50.0
    }

    /// §4.4's "momentum": price>SMA20>SMA50>SMA200 ∧ 55<RSI<75 ∧
    /// volume_ratio>1.5 ∧ >20% above 52w low.
    pub fn is_momentum(row: &ScreenerRow) -> bool {
        Self::ma_aligned(row)
            && row.rsi > 55.0
            && row.rsi < 75.0
            && row.volume_ratio > 1.5
            && Self::pct_above_low(row) > 20.0
    }

    /// All plays a row qualifies for.
    pub fn plays_for(row: &ScreenerRow) -> Vec<Play> {
        let mut plays = Vec::new();
        if Self::is_oversold_gem(row) {
            plays.push(Play::OversoldGem);
        }
        if Self::is_breakout(row) {
            plays.push(Play::Breakout);
        }
        if Self::is_value(row) {
            plays.push(Play::Value);
        }
        if Self::is_momentum(row) {
            plays.push(Play::Momentum);
        }
        plays
    }

    /// De-duplicated candidate set: every symbol that qualifies for at least
    /// one play, union across all rows.
    pub fn screen(rows: &[ScreenerRow]) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for row in rows {
            if !Self::plays_for(row).is_empty() && seen.insert(row.symbol.clone()) {
                out.push(row.symbol.clone());
            }
        }
        out
    }

    /// Extra equities scoring factors from §4.4 (MA alignment +25, volume
    /// ratio tiers, applied on top of the base trend composite).
    pub fn extra_score(row: &ScreenerRow) -> f64 {
        let mut bonus = 0.0;
        if Self::ma_aligned(row) {
            bonus += 25.0;
        }
        if row.volume_ratio > 2.0 {
            bonus += 15.0;
        } else if row.volume_ratio > 1.0 {
            bonus += 5.0;
        } else {
            bonus -= 5.0;
        }
        bonus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ascending(n: usize) -> Vec<f64> {
        (1..=n).map(|i| i as f64).collect()
    }

    #[test]
    fn insufficient_data_boundary_19_points() {
        let prices = ascending(19);
        let analysis = TrendAnalyzer::analyze(&prices);
        assert_eq!(analysis.score, 50.0);
        assert_eq!(analysis.direction, Direction::Neutral);
        assert!(analysis.signals.is_empty());
    }

    #[test]
    fn sufficient_data_produces_analysis() {
        let prices = ascending(200);
        let analysis = TrendAnalyzer::analyze(&prices);
        assert!(analysis.score >= 0.0 && analysis.score <= 100.0);
    }

    #[test]
    fn flat_series_has_no_signals() {
        let prices = vec![100.0; 60];
        let analysis = TrendAnalyzer::analyze(&prices);
        assert_eq!(analysis.direction, Direction::Neutral);
        assert_eq!(analysis.score, 50.0);
    }

    #[test]
    fn oversold_gem_play() {
        let row = ScreenerRow {
            symbol: "ABC".into(),
            price: 50.0,
            sma_20: 48.0,
            sma_50: 47.0,
            sma_200: 45.0,
            high_52w: 60.0,
            low_52w: 40.0,
            volume_ratio: 2.0,
            pe_ratio: Some(15.0),
            revenue_growth: 0.2,
            rsi: 30.0,
        };
        assert!(ScreenerAnalyzer::is_oversold_gem(&row));
        assert!(ScreenerAnalyzer::plays_for(&row).contains(&Play::OversoldGem));
    }

    #[test]
    fn breakout_play() {
        let row = ScreenerRow {
            symbol: "XYZ".into(),
            price: 98.0,
            sma_20: 90.0,
            sma_50: 85.0,
            sma_200: 80.0,
            high_52w: 100.0,
            low_52w: 60.0,
            volume_ratio: 2.5,
            pe_ratio: None,
            revenue_growth: 0.0,
            rsi: 60.0,
        };
        assert!(ScreenerAnalyzer::is_breakout(&row));
    }

    #[test]
    fn screen_dedupes_symbols() {
        let row = ScreenerRow {
            symbol: "DUP".into(),
            price: 50.0,
            sma_20: 48.0,
            sma_50: 47.0,
            sma_200: 45.0,
            high_52w: 60.0,
            low_52w: 40.0,
            volume_ratio: 2.0,
            pe_ratio: Some(10.0),
            revenue_growth: 0.2,
            rsi: 30.0,
        };
        let rows = vec![row.clone(), row];
        assert_eq!(ScreenerAnalyzer::screen(&rows), vec!["DUP".to_string()]);
    }
}
