// =============================================================================
// FundamentalAnalyzer
// =============================================================================
//
// Combines four percentile-ranked metrics into a single composite score:
// volume ratio (weight 0.25), 52-week price position (0.20), market-cap
// rank tier (0.25), and 24h/7d momentum (0.30). Each metric is percentile
// ranked 0-100 before weighting; a metric with missing inputs is skipped and
// the remaining weights are re-normalised so the composite stays in [0,100].
// Grounded on the teacher's `strategy.rs` convention of collapsing several
// raw signals into one labelled score before a decision is made.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default)]
pub struct FundamentalMetrics {
    /// Current volume divided by its trailing average; 1.0 == typical.
    pub volume_ratio: Option<f64>,
    pub price: Option<f64>,
    pub low_52w: Option<f64>,
    pub high_52w: Option<f64>,
    /// 1-based market-cap rank within the tracked universe (1 == largest).
    pub market_cap_rank: Option<u32>,
    pub change_24h_pct: Option<f64>,
    pub change_7d_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FundamentalLabel {
    Strong,
    Moderate,
    Weak,
}

impl std::fmt::Display for FundamentalLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Strong => "STRONG",
            Self::Moderate => "MODERATE",
            Self::Weak => "WEAK",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FundamentalAnalysis {
    pub composite_score: f64,
    pub label: FundamentalLabel,
    pub volume_score: Option<f64>,
    pub price_position_score: Option<f64>,
    pub market_cap_score: Option<f64>,
    pub momentum_score: Option<f64>,
}

const WEIGHT_VOLUME: f64 = 0.25;
const WEIGHT_PRICE_POSITION: f64 = 0.20;
const WEIGHT_MARKET_CAP: f64 = 0.25;
const WEIGHT_MOMENTUM: f64 = 0.30;

pub struct FundamentalAnalyzer;

impl FundamentalAnalyzer {
    fn volume_score(ratio: f64) -> f64 {
        (ratio * 50.0).min(100.0).max(0.0)
    }

    fn price_position_score(price: f64, low_52w: f64, high_52w: f64) -> Option<f64> {
        let range = high_52w - low_52w;
        if range <= 0.0 {
            return None;
        }
        Some(((price - low_52w) / range * 100.0).clamp(0.0, 100.0))
    }

    /// Market-cap rank tiers: top 10 -> 95, top 50 -> 80, top 100 -> 60,
    /// top 250 -> 40, else 20.
    fn market_cap_score(rank: u32) -> f64 {
        if rank <= 10 {
            95.0
        } else if rank <= 50 {
            80.0
        } else if rank <= 100 {
            60.0
        } else if rank <= 250 {
            40.0
        } else {
            20.0
        }
    }

    fn momentum_score(change_24h_pct: f64, change_7d_pct: f64) -> f64 {
        (50.0 + 2.0 * change_24h_pct + 0.5 * change_7d_pct).clamp(0.0, 100.0)
    }

    /// Compute the composite fundamental score, re-normalising the weights
    /// across whichever metrics are actually present.
    pub fn analyze(metrics: &FundamentalMetrics) -> FundamentalAnalysis {
        let volume_score = metrics.volume_ratio.map(Self::volume_score);

        let price_position_score = match (metrics.price, metrics.low_52w, metrics.high_52w) {
            (Some(price), Some(low), Some(high)) => Self::price_position_score(price, low, high),
            _ => None,
        };

        let market_cap_score = metrics.market_cap_rank.map(Self::market_cap_score);

        let momentum_score = match (metrics.change_24h_pct, metrics.change_7d_pct) {
            (Some(c24), Some(c7)) => Some(Self::momentum_score(c24, c7)),
            _ => None,
        };

        let weighted: Vec<(f64, f64)> = [
            (volume_score, WEIGHT_VOLUME),
            (price_position_score, WEIGHT_PRICE_POSITION),
            (market_cap_score, WEIGHT_MARKET_CAP),
            (momentum_score, WEIGHT_MOMENTUM),
        ]
        .into_iter()
        .filter_map(|(score, weight)| score.map(|s| (s, weight)))
        .collect();

        let weight_sum: f64 = weighted.iter().map(|(_, w)| w).sum();
        let composite_score = if weight_sum > 0.0 {
            weighted.iter().map(|(s, w)| s * w).sum::<f64>() / weight_sum
        } else {
            50.0
        };

        let label = if composite_score >= 70.0 {
            FundamentalLabel::Strong
        } else if composite_score >= 40.0 {
            FundamentalLabel::Moderate
        } else {
            FundamentalLabel::Weak
        };

        FundamentalAnalysis {
            composite_score,
            label,
            volume_score,
            price_position_score,
            market_cap_score,
            momentum_score,
        }
    }

    /// Pearson correlation coefficient between two aligned period-to-period
    /// return series. Requires at least 5 points of equal length; result is
    /// clamped to [-1, 1] to absorb floating-point drift at the extremes.
    pub fn correlation(xs: &[f64], ys: &[f64]) -> Option<f64> {
        if xs.len() != ys.len() || xs.len() < 5 {
            return None;
        }
        let n = xs.len() as f64;
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = ys.iter().sum::<f64>() / n;

        let mut cov = 0.0;
        let mut var_x = 0.0;
        let mut var_y = 0.0;
        for (&x, &y) in xs.iter().zip(ys.iter()) {
            let dx = x - mean_x;
            let dy = y - mean_y;
            cov += dx * dy;
            var_x += dx * dx;
            var_y += dy * dy;
        }

        if var_x == 0.0 || var_y == 0.0 {
            return None;
        }

        let r = cov / (var_x.sqrt() * var_y.sqrt());
        if !r.is_finite() {
            return None;
        }
        Some(r.clamp(-1.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_score_caps_at_100() {
        assert_eq!(FundamentalAnalyzer::volume_score(3.0), 100.0);
        assert_eq!(FundamentalAnalyzer::volume_score(1.0), 50.0);
    }

    #[test]
    fn price_position_midpoint() {
        let score = FundamentalAnalyzer::price_position_score(75.0, 50.0, 100.0).unwrap();
        assert!((score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn market_cap_tiers() {
        assert_eq!(FundamentalAnalyzer::market_cap_score(1), 95.0);
        assert_eq!(FundamentalAnalyzer::market_cap_score(10), 95.0);
        assert_eq!(FundamentalAnalyzer::market_cap_score(11), 80.0);
        assert_eq!(FundamentalAnalyzer::market_cap_score(50), 80.0);
        assert_eq!(FundamentalAnalyzer::market_cap_score(100), 60.0);
        assert_eq!(FundamentalAnalyzer::market_cap_score(250), 40.0);
        assert_eq!(FundamentalAnalyzer::market_cap_score(251), 20.0);
    }

    #[test]
    fn momentum_clamped() {
        assert_eq!(FundamentalAnalyzer::momentum_score(50.0, 50.0), 100.0);
        assert_eq!(FundamentalAnalyzer::momentum_score(-50.0, -50.0), 0.0);
    }

    #[test]
    fn all_metrics_present_weighted_average() {
        let metrics = FundamentalMetrics {
            volume_ratio: Some(1.0),
            price: Some(75.0),
            low_52w: Some(50.0),
            high_52w: Some(100.0),
            market_cap_rank: Some(11),
            change_24h_pct: Some(0.0),
            change_7d_pct: Some(0.0),
        };
        let analysis = FundamentalAnalyzer::analyze(&metrics);
        // volume=50, price_position=50, market_cap=80, momentum=50
        let expected = 50.0 * 0.25 + 50.0 * 0.20 + 80.0 * 0.25 + 50.0 * 0.30;
        assert!((analysis.composite_score - expected).abs() < 1e-9);
        assert_eq!(analysis.label, FundamentalLabel::Moderate);
    }

    #[test]
    fn missing_metric_renormalises_weights() {
        let metrics = FundamentalMetrics {
            volume_ratio: None,
            price: Some(100.0),
            low_52w: Some(0.0),
            high_52w: Some(100.0),
            market_cap_rank: Some(1),
            change_24h_pct: Some(25.0),
            change_7d_pct: Some(0.0),
        };
        let analysis = FundamentalAnalyzer::analyze(&metrics);
        // price_position=100, market_cap=95, momentum=100; weights 0.20/0.25/0.30
        let expected = (100.0 * 0.20 + 95.0 * 0.25 + 100.0 * 0.30) / 0.75;
        assert!((analysis.composite_score - expected).abs() < 1e-9);
        assert_eq!(analysis.label, FundamentalLabel::Strong);
    }

    #[test]
    fn no_metrics_defaults_neutral() {
        let metrics = FundamentalMetrics::default();
        let analysis = FundamentalAnalyzer::analyze(&metrics);
        assert_eq!(analysis.composite_score, 50.0);
        assert_eq!(analysis.label, FundamentalLabel::Moderate);
    }

    #[test]
    fn weak_label_for_low_score() {
        let metrics = FundamentalMetrics {
            volume_ratio: Some(0.0),
            price: Some(0.0),
            low_52w: Some(0.0),
            high_52w: Some(100.0),
            market_cap_rank: Some(9999),
            change_24h_pct: Some(-25.0),
            change_7d_pct: Some(-25.0),
        };
        let analysis = FundamentalAnalyzer::analyze(&metrics);
        assert_eq!(analysis.label, FundamentalLabel::Weak);
    }

    #[test]
    fn correlation_perfect_positive() {
        let xs = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = vec![2.0, 4.0, 6.0, 8.0, 10.0];
        let r = FundamentalAnalyzer::correlation(&xs, &ys).unwrap();
        assert!((r - 1.0).abs() < 1e-9);
    }

    #[test]
    fn correlation_perfect_negative() {
        let xs = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = vec![10.0, 8.0, 6.0, 4.0, 2.0];
        let r = FundamentalAnalyzer::correlation(&xs, &ys).unwrap();
        assert!((r + 1.0).abs() < 1e-9);
    }

    #[test]
    fn correlation_requires_five_points() {
        let xs = vec![1.0, 2.0, 3.0, 4.0];
        let ys = vec![1.0, 2.0, 3.0, 4.0];
        assert!(FundamentalAnalyzer::correlation(&xs, &ys).is_none());
    }

    #[test]
    fn correlation_zero_variance_is_none() {
        let xs = vec![1.0; 5];
        let ys = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!(FundamentalAnalyzer::correlation(&xs, &ys).is_none());
    }
}
