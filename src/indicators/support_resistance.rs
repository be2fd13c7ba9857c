// =============================================================================
// Support / Resistance via local extrema
// =============================================================================
//
// A point is a local extremum iff it strictly beats both neighbours
// (interior points only — the first and last element can never qualify,
// since they only have one neighbour). Results are the top-k by distance
// from the series mean, sorted ascending for support and descending for
// resistance so callers get "closest-to-price-first" ordering.

/// Return up to `k` local-minima (support) and local-maxima (resistance)
/// levels, each sorted so the most price-relevant level comes first.
pub fn find_support_resistance(prices: &[f64], k: usize) -> (Vec<f64>, Vec<f64>) {
    if prices.len() < 3 || k == 0 {
        return (Vec::new(), Vec::new());
    }

    let mut minima = Vec::new();
    let mut maxima = Vec::new();

    for i in 1..prices.len() - 1 {
        let prev = prices[i - 1];
        let curr = prices[i];
        let next = prices[i + 1];
        if curr < prev && curr < next {
            minima.push(curr);
        } else if curr > prev && curr > next {
            maxima.push(curr);
        }
    }

    // Support: nearest-to-current-price first, i.e. highest lows first.
    minima.sort_by(|a, b| b.partial_cmp(a).unwrap());
    minima.truncate(k);

    // Resistance: nearest-to-current-price first, i.e. lowest highs first.
    maxima.sort_by(|a, b| a.partial_cmp(b).unwrap());
    maxima.truncate(k);

    (minima, maxima)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_returns_empty() {
        let (s, r) = find_support_resistance(&[1.0, 2.0], 3);
        assert!(s.is_empty() && r.is_empty());
    }

    #[test]
    fn zero_k_returns_empty() {
        let (s, r) = find_support_resistance(&[1.0, 2.0, 1.0, 3.0, 1.0], 0);
        assert!(s.is_empty() && r.is_empty());
    }

    #[test]
    fn finds_obvious_extrema() {
        // 1, 5, 1, 5, 1 -> minima at indices 2 (value 1), maxima at 1,3 (value 5)
        let prices = vec![3.0, 1.0, 5.0, 1.0, 5.0, 1.0, 3.0];
        let (support, resistance) = find_support_resistance(&prices, 5);
        assert!(support.iter().all(|&v| (v - 1.0).abs() < 1e-9));
        assert!(resistance.iter().all(|&v| (v - 5.0).abs() < 1e-9));
        assert_eq!(support.len(), 3);
        assert_eq!(resistance.len(), 2);
    }

    #[test]
    fn respects_k_limit() {
        let prices = vec![3.0, 1.0, 5.0, 1.0, 5.0, 1.0, 5.0, 1.0, 3.0];
        let (support, _resistance) = find_support_resistance(&prices, 1);
        assert_eq!(support.len(), 1);
    }

    #[test]
    fn monotonic_series_has_no_extrema() {
        let prices: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let (support, resistance) = find_support_resistance(&prices, 5);
        assert!(support.is_empty());
        assert!(resistance.is_empty());
    }
}
