// =============================================================================
// Market data gateway — provider-chain fallback with a shared TTL cache
// =============================================================================
//
// Supplies recent close-price series for analysis when the broker itself is
// thin on history. Providers are tried in order; the first to return at
// least `MIN_POINTS` points wins. A process-wide cache (keyed on symbol +
// day count) avoids re-fetching the same series inside the TTL window, and
// a per-key async lock collapses concurrent callers into a single fetch so
// a cache miss doesn't fan out into a stampede of identical requests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, instrument, warn};

use crate::error::TradingError;

/// One OHLCV bar. Kept around (rather than reduced to a bare close series)
/// because the risk engine's optional ATR-based stop (§4.6) needs the full
/// range, not just closes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trades_count: u64,
    pub taker_buy_volume: f64,
    pub taker_buy_quote_volume: f64,
    pub is_closed: bool,
}

const MIN_POINTS: usize = 20;
const CACHE_TTL: Duration = Duration::from_secs(3600);

/// One fallback source of historical close prices.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch an oldest-to-newest close series for `symbol` covering roughly
    /// `days` of history. Implementations must not fabricate points: return
    /// fewer than `MIN_POINTS`, or an error, rather than padding.
    async fn fetch_closes(&self, symbol: &str, days: u32) -> Result<Vec<f64>, TradingError>;

    /// Minimum spacing this provider requires between requests (rate-limit
    /// courtesy). Zero for providers with no published limit.
    fn min_request_spacing(&self) -> Duration {
        Duration::ZERO
    }
}

#[derive(Clone)]
struct CacheEntry {
    closes: Vec<f64>,
    cached_at: Instant,
}

type CacheKey = (String, u32);

pub struct MarketDataGateway {
    providers: Vec<Arc<dyn MarketDataProvider>>,
    cache: RwLock<HashMap<CacheKey, CacheEntry>>,
    locks: RwLock<HashMap<CacheKey, Arc<AsyncMutex<()>>>>,
    last_request: RwLock<HashMap<String, Instant>>,
}

impl MarketDataGateway {
    pub fn new(providers: Vec<Arc<dyn MarketDataProvider>>) -> Self {
        Self {
            providers,
            cache: RwLock::new(HashMap::new()),
            locks: RwLock::new(HashMap::new()),
            last_request: RwLock::new(HashMap::new()),
        }
    }

    fn key_lock(&self, key: &CacheKey) -> Arc<AsyncMutex<()>> {
        if let Some(lock) = self.locks.read().get(key) {
            return lock.clone();
        }
        let mut locks = self.locks.write();
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn cached(&self, key: &CacheKey) -> Option<Vec<f64>> {
        let cache = self.cache.read();
        let entry = cache.get(key)?;
        if entry.cached_at.elapsed() < CACHE_TTL {
            Some(entry.closes.clone())
        } else {
            None
        }
    }

    /// Retrieve an oldest→newest close series of length ≥20 for `symbol`,
    /// falling back through providers and honouring the 1h cache. Returns
    /// `Err` when no provider clears the minimum point count — callers must
    /// skip the symbol for this cycle rather than substitute synthetic data.
    #[instrument(skip(self), fields(symbol = %symbol, days = days))]
    pub async fn get_closes(&self, symbol: &str, days: u32) -> Result<Vec<f64>, TradingError> {
        let key: CacheKey = (symbol.to_string(), days);
        if let Some(closes) = self.cached(&key) {
            debug!("cache hit");
            return Ok(closes);
        }

        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        // Re-check: another caller may have populated the cache while we
        // waited for the lock.
        if let Some(closes) = self.cached(&key) {
            return Ok(closes);
        }

        for provider in &self.providers {
            self.respect_spacing(provider.as_ref(), symbol).await;
            match provider.fetch_closes(symbol, days).await {
                Ok(closes) if closes.len() >= MIN_POINTS && closes.iter().all(|&p| p > 0.0) => {
                    self.cache.write().insert(
                        key.clone(),
                        CacheEntry {
                            closes: closes.clone(),
                            cached_at: Instant::now(),
                        },
                    );
                    return Ok(closes);
                }
                Ok(closes) => {
                    debug!(provider = provider.name(), points = closes.len(), "too few points, trying next provider");
                }
                Err(TradingError::RateLimited { retry_after_ms }) => {
                    warn!(provider = provider.name(), retry_after_ms, "rate limited, falling through");
                }
                Err(err) => {
                    warn!(provider = provider.name(), error = %err, "provider failed, trying next");
                }
            }
        }

        Err(TradingError::MalformedResponse {
            venue: "market_data_gateway".into(),
            detail: format!("no provider returned >= {MIN_POINTS} points for {symbol}"),
        })
    }

    async fn respect_spacing(&self, provider: &dyn MarketDataProvider, symbol: &str) {
        let spacing = provider.min_request_spacing();
        if spacing.is_zero() {
            return;
        }
        let key = format!("{}:{}", provider.name(), symbol);
        let wait = {
            let last = self.last_request.read();
            last.get(&key).and_then(|t| spacing.checked_sub(t.elapsed()))
        };
        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }
        self.last_request.write().insert(key, Instant::now());
    }
}

/// Append the current live price as the latest point, per the gateway's
/// output contract (analysis always sees the freshest price even though the
/// cached series may be up to an hour stale).
pub fn with_live_price(mut closes: Vec<f64>, live_price: f64) -> Vec<f64> {
    closes.push(live_price);
    closes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider {
        name: &'static str,
        points: Vec<f64>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketDataProvider for FixedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_closes(&self, _symbol: &str, _days: u32) -> Result<Vec<f64>, TradingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.points.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl MarketDataProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn fetch_closes(&self, _symbol: &str, _days: u32) -> Result<Vec<f64>, TradingError> {
            Err(TradingError::MalformedResponse {
                venue: "failing".into(),
                detail: "boom".into(),
            })
        }
    }

    #[tokio::test]
    async fn falls_back_to_second_provider() {
        let primary = Arc::new(FixedProvider {
            name: "primary",
            points: vec![1.0; 5], // below MIN_POINTS
            calls: AtomicUsize::new(0),
        });
        let secondary = Arc::new(FixedProvider {
            name: "secondary",
            points: (1..=25).map(|x| x as f64).collect(),
            calls: AtomicUsize::new(0),
        });
        let gateway = MarketDataGateway::new(vec![primary.clone(), secondary.clone()]);
        let result = gateway.get_closes("BTCUSD", 7).await.unwrap();
        assert_eq!(result.len(), 25);
    }

    #[tokio::test]
    async fn all_providers_insufficient_is_an_error() {
        let gateway = MarketDataGateway::new(vec![Arc::new(FailingProvider)]);
        assert!(gateway.get_closes("BTCUSD", 7).await.is_err());
    }

    #[tokio::test]
    async fn cache_hit_skips_provider_call() {
        let provider = Arc::new(FixedProvider {
            name: "primary",
            points: (1..=25).map(|x| x as f64).collect(),
            calls: AtomicUsize::new(0),
        });
        let gateway = MarketDataGateway::new(vec![provider.clone()]);
        gateway.get_closes("ETHUSD", 7).await.unwrap();
        gateway.get_closes("ETHUSD", 7).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn with_live_price_appends_last() {
        let closes = with_live_price(vec![1.0, 2.0, 3.0], 4.0);
        assert_eq!(closes, vec![1.0, 2.0, 3.0, 4.0]);
    }
}
