// =============================================================================
// BrokerAdapter — uniform capability surface over a broker venue
// =============================================================================
//
// One trait, two venues. `CryptoBroker` talks to a signed REST crypto venue;
// `EquitiesBroker` talks to a socket-based options/stock venue. Each
// implements only the operations relevant to it — the options-only calls
// default to `NotFound`-style rejection on the crypto side rather than being
// absent from the trait, so callers can hold a single `Arc<dyn BrokerAdapter>`
// regardless of which agent family they're serving.

pub mod crypto;
pub mod equities;
pub mod rate_limiter;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TradingError;
use crate::types::{OrderKind, OrderStatus, Side, TimeInForce};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub status: String,
    pub buying_power: f64,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub asset: String,
    pub total_qty: f64,
    pub available_qty: f64,
    pub held_qty: f64,
    pub cost_basis: Option<f64>,
    pub market_value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub min_order_size: f64,
    pub max_order_size: f64,
    pub price_increment: f64,
    pub quantity_increment: f64,
    pub tradable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub mark: f64,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub open: Option<f64>,
    pub volume: Option<f64>,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: f64,
    pub limit_price: Option<f64>,
    pub time_in_force: TimeInForce,
    pub client_order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderHandle {
    pub order_id: String,
    pub client_order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderState {
    pub id: String,
    pub status: OrderStatus,
    pub filled_qty: f64,
    pub filled_price: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// Criteria for `find_put_spread` (options-only).
#[derive(Debug, Clone)]
pub struct PutSpreadCriteria {
    pub symbol: String,
    pub target_short_delta: f64,
    pub min_days_to_expiration: u32,
    pub max_days_to_expiration: u32,
    pub spread_width: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutSpreadCandidate {
    pub short_strike: f64,
    pub long_strike: f64,
    pub expiration: String,
    pub short_delta: f64,
    pub estimated_credit: f64,
    pub max_risk: f64,
    pub max_profit: f64,
}

#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn account(&self) -> Result<Account, TradingError>;
    async fn holdings(&self) -> Result<Vec<Holding>, TradingError>;

    /// Cacheable instrument metadata; callers (the Executor) must not place
    /// an order without first consulting this.
    async fn instruments(&self) -> Result<Vec<Instrument>, TradingError>;

    async fn quote(&self, symbol: &str) -> Result<Quote, TradingError>;

    /// Batch quote fetch. Implementations must parallelise across windows
    /// of at most 10 symbols.
    async fn quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, TradingError> {
        let mut out = Vec::with_capacity(symbols.len());
        for chunk in symbols.chunks(10) {
            let futs = chunk.iter().map(|s| self.quote(s));
            let results = futures_util::future::join_all(futs).await;
            for r in results {
                out.push(r?);
            }
        }
        Ok(out)
    }

    /// Oldest→newest close series, length ≥20 or an error.
    async fn historical_prices(&self, symbol: &str, days: u32) -> Result<Vec<f64>, TradingError>;

    async fn place_order(&self, req: OrderRequest) -> Result<OrderHandle, TradingError>;
    async fn cancel_order(&self, id: &str) -> Result<bool, TradingError>;
    async fn get_order(&self, id: &str) -> Result<OrderState, TradingError>;

    // Options-only operations. Default implementations reject for venues
    // that don't support them (the crypto adapter).
    async fn find_put_spread(
        &self,
        _criteria: PutSpreadCriteria,
    ) -> Result<Vec<PutSpreadCandidate>, TradingError> {
        Err(TradingError::InvariantViolation(
            "find_put_spread is not supported on this venue".into(),
        ))
    }

    async fn place_spread_order(
        &self,
        _short_strike: f64,
        _long_strike: f64,
        _expiration: &str,
        _right: &str,
        _qty: u32,
        _limit_price: f64,
    ) -> Result<OrderHandle, TradingError> {
        Err(TradingError::InvariantViolation(
            "place_spread_order is not supported on this venue".into(),
        ))
    }

    async fn cancel_all_orders(&self, _symbol: Option<&str>) -> Result<u32, TradingError> {
        Err(TradingError::InvariantViolation(
            "cancel_all_orders is not supported on this venue".into(),
        ))
    }
}
