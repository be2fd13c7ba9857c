// =============================================================================
// CryptoBroker — signed REST adapter for the 24/7 crypto venue
// =============================================================================
//
// Grounded on the teacher's `binance::client::BinanceClient` (reqwest client
// with a per-request signature, `#[instrument]`-decorated methods, a custom
// `Debug` impl redacting credentials), but the signature scheme is Ed25519
// over `api_key ‖ timestamp ‖ path ‖ method ‖ body` rather than HMAC-SHA256,
// and bursts are serialised locally through `RateLimiter` rather than reacting
// to response headers, per §4.1/§5/§6.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use ed25519_dalek::{Signer, SigningKey};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde_json::json;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument, warn};

use super::rate_limiter::RateLimiter;
use super::{
    Account, BrokerAdapter, Holding, Instrument, OrderHandle, OrderRequest, OrderState, Quote,
};
use crate::decimal::{floor_to_increment, format_decimal, round_to_increment};
use crate::error::TradingError;
use crate::types::{OrderKind, OrderStatus, Side};

const EXCLUDED_QUOTE_ASSETS: &[&str] = &["USDC", "USDT", "DAI", "BUSD", "TUSD"];
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Pad a base64 string out to a multiple of 4 characters with `=`, per the
/// spec's seed-loading contract.
fn pad_base64(seed: &str) -> String {
    let remainder = seed.len() % 4;
    if remainder == 0 {
        seed.to_string()
    } else {
        format!("{seed}{}", "=".repeat(4 - remainder))
    }
}

pub fn load_signing_key(base64_seed: &str) -> Result<SigningKey, TradingError> {
    let padded = pad_base64(base64_seed.trim());
    let bytes = BASE64
        .decode(padded)
        .map_err(|e| TradingError::ConfigurationMissing(format!("invalid base64 Ed25519 seed: {e}")))?;
    let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        TradingError::ConfigurationMissing("Ed25519 seed must decode to 32 bytes".into())
    })?;
    Ok(SigningKey::from_bytes(&seed))
}

/// Returns true when `symbol`'s quote asset is a stablecoin the executor
/// must never trade (§4.7 excluded list).
pub fn is_excluded_symbol(symbol: &str) -> bool {
    EXCLUDED_QUOTE_ASSETS
        .iter()
        .any(|quote| symbol.ends_with(quote))
}

pub struct CryptoBroker {
    api_key: String,
    signing_key: SigningKey,
    base_url: String,
    client: reqwest::Client,
    limiter: RateLimiter,
    instrument_cache: RwLock<Option<Vec<Instrument>>>,
}

impl CryptoBroker {
    pub fn new(api_key: impl Into<String>, base64_seed: &str, base_url: impl Into<String>) -> Result<Self, TradingError> {
        let signing_key = load_signing_key(base64_seed)?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TradingError::Fatal(format!("failed to build http client: {e}")))?;

        Ok(Self {
            api_key: api_key.into(),
            signing_key,
            base_url: base_url.into(),
            client,
            limiter: RateLimiter::new(10, 1000),
            instrument_cache: RwLock::new(None),
        })
    }

    fn timestamp_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_secs()
    }

    /// Ed25519 signature (base64) over `api_key ‖ timestamp ‖ path ‖ method ‖ body`.
    fn sign(&self, timestamp: u64, path: &str, method: &str, body: &str) -> String {
        let message = format!("{}{}{}{}{}", self.api_key, timestamp, path, method, body);
        let signature = self.signing_key.sign(message.as_bytes());
        BASE64.encode(signature.to_bytes())
    }

    async fn signed_request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, TradingError> {
        self.limiter.acquire().await;

        let timestamp = Self::timestamp_secs();
        let body_str = if body.is_null() {
            String::new()
        } else {
            body.to_string()
        };
        let signature = self.sign(timestamp, path, method.as_str(), &body_str);
        let url = format!("{}{}", self.base_url, path);

        let mut req = self
            .client
            .request(method.clone(), &url)
            .header("x-api-key", &self.api_key)
            .header("x-timestamp", timestamp.to_string())
            .header("x-signature", signature);

        if !body.is_null() {
            req = req.json(&body);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                TradingError::Timeout(REQUEST_TIMEOUT)
            } else {
                TradingError::Connectivity {
                    venue: "crypto".into(),
                    source: e.into(),
                }
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = resp
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(1000);
            return Err(TradingError::RateLimited { retry_after_ms });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(TradingError::AuthenticationFailed("crypto".into()));
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| TradingError::MalformedResponse {
            venue: "crypto".into(),
            detail: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(TradingError::VenueRejection {
                symbol: path.to_string(),
                reason: json.to_string(),
            });
        }

        Ok(json)
    }
}

#[async_trait]
impl BrokerAdapter for CryptoBroker {
    fn name(&self) -> &str {
        "crypto"
    }

    #[instrument(skip(self), name = "crypto::account")]
    async fn account(&self) -> Result<Account, TradingError> {
        let body = self.signed_request(reqwest::Method::GET, "/api/v1/accounts", json!(null)).await?;
        Ok(Account {
            id: body["id"].as_str().unwrap_or_default().to_string(),
            status: body["status"].as_str().unwrap_or("unknown").to_string(),
            buying_power: body["buying_power"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0),
            active: body["status"].as_str() == Some("active"),
        })
    }

    #[instrument(skip(self), name = "crypto::holdings")]
    async fn holdings(&self) -> Result<Vec<Holding>, TradingError> {
        let body = self.signed_request(reqwest::Method::GET, "/api/v1/holdings", json!(null)).await?;
        let results = body["results"].as_array().cloned().unwrap_or_default();
        Ok(results
            .into_iter()
            .map(|h| Holding {
                asset: h["asset_code"].as_str().unwrap_or_default().to_string(),
                total_qty: h["total_quantity"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0),
                available_qty: h["quantity_available_for_trading"]
                    .as_str()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0.0),
                held_qty: h["quantity_held_for_orders"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0),
                cost_basis: None,
                market_value: None,
            })
            .collect())
    }

    #[instrument(skip(self), name = "crypto::instruments")]
    async fn instruments(&self) -> Result<Vec<Instrument>, TradingError> {
        if let Some(cached) = self.instrument_cache.read().clone() {
            return Ok(cached);
        }

        let body = self
            .signed_request(reqwest::Method::GET, "/api/v1/trading_pairs", json!(null))
            .await?;
        let pairs = body["results"].as_array().cloned().unwrap_or_default();
        let instruments: Vec<Instrument> = pairs
            .into_iter()
            .map(|p| Instrument {
                symbol: p["symbol"].as_str().unwrap_or_default().to_string(),
                min_order_size: p["min_order_size"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0),
                max_order_size: p["max_order_size"].as_str().and_then(|s| s.parse().ok()).unwrap_or(f64::MAX),
                price_increment: p["price_increment"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.01),
                quantity_increment: p["quantity_increment"]
                    .as_str()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1e-8),
                tradable: p["status"].as_str() == Some("tradable"),
            })
            .collect();

        *self.instrument_cache.write() = Some(instruments.clone());
        debug!(count = instruments.len(), "instrument cache populated");
        Ok(instruments)
    }

    #[instrument(skip(self), name = "crypto::quote")]
    async fn quote(&self, symbol: &str) -> Result<Quote, TradingError> {
        let path = format!("/api/v1/marketdata/best_bid_ask/?symbol={symbol}");
        let body = self.signed_request(reqwest::Method::GET, &path, json!(null)).await?;
        let entry = body["results"]
            .as_array()
            .and_then(|a| a.first())
            .ok_or_else(|| TradingError::MalformedResponse {
                venue: "crypto".into(),
                detail: format!("no quote for {symbol}"),
            })?;

        let bid: f64 = entry["bid_inclusive_of_sell_spread"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0);
        let ask: f64 = entry["ask_inclusive_of_buy_spread"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0);
        let mark: f64 = entry["price"].as_str().and_then(|s| s.parse().ok()).unwrap_or((bid + ask) / 2.0);

        Ok(Quote {
            symbol: symbol.to_string(),
            bid,
            ask,
            mark,
            high: None,
            low: None,
            open: None,
            volume: None,
            ts: Utc::now(),
        })
    }

    #[instrument(skip(self), name = "crypto::historical_prices")]
    async fn historical_prices(&self, symbol: &str, days: u32) -> Result<Vec<f64>, TradingError> {
        let path = format!("/api/v1/marketdata/historical/?symbol={symbol}&days={days}");
        let body = self.signed_request(reqwest::Method::GET, &path, json!(null)).await?;
        let points = body["results"].as_array().cloned().unwrap_or_default();
        let closes: Vec<f64> = points
            .iter()
            .filter_map(|p| p["close"].as_str().and_then(|s| s.parse::<f64>().ok()))
            .collect();

        if closes.len() < 20 {
            return Err(TradingError::MalformedResponse {
                venue: "crypto".into(),
                detail: format!("only {} points for {symbol}, need >= 20", closes.len()),
            });
        }
        Ok(closes)
    }

    #[instrument(skip(self, req), name = "crypto::place_order")]
    async fn place_order(&self, req: OrderRequest) -> Result<OrderHandle, TradingError> {
        if is_excluded_symbol(&req.symbol) {
            return Err(TradingError::InvariantViolation(format!(
                "{} is on the excluded (stablecoin) list",
                req.symbol
            )));
        }

        let instruments = self.instruments().await?;
        let instrument = instruments
            .iter()
            .find(|i| i.symbol == req.symbol)
            .ok_or_else(|| TradingError::InvariantViolation(format!("unknown instrument {}", req.symbol)))?;

        let qty: Decimal = floor_to_increment(req.quantity, instrument.quantity_increment);
        if qty <= Decimal::ZERO {
            return Err(TradingError::InvariantViolation(format!(
                "quantity {} rounds to 0 at increment {}",
                req.quantity, instrument.quantity_increment
            )));
        }

        let side_str = match req.side {
            Side::Buy => "buy",
            Side::Sell => "sell",
        };

        let order_config = match req.kind {
            OrderKind::Market => json!({ "asset_quantity": format_decimal(qty) }),
            OrderKind::Limit => {
                let price = req.limit_price.ok_or_else(|| {
                    TradingError::InvariantViolation("limit order requires limit_price".into())
                })?;
                let price: Decimal = round_to_increment(price, instrument.price_increment);
                json!({ "asset_quantity": format_decimal(qty), "limit_price": format_decimal(price) })
            }
        };

        let config_key = match req.kind {
            OrderKind::Market => "market_order_config",
            OrderKind::Limit => "limit_order_config",
        };
        let mut payload = json!({
            "client_order_id": req.client_order_id,
            "side": side_str,
            "symbol": req.symbol,
            "type": req.kind.to_string(),
        });
        payload[config_key] = order_config;

        let body = self.signed_request(reqwest::Method::POST, "/api/v1/orders/", payload).await?;
        Ok(OrderHandle {
            order_id: body["id"].as_str().unwrap_or_default().to_string(),
            client_order_id: req.client_order_id,
        })
    }

    #[instrument(skip(self), name = "crypto::cancel_order")]
    async fn cancel_order(&self, id: &str) -> Result<bool, TradingError> {
        let path = format!("/api/v1/orders/{id}/cancel/");
        match self.signed_request(reqwest::Method::POST, &path, json!({})).await {
            Ok(_) => Ok(true),
            Err(TradingError::VenueRejection { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), name = "crypto::get_order")]
    async fn get_order(&self, id: &str) -> Result<OrderState, TradingError> {
        let path = format!("/api/v1/orders/{id}/");
        let body = self.signed_request(reqwest::Method::GET, &path, json!(null)).await?;

        let status = match body["state"].as_str().unwrap_or("") {
            "open" => OrderStatus::Open,
            "filled" => OrderStatus::Filled,
            "partially_filled" => OrderStatus::PartiallyFilled,
            "cancelled" | "canceled" => OrderStatus::Cancelled,
            "rejected" => OrderStatus::Rejected,
            "failed" => OrderStatus::Failed,
            _ => {
                warn!(order_id = id, raw_state = body["state"].as_str(), "unrecognised order state");
                OrderStatus::Pending
            }
        };

        Ok(OrderState {
            id: id.to_string(),
            status,
            filled_qty: body["filled_asset_quantity"].as_str().and_then(|s| s.parse().ok()).unwrap_or(0.0),
            filled_price: body["average_price"].as_str().and_then(|s| s.parse().ok()),
            updated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excluded_symbol_detection() {
        assert!(is_excluded_symbol("BTCUSDT"));
        assert!(is_excluded_symbol("ETHUSDC"));
        assert!(!is_excluded_symbol("BTCETH"));
    }

    #[test]
    fn base64_padding() {
        assert_eq!(pad_base64("abc"), "abc=");
        assert_eq!(pad_base64("abcd"), "abcd");
        assert_eq!(pad_base64("a"), "a===");
    }

    #[test]
    fn signing_key_round_trip() {
        // A 32-byte all-zero seed, base64-encoded without padding.
        let seed_bytes = [0u8; 32];
        let encoded = BASE64.encode(seed_bytes);
        let trimmed = encoded.trim_end_matches('=').to_string();
        let key = load_signing_key(&trimmed).unwrap();
        assert_eq!(key.to_bytes(), seed_bytes);
    }

    #[test]
    fn invalid_seed_rejected() {
        assert!(load_signing_key("not-valid-base64!!!").is_err());
    }
}
