// =============================================================================
// Executor — wraps BrokerAdapter with precision rounding and fill semantics
// =============================================================================
//
// Generalises the teacher's single-venue `ExecutionEngine` (which wrapped a
// concrete Binance client) to any `Arc<dyn BrokerAdapter>`, and replaces its
// demo/live branch with the spec's process-wide DRY_RUN toggle: when set,
// the executor returns a simulated FILLED record without calling the
// adapter at all, rather than opening a local position directly (that's the
// caller's job now — position/watchlist bookkeeping lives above the
// executor, not inside it).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::broker::crypto::is_excluded_symbol;
use crate::broker::{BrokerAdapter, Instrument, OrderRequest};
use crate::decimal::{floor_to_increment, round_to_increment};
use crate::error::TradingError;
use crate::types::{ExitReason, OrderKind, OrderStatus, Side, TimeInForce};

const DEFAULT_ORDER_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_LIMIT_OFFSET_PCT: f64 = 0.001;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    pub requested_qty: f64,
    pub filled_qty: f64,
    pub filled_price: Option<f64>,
    pub status: OrderStatus,
    pub order_id: Option<String>,
    pub message: String,
    pub ts: DateTime<Utc>,
}

/// A request to open or close a position through the executor.
pub struct ExecutionRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub mark_price: f64,
    /// Opt-in limit order at `limit_offset_pct` above/below mark; defaults
    /// to market for speed per §4.7.
    pub use_limit: bool,
    /// For exits: forces a market order regardless of `use_limit`.
    pub exit_reason: Option<ExitReason>,
}

pub struct Executor {
    broker: Arc<dyn BrokerAdapter>,
    dry_run: bool,
    order_timeout: Duration,
    poll_interval: Duration,
    limit_offset_pct: f64,
    instrument_cache: RwLock<Option<Vec<Instrument>>>,
}

impl Executor {
    pub fn new(broker: Arc<dyn BrokerAdapter>, dry_run: bool) -> Self {
        Self {
            broker,
            dry_run,
            order_timeout: DEFAULT_ORDER_TIMEOUT,
            poll_interval: POLL_INTERVAL,
            limit_offset_pct: DEFAULT_LIMIT_OFFSET_PCT,
            instrument_cache: RwLock::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.order_timeout = timeout;
        self
    }

    async fn cached_instrument(&self, symbol: &str) -> Result<Instrument, TradingError> {
        {
            let cache = self.instrument_cache.read();
            if let Some(list) = cache.as_ref() {
                if let Some(found) = list.iter().find(|i| i.symbol == symbol) {
                    return Ok(found.clone());
                }
            }
        }

        let fresh = self.broker.instruments().await?;
        let found = fresh.iter().find(|i| i.symbol == symbol).cloned();
        *self.instrument_cache.write() = Some(fresh);

        found.ok_or_else(|| TradingError::InvariantViolation(format!("unknown instrument {symbol}")))
    }

    fn reject(req: &ExecutionRequest, kind: OrderKind, message: impl Into<String>) -> ExecutionOutcome {
        let message = message.into();
        warn!(symbol = %req.symbol, side = %req.side, "order rejected: {}", message);
        ExecutionOutcome {
            symbol: req.symbol.clone(),
            side: req.side,
            kind,
            requested_qty: req.quantity,
            filled_qty: 0.0,
            filled_price: None,
            status: OrderStatus::Rejected,
            order_id: None,
            message,
            ts: Utc::now(),
        }
    }

    /// Place an order and wait for it to reach a terminal state (or time
    /// out), applying instrument precision, the excluded-symbol check, and
    /// the partial-fill / retry-as-market rules from §4.7.
    pub async fn place_and_wait(&self, req: ExecutionRequest) -> ExecutionOutcome {
        if is_excluded_symbol(&req.symbol) {
            return Self::reject(&req, OrderKind::Market, "symbol is on the excluded list");
        }

        let instrument = match self.cached_instrument(&req.symbol).await {
            Ok(i) => i,
            Err(e) => return Self::reject(&req, OrderKind::Market, e.to_string()),
        };
        if !instrument.tradable {
            return Self::reject(&req, OrderKind::Market, "instrument is not tradable");
        }

        let quantity = floor_to_increment(req.quantity, instrument.quantity_increment)
            .to_string()
            .parse::<f64>()
            .unwrap_or(0.0);
        if quantity <= 0.0 {
            return Self::reject(&req, OrderKind::Market, "quantity rounds to zero at this increment");
        }

        let force_market = req.exit_reason == Some(ExitReason::StopLoss);
        let kind = if req.use_limit && !force_market {
            OrderKind::Limit
        } else {
            OrderKind::Market
        };

        let limit_price = if kind == OrderKind::Limit {
            let raw = match req.side {
                Side::Buy => req.mark_price * (1.0 + self.limit_offset_pct),
                Side::Sell => req.mark_price * (1.0 - self.limit_offset_pct),
            };
            round_to_increment(raw, instrument.price_increment)
                .to_string()
                .parse::<f64>()
                .ok()
        } else {
            None
        };

        if self.dry_run {
            info!(symbol = %req.symbol, side = %req.side, quantity, "DRY_RUN: simulating fill");
            return ExecutionOutcome {
                symbol: req.symbol.clone(),
                side: req.side,
                kind,
                requested_qty: quantity,
                filled_qty: quantity,
                filled_price: Some(limit_price.unwrap_or(req.mark_price)),
                status: OrderStatus::Filled,
                order_id: Some(format!("dry-run-{}", Uuid::new_v4())),
                message: "simulated fill (DRY_RUN)".to_string(),
                ts: Utc::now(),
            };
        }

        self.submit_and_poll(&req, kind, quantity, limit_price, force_market).await
    }

    async fn submit_and_poll(
        &self,
        req: &ExecutionRequest,
        mut kind: OrderKind,
        quantity: f64,
        mut limit_price: Option<f64>,
        force_market: bool,
    ) -> ExecutionOutcome {
        // At most two attempts: the original order, and (if it was a limit
        // order that timed out with no fill on an exit forced to retry as
        // market) one market retry.
        let mut retry_as_market = force_market && kind == OrderKind::Limit;

        loop {
            let outcome = self
                .submit_and_poll_once(req, kind, quantity, limit_price)
                .await;

            let timed_out_unfilled =
                outcome.status == OrderStatus::Cancelled && outcome.filled_qty == 0.0;
            if timed_out_unfilled && retry_as_market {
                kind = OrderKind::Market;
                limit_price = None;
                retry_as_market = false;
                continue;
            }
            return outcome;
        }
    }

    async fn submit_and_poll_once(
        &self,
        req: &ExecutionRequest,
        kind: OrderKind,
        quantity: f64,
        limit_price: Option<f64>,
    ) -> ExecutionOutcome {
        let client_order_id = Uuid::new_v4().to_string();
        let order = OrderRequest {
            symbol: req.symbol.clone(),
            side: req.side,
            kind,
            quantity,
            limit_price,
            time_in_force: TimeInForce::Gtc,
            client_order_id: client_order_id.clone(),
        };

        let handle = match self.broker.place_order(order).await {
            Ok(h) => h,
            Err(e) => {
                return ExecutionOutcome {
                    symbol: req.symbol.clone(),
                    side: req.side,
                    kind,
                    requested_qty: quantity,
                    filled_qty: 0.0,
                    filled_price: None,
                    status: OrderStatus::Failed,
                    order_id: None,
                    message: e.to_string(),
                    ts: Utc::now(),
                }
            }
        };

        let deadline = tokio::time::Instant::now() + self.order_timeout;
        loop {
            let state = match self.broker.get_order(&handle.order_id).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(order_id = %handle.order_id, error = %e, "order status poll failed");
                    tokio::time::sleep(self.poll_interval).await;
                    if tokio::time::Instant::now() >= deadline {
                        break;
                    }
                    continue;
                }
            };

            if state.status == OrderStatus::Filled {
                return ExecutionOutcome {
                    symbol: req.symbol.clone(),
                    side: req.side,
                    kind,
                    requested_qty: quantity,
                    filled_qty: state.filled_qty,
                    filled_price: state.filled_price,
                    status: OrderStatus::Filled,
                    order_id: Some(handle.order_id),
                    message: "filled".to_string(),
                    ts: Utc::now(),
                };
            }

            if state.status.is_terminal() {
                return ExecutionOutcome {
                    symbol: req.symbol.clone(),
                    side: req.side,
                    kind,
                    requested_qty: quantity,
                    filled_qty: state.filled_qty,
                    filled_price: state.filled_price,
                    status: state.status,
                    order_id: Some(handle.order_id),
                    message: format!("terminal status {}", state.status),
                    ts: Utc::now(),
                };
            }

            if tokio::time::Instant::now() >= deadline {
                if state.filled_qty > 0.0 {
                    let _ = self.broker.cancel_order(&handle.order_id).await;
                    return ExecutionOutcome {
                        symbol: req.symbol.clone(),
                        side: req.side,
                        kind,
                        requested_qty: quantity,
                        filled_qty: state.filled_qty,
                        filled_price: state.filled_price,
                        status: OrderStatus::PartiallyFilled,
                        order_id: Some(handle.order_id),
                        message: "timed out with partial fill, remainder cancelled".to_string(),
                        ts: Utc::now(),
                    };
                }

                let _ = self.broker.cancel_order(&handle.order_id).await;

                return ExecutionOutcome {
                    symbol: req.symbol.clone(),
                    side: req.side,
                    kind,
                    requested_qty: quantity,
                    filled_qty: 0.0,
                    filled_price: None,
                    status: OrderStatus::Cancelled,
                    order_id: Some(handle.order_id),
                    message: "no fill before timeout, cancelled".to_string(),
                    ts: Utc::now(),
                };
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        ExecutionOutcome {
            symbol: req.symbol.clone(),
            side: req.side,
            kind,
            requested_qty: quantity,
            filled_qty: 0.0,
            filled_price: None,
            status: OrderStatus::Failed,
            order_id: None,
            message: "order status polling aborted".to_string(),
            ts: Utc::now(),
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("broker", &self.broker.name())
            .field("dry_run", &self.dry_run)
            .field("order_timeout", &self.order_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Account, Holding, OrderHandle, OrderState, Quote};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockBroker {
        tradable: bool,
        fill_after_polls: u32,
        polls: AtomicU32,
    }

    #[async_trait]
    impl BrokerAdapter for MockBroker {
        fn name(&self) -> &str {
            "mock"
        }

        async fn account(&self) -> Result<Account, TradingError> {
            unimplemented!()
        }

        async fn holdings(&self) -> Result<Vec<Holding>, TradingError> {
            unimplemented!()
        }

        async fn instruments(&self) -> Result<Vec<Instrument>, TradingError> {
            Ok(vec![Instrument {
                symbol: "BTC-USD".to_string(),
                min_order_size: 0.0001,
                max_order_size: 100.0,
                price_increment: 0.01,
                quantity_increment: 0.000001,
                tradable: self.tradable,
            }])
        }

        async fn quote(&self, symbol: &str) -> Result<Quote, TradingError> {
            Ok(Quote {
                symbol: symbol.to_string(),
                bid: 100.0,
                ask: 100.1,
                mark: 100.05,
                high: None,
                low: None,
                open: None,
                volume: None,
                ts: Utc::now(),
            })
        }

        async fn historical_prices(&self, _symbol: &str, _days: u32) -> Result<Vec<f64>, TradingError> {
            unimplemented!()
        }

        async fn place_order(&self, req: OrderRequest) -> Result<OrderHandle, TradingError> {
            Ok(OrderHandle {
                order_id: "order-1".to_string(),
                client_order_id: req.client_order_id,
            })
        }

        async fn cancel_order(&self, _id: &str) -> Result<bool, TradingError> {
            Ok(true)
        }

        async fn get_order(&self, id: &str) -> Result<OrderState, TradingError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            let status = if n >= self.fill_after_polls {
                OrderStatus::Filled
            } else {
                OrderStatus::Open
            };
            Ok(OrderState {
                id: id.to_string(),
                status,
                filled_qty: if status == OrderStatus::Filled { 1.0 } else { 0.0 },
                filled_price: if status == OrderStatus::Filled { Some(100.0) } else { None },
                updated_at: Utc::now(),
            })
        }
    }

    #[tokio::test]
    async fn dry_run_simulates_fill_without_calling_broker() {
        let broker = Arc::new(MockBroker {
            tradable: true,
            fill_after_polls: 0,
            polls: AtomicU32::new(0),
        });
        let executor = Executor::new(broker, true);
        let outcome = executor
            .place_and_wait(ExecutionRequest {
                symbol: "BTC-USD".to_string(),
                side: Side::Buy,
                quantity: 0.5,
                mark_price: 100.0,
                use_limit: false,
                exit_reason: None,
            })
            .await;
        assert_eq!(outcome.status, OrderStatus::Filled);
        assert!(outcome.order_id.unwrap().starts_with("dry-run-"));
    }

    #[tokio::test]
    async fn excluded_symbol_rejected() {
        let broker = Arc::new(MockBroker {
            tradable: true,
            fill_after_polls: 0,
            polls: AtomicU32::new(0),
        });
        let executor = Executor::new(broker, true);
        let outcome = executor
            .place_and_wait(ExecutionRequest {
                symbol: "USDC-USD".to_string(),
                side: Side::Buy,
                quantity: 1.0,
                mark_price: 1.0,
                use_limit: false,
                exit_reason: None,
            })
            .await;
        assert_eq!(outcome.status, OrderStatus::Rejected);
    }

    #[tokio::test]
    async fn live_order_polls_until_filled() {
        let broker = Arc::new(MockBroker {
            tradable: true,
            fill_after_polls: 1,
            polls: AtomicU32::new(0),
        });
        let executor = Executor::new(broker, false).with_timeout(Duration::from_secs(10));
        let outcome = executor
            .place_and_wait(ExecutionRequest {
                symbol: "BTC-USD".to_string(),
                side: Side::Buy,
                quantity: 0.5,
                mark_price: 100.0,
                use_limit: false,
                exit_reason: None,
            })
            .await;
        assert_eq!(outcome.status, OrderStatus::Filled);
        assert_eq!(outcome.filled_qty, 1.0);
    }

    #[tokio::test]
    async fn not_tradable_instrument_rejected() {
        let broker = Arc::new(MockBroker {
            tradable: false,
            fill_after_polls: 0,
            polls: AtomicU32::new(0),
        });
        let executor = Executor::new(broker, true);
        let outcome = executor
            .place_and_wait(ExecutionRequest {
                symbol: "BTC-USD".to_string(),
                side: Side::Buy,
                quantity: 0.5,
                mark_price: 100.0,
                use_limit: false,
                exit_reason: None,
            })
            .await;
        assert_eq!(outcome.status, OrderStatus::Rejected);
    }
}
