// =============================================================================
// BrokerHistoryProvider — MarketDataProvider backed by a BrokerAdapter
// =============================================================================
//
// The simplest provider in the chain: delegates straight to whatever venue
// the hunter is already trading through via `historical_prices`. Kept first
// in the gateway's provider list for each hunter so a quiet venue doesn't
// stall analysis waiting on a second network hop when it already has the
// series on hand.

use async_trait::async_trait;
use std::sync::Arc;

use crate::broker::BrokerAdapter;
use crate::error::TradingError;

use super::MarketDataProvider;

pub struct BrokerHistoryProvider {
    broker: Arc<dyn BrokerAdapter>,
}

impl BrokerHistoryProvider {
    pub fn new(broker: Arc<dyn BrokerAdapter>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl MarketDataProvider for BrokerHistoryProvider {
    fn name(&self) -> &str {
        "broker"
    }

    async fn fetch_closes(&self, symbol: &str, days: u32) -> Result<Vec<f64>, TradingError> {
        self.broker.historical_prices(symbol, days).await
    }
}
