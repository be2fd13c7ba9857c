pub mod broker_provider;
pub mod gateway;

pub use broker_provider::BrokerHistoryProvider;
pub use gateway::{Candle, MarketDataGateway, MarketDataProvider};
