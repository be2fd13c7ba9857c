// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the core technical indicators used
// by the trading engine.  Every public function returns `Option`/`Vec` so
// callers are forced to handle insufficient-data and numerical-edge-case
// scenarios rather than panicking.

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod support_resistance;
