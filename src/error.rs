// =============================================================================
// Error taxonomy
// =============================================================================
//
// One variant per error kind named in the error-handling design: connectivity
// and venue failures carry enough context to log usefully; propagation
// policy (retry next cycle vs abort cycle vs isolate-per-asset) lives in the
// callers, not here — this type only classifies.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TradingError {
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("connectivity error talking to {venue}: {source}")]
    Connectivity {
        venue: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("authentication failed for {0}")]
    AuthenticationFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("venue rejected order for {symbol}: {reason}")]
    VenueRejection { symbol: String, reason: String },

    #[error("malformed response from {venue}: {detail}")]
    MalformedResponse { venue: String, detail: String },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl TradingError {
    /// HTTP status code per §7's translation table.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ConfigurationMissing(_) => 503,
            Self::NotFound(_) => 404,
            Self::InvariantViolation(_) => 400,
            Self::Connectivity { .. }
            | Self::Timeout(_)
            | Self::AuthenticationFailed(_)
            | Self::RateLimited { .. }
            | Self::VenueRejection { .. }
            | Self::MalformedResponse { .. }
            | Self::Fatal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, TradingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(TradingError::ConfigurationMissing("x".into()).status_code(), 503);
        assert_eq!(TradingError::NotFound("x".into()).status_code(), 404);
        assert_eq!(TradingError::InvariantViolation("x".into()).status_code(), 400);
        assert_eq!(
            TradingError::AuthenticationFailed("x".into()).status_code(),
            500
        );
    }
}
