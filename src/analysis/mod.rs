pub mod fundamental;
pub mod trend;

pub use fundamental::{FundamentalAnalysis, FundamentalAnalyzer, FundamentalLabel, FundamentalMetrics};
pub use trend::{Play, ScreenerAnalyzer, ScreenerRow, TrendAnalysis, TrendAnalyzer};
