pub mod service;

pub use service::{CycleSummary, HunterCycleConfig, HunterService};
