//! Dividend analysis building blocks
//!
//! Raw market data comes from a [`MetricsSource`]; metrics and ranking are
//! pure functions over that data; rendering turns a ranking into a report
//! file.

pub mod brapi;
pub mod metrics;
pub mod ranking;
pub mod report;

pub use brapi::BrapiClient;
pub use metrics::calc_metrics_from_raw;
pub use ranking::{rank, Recommender, ThresholdRecommender};
pub use report::{MarkdownReportRenderer, ReportRenderer};

use crate::Result;
use serde_json::Value;

/// Trait for an external market data provider
#[async_trait::async_trait]
pub trait MetricsSource: Send + Sync {
    /// Raw provider document for `ticker` over `period` (e.g. `1y`, `6mo`).
    async fn fetch_raw(&self, ticker: &str, period: &str) -> Result<Value>;
}
