pub mod error;
pub mod marketing;
pub mod trading;

pub use error::{Result, SensorError};
pub use marketing::{MarketingSensor, Tweet};
pub use trading::{PortfolioSnapshot, TokenHolding, TradingSensor};

use async_trait::async_trait;

/// A named metric provider. Implementations degrade to documented mock
/// values on any failure, so a cycle never stalls on sensor I/O — the
/// orchestrator just sees a state string.
#[async_trait]
pub trait MetricSensor: Send + Sync {
    /// Snapshot of the named metric rendered as text for prompt
    /// interpolation (a JSON portfolio for `wallet`, a bare integer for
    /// `followers`/`likes`).
    async fn metric_state(&self, metric_name: &str) -> String;
}
