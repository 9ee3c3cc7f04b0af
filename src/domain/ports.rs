use crate::domain::types::{Candle, ExecutionOutcome, OrderRequest, Portfolio};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Historical price provider. Implementations must return an empty vector,
/// not an error, when no data exists for the requested range; the evaluator
/// turns that into a neutral result.
#[async_trait]
pub trait MarketDataService: Send + Sync {
    async fn get_historical_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: &str,
    ) -> Result<Vec<Candle>>;
}

/// Order/portfolio simulator consumed by the fitness evaluator. Fill
/// pricing, commission, and slippage live behind this seam.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    async fn execute(&self, order: OrderRequest) -> Result<ExecutionOutcome>;
    async fn get_portfolio(&self) -> Result<Portfolio>;
}

/// Each backtest gets its own isolated simulator so parallel candidate
/// evaluations never share portfolio state.
pub type ExecutionServiceFactory = Arc<dyn Fn() -> Arc<dyn ExecutionService> + Send + Sync>;
