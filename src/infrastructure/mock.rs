//! Offline adapters: a deterministic synthetic price feed and an in-memory
//! order simulator. These are the default wiring so the engine runs with no
//! broker or data-vendor credentials at all.

use crate::domain::errors::EvaluationError;
use crate::domain::ports::{ExecutionService, ExecutionServiceFactory, MarketDataService};
use crate::domain::types::{
    Candle, ExecutionOutcome, Fill, OrderRequest, OrderSide, Portfolio, Position,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

const SECONDS_PER_DAY: i64 = 86_400;

/// Deterministic random-walk price generator.
///
/// Bars for a given (seed, symbol) pair are identical on every call, which
/// is what makes cached and uncached evaluation paths agree. The benchmark
/// symbol drifts more gently than the tradeable universe so outperformance
/// is attainable but not free.
pub struct SyntheticMarketDataService {
    seed: u64,
    universe: Vec<String>,
    benchmark: String,
}

impl SyntheticMarketDataService {
    pub fn new(seed: u64, universe: Vec<String>, benchmark: &str) -> Self {
        Self {
            seed,
            universe,
            benchmark: benchmark.to_string(),
        }
    }

    fn symbol_rng(&self, symbol: &str) -> StdRng {
        let mut hasher = DefaultHasher::new();
        symbol.hash(&mut hasher);
        StdRng::seed_from_u64(self.seed ^ hasher.finish())
    }
}

#[async_trait]
impl MarketDataService for SyntheticMarketDataService {
    async fn get_historical_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _interval: &str,
    ) -> Result<Vec<Candle>> {
        if symbol != self.benchmark && !self.universe.iter().any(|s| s == symbol) {
            return Err(EvaluationError::DataUnavailable {
                symbol: symbol.to_string(),
            }
            .into());
        }

        let days = (end - start).num_days();
        if days <= 0 {
            return Ok(Vec::new());
        }

        let (drift, volatility) = if symbol == self.benchmark {
            (0.0003, 0.008)
        } else {
            (0.0008, 0.02)
        };

        let mut rng = self.symbol_rng(symbol);
        let mut price = 50.0 + rng.random_range(0.0..150.0);
        let mut bars = Vec::with_capacity(days as usize);
        for day in 0..days {
            let shock: f64 = rng.random_range(-volatility..volatility);
            let prev = price;
            price = (price * (1.0 + drift + shock)).max(1.0);

            let high = prev.max(price) * (1.0 + rng.random_range(0.0..0.005));
            let low = prev.min(price) * (1.0 - rng.random_range(0.0..0.005));
            bars.push(Candle {
                symbol: symbol.to_string(),
                open: Decimal::from_f64(prev).unwrap_or(Decimal::ONE),
                high: Decimal::from_f64(high).unwrap_or(Decimal::ONE),
                low: Decimal::from_f64(low).unwrap_or(Decimal::ONE),
                close: Decimal::from_f64(price).unwrap_or(Decimal::ONE),
                volume: Decimal::from(100_000 + (day % 50) * 1_000),
                timestamp: start.timestamp() + day * SECONDS_PER_DAY,
            });
        }
        debug!(symbol, bars = bars.len(), "generated synthetic history");
        Ok(bars)
    }
}

/// In-memory fill engine with flat-rate commission and symmetric slippage.
/// Orders that the portfolio cannot cover come back rejected, not failed.
pub struct SimulatedExecutionService {
    portfolio: Mutex<Portfolio>,
    commission_rate: Decimal,
    slippage_rate: Decimal,
}

impl SimulatedExecutionService {
    pub fn new(initial_cash: Decimal, commission_rate: Decimal, slippage_rate: Decimal) -> Self {
        Self {
            portfolio: Mutex::new(Portfolio::new(initial_cash)),
            commission_rate,
            slippage_rate,
        }
    }

    /// Frictionless variant used by backtests that want signal quality
    /// isolated from cost assumptions.
    pub fn frictionless(initial_cash: Decimal) -> Self {
        Self::new(initial_cash, Decimal::ZERO, Decimal::ZERO)
    }
}

#[async_trait]
impl ExecutionService for SimulatedExecutionService {
    async fn execute(&self, order: OrderRequest) -> Result<ExecutionOutcome> {
        if order.quantity <= Decimal::ZERO || order.price <= Decimal::ZERO {
            return Ok(ExecutionOutcome::Rejected {
                reason: format!(
                    "non-positive quantity or price: {} @ {}",
                    order.quantity, order.price
                ),
            });
        }

        let mut portfolio = self.portfolio.lock().await;
        match order.side {
            OrderSide::Buy => {
                let fill_price = order.price * (Decimal::ONE + self.slippage_rate);
                let notional = order.quantity * fill_price;
                let fee = notional * self.commission_rate;
                let cost = notional + fee;
                if cost > portfolio.cash {
                    return Ok(ExecutionOutcome::Rejected {
                        reason: format!("insufficient cash: need {}, have {}", cost, portfolio.cash),
                    });
                }

                portfolio.cash -= cost;
                let position = portfolio
                    .positions
                    .entry(order.symbol.clone())
                    .or_insert_with(|| Position {
                        symbol: order.symbol.clone(),
                        quantity: Decimal::ZERO,
                        average_price: Decimal::ZERO,
                    });
                let prior_notional = position.quantity * position.average_price;
                position.quantity += order.quantity;
                position.average_price =
                    (prior_notional + notional) / position.quantity;

                Ok(ExecutionOutcome::Filled(Fill {
                    price: fill_price,
                    fee,
                }))
            }
            OrderSide::Sell => {
                let held = portfolio.position_qty(&order.symbol);
                if held < order.quantity {
                    return Ok(ExecutionOutcome::Rejected {
                        reason: format!(
                            "insufficient position: selling {}, holding {}",
                            order.quantity, held
                        ),
                    });
                }

                let fill_price = order.price * (Decimal::ONE - self.slippage_rate);
                let notional = order.quantity * fill_price;
                let fee = notional * self.commission_rate;
                portfolio.cash += notional - fee;

                let remaining = held - order.quantity;
                if remaining == Decimal::ZERO {
                    portfolio.positions.remove(&order.symbol);
                } else if let Some(position) = portfolio.positions.get_mut(&order.symbol) {
                    position.quantity = remaining;
                }

                Ok(ExecutionOutcome::Filled(Fill {
                    price: fill_price,
                    fee,
                }))
            }
        }
    }

    async fn get_portfolio(&self) -> Result<Portfolio> {
        Ok(self.portfolio.lock().await.clone())
    }
}

/// Factory producing one frictionless simulator per backtest so parallel
/// evaluations never share portfolio state.
pub fn simulated_execution_factory(initial_cash: Decimal) -> ExecutionServiceFactory {
    Arc::new(move || {
        Arc::new(SimulatedExecutionService::frictionless(initial_cash)) as Arc<dyn ExecutionService>
    })
}
