//! Backtest-based fitness evaluation for strategy candidates.
//!
//! One candidate is scored by replaying the configured symbols bar by bar,
//! routing entries and exits through an isolated [`ExecutionService`], and
//! deriving a [`MetricSet`] from the mark-to-market equity curve. Batches
//! fan out over a bounded rayon pool; each worker re-enters the tokio
//! runtime with `Handle::block_on` for the async execution seam.

use crate::application::evolution::cache::{BenchmarkDataCache, CachedDataset, DatasetKey};
use crate::application::strategies::OscillatorStrategy;
use crate::config::EvolutionConfig;
use crate::domain::candidate::StrategyCandidate;
use crate::domain::errors::EvaluationError;
use crate::domain::metrics::MetricSet;
use crate::domain::performance::StrategyPerformance;
use crate::domain::ports::{ExecutionServiceFactory, MarketDataService};
use crate::domain::types::{Candle, ExecutionOutcome, OrderRequest, OrderSide};
use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use rayon::prelude::*;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Hard cap on backtest length. One trading year keeps every candidate's
/// evaluation window identical regardless of how much history the provider
/// returned.
const MAX_BACKTEST_BARS: usize = 252;

/// Worker-pool hard cap for batch evaluation.
const MAX_PARALLEL_WORKERS: usize = 8;

/// Close-price view of one fetched dataset, already capped to the backtest
/// window. Shared read-only across the worker pool.
#[derive(Debug, Clone)]
pub struct MarketDataset {
    pub candles: BTreeMap<String, Vec<Candle>>,
    pub benchmark_return_pct: f64,
}

pub struct FitnessEvaluator {
    market_data: Arc<dyn MarketDataService>,
    execution_factory: ExecutionServiceFactory,
    cache: Mutex<BenchmarkDataCache>,
    config: EvolutionConfig,
}

impl FitnessEvaluator {
    pub fn new(
        market_data: Arc<dyn MarketDataService>,
        execution_factory: ExecutionServiceFactory,
        config: EvolutionConfig,
    ) -> Self {
        let ttl = Duration::from_secs(config.cache_ttl_minutes * 60);
        Self {
            market_data,
            execution_factory,
            cache: Mutex::new(BenchmarkDataCache::new(ttl)),
            config,
        }
    }

    /// Fetch the evaluation dataset, serving repeat calls from the TTL cache
    /// so a whole batch costs one provider round trip.
    pub async fn fetch_dataset(&self) -> Result<MarketDataset> {
        let key = DatasetKey::new(
            &self.config.symbols,
            &self.config.benchmark,
            self.config.period_days,
            &self.config.interval,
        );

        {
            let cache = self.cache.lock().await;
            if let Some(cached) = cache.get(&key) {
                debug!("dataset cache hit");
                return Ok(Self::to_market_dataset(cached));
            }
        }

        let end = Utc::now();
        let start = end - ChronoDuration::days(self.config.period_days);

        let mut series = BTreeMap::new();
        for symbol in &self.config.symbols {
            let bars = self
                .market_data
                .get_historical_bars(symbol, start, end, &self.config.interval)
                .await
                .with_context(|| format!("fetching history for {}", symbol))?;
            if bars.is_empty() {
                warn!(symbol = %symbol, "no price history returned");
            }
            series.insert(symbol.clone(), bars);
        }

        let benchmark = self
            .market_data
            .get_historical_bars(&self.config.benchmark, start, end, &self.config.interval)
            .await
            .with_context(|| format!("fetching benchmark {}", self.config.benchmark))?;

        let dataset = CachedDataset { series, benchmark };
        let view = Self::to_market_dataset(&dataset);
        self.cache.lock().await.insert(key, dataset);
        Ok(view)
    }

    fn to_market_dataset(dataset: &CachedDataset) -> MarketDataset {
        let candles = dataset
            .series
            .iter()
            .map(|(symbol, bars)| (symbol.clone(), cap_bars(bars)))
            .collect();
        MarketDataset {
            candles,
            benchmark_return_pct: simple_return_pct(&cap_bars(&dataset.benchmark)),
        }
    }

    /// Backtest one candidate against every configured symbol and average
    /// the per-symbol metrics.
    ///
    /// Symbols with fewer than `min_history_bars` of history contribute a
    /// neutral zero-metric set; if nothing has enough history the candidate
    /// gets a neutral record rather than an error.
    pub async fn test_candidate(
        &self,
        candidate: &StrategyCandidate,
        dataset: &MarketDataset,
    ) -> Result<StrategyPerformance, EvaluationError> {
        let strategy = OscillatorStrategy::from_params(&candidate.parameters)?;

        let mut per_symbol = Vec::new();
        for (symbol, bars) in &dataset.candles {
            if bars.len() < self.config.min_history_bars {
                debug!(
                    symbol = %symbol,
                    bars = bars.len(),
                    required = self.config.min_history_bars,
                    "insufficient history, scoring neutral"
                );
                per_symbol.push(MetricSet::default());
                continue;
            }
            let metrics = self.simulate(candidate, &strategy, symbol, bars).await?;
            per_symbol.push(metrics);
        }

        if per_symbol.is_empty() {
            return Ok(StrategyPerformance::neutral(&candidate.id));
        }

        let averaged = average_metrics(&per_symbol);
        Ok(StrategyPerformance::from_metrics(
            &candidate.id,
            &averaged,
            dataset.benchmark_return_pct,
        ))
    }

    /// Replay one symbol bar by bar through a fresh simulator instance.
    ///
    /// A rejected order is recorded as "no trade" and the signal state is
    /// rolled back so the strategy may retry on a later crossing; only a
    /// transport-level execution failure aborts the candidate.
    async fn simulate(
        &self,
        candidate: &StrategyCandidate,
        strategy: &OscillatorStrategy,
        symbol: &str,
        bars: &[Candle],
    ) -> Result<MetricSet, EvaluationError> {
        let execution = (self.execution_factory)();
        let closes: Vec<f64> = bars
            .iter()
            .map(|b| b.close.to_f64().unwrap_or(0.0))
            .collect();
        let osc = strategy.oscillator(&closes);

        let mut equity = Vec::with_capacity(bars.len());
        let mut long = false;
        let mut held_qty = Decimal::ZERO;
        let mut prev_osc = 0.0;
        let mut num_trades = 0;

        for (i, bar) in bars.iter().enumerate() {
            let value = osc[i];
            if long {
                if value >= strategy.sell_threshold || value < strategy.buy_threshold {
                    let order = order_for(symbol, OrderSide::Sell, held_qty, bar);
                    match execution
                        .execute(order)
                        .await
                        .map_err(|e| execution_failed(&candidate.id, &e))?
                    {
                        ExecutionOutcome::Filled(_) => {
                            long = false;
                            held_qty = Decimal::ZERO;
                        }
                        ExecutionOutcome::Rejected { reason } => {
                            warn!(candidate = %candidate.id, %reason, "exit order rejected");
                        }
                    }
                }
            } else if i > 0 && prev_osc < strategy.buy_threshold && value >= strategy.buy_threshold
            {
                let portfolio = execution
                    .get_portfolio()
                    .await
                    .map_err(|e| execution_failed(&candidate.id, &e))?;
                let qty = entry_quantity(portfolio.cash, strategy.risk_fraction, bar.close);
                if qty > Decimal::ZERO {
                    let order = order_for(symbol, OrderSide::Buy, qty, bar);
                    match execution
                        .execute(order)
                        .await
                        .map_err(|e| execution_failed(&candidate.id, &e))?
                    {
                        ExecutionOutcome::Filled(_) => {
                            long = true;
                            held_qty = qty;
                            num_trades += 1;
                        }
                        ExecutionOutcome::Rejected { reason } => {
                            debug!(candidate = %candidate.id, %reason, "entry order rejected");
                        }
                    }
                }
            }
            prev_osc = value;

            let portfolio = execution
                .get_portfolio()
                .await
                .map_err(|e| execution_failed(&candidate.id, &e))?;
            let marked = portfolio.equity_at(symbol, bar.close);
            equity.push(marked.to_f64().unwrap_or(0.0));
        }

        Ok(MetricSet::from_equity_curve(&equity, num_trades))
    }

    /// Evaluate a batch of candidates against one shared dataset.
    ///
    /// Candidates whose evaluation fails are logged and dropped; survivors
    /// keep their original batch order so result attribution stays aligned
    /// with candidate identity.
    pub async fn test_batch(
        &self,
        candidates: &[StrategyCandidate],
    ) -> Result<Vec<(StrategyCandidate, StrategyPerformance)>> {
        let dataset = self.fetch_dataset().await?;
        let workers = self
            .config
            .max_workers
            .min(MAX_PARALLEL_WORKERS)
            .min(candidates.len().max(1));

        info!(
            candidates = candidates.len(),
            workers, "evaluating candidate batch"
        );

        let outcomes: Vec<(StrategyCandidate, Result<StrategyPerformance, EvaluationError>)> =
            if workers <= 1 {
                let mut outcomes = Vec::with_capacity(candidates.len());
                for candidate in candidates {
                    let result = self.test_candidate(candidate, &dataset).await;
                    outcomes.push((candidate.clone(), result));
                }
                outcomes
            } else {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .context("building evaluation thread pool")?;
                let handle = Handle::current();
                pool.install(|| {
                    candidates
                        .par_iter()
                        .map(|candidate| {
                            let result =
                                handle.block_on(self.test_candidate(candidate, &dataset));
                            (candidate.clone(), result)
                        })
                        .collect()
                })
            };

        let mut results = Vec::with_capacity(outcomes.len());
        for (candidate, outcome) in outcomes {
            match outcome {
                Ok(performance) => results.push((candidate, performance)),
                Err(e) => {
                    warn!(candidate = %candidate.id, error = %e, "candidate evaluation failed");
                }
            }
        }
        Ok(results)
    }
}

fn cap_bars(bars: &[Candle]) -> Vec<Candle> {
    if bars.len() > MAX_BACKTEST_BARS {
        bars[bars.len() - MAX_BACKTEST_BARS..].to_vec()
    } else {
        bars.to_vec()
    }
}

fn simple_return_pct(bars: &[Candle]) -> f64 {
    if bars.len() < 2 {
        return 0.0;
    }
    let first = bars[0].close.to_f64().unwrap_or(0.0);
    let last = bars[bars.len() - 1].close.to_f64().unwrap_or(0.0);
    if first > 0.0 {
        (last - first) / first * 100.0
    } else {
        0.0
    }
}

fn order_for(symbol: &str, side: OrderSide, quantity: Decimal, bar: &Candle) -> OrderRequest {
    OrderRequest {
        id: Uuid::new_v4().to_string(),
        symbol: symbol.to_string(),
        side,
        quantity,
        price: bar.close,
        timestamp: bar.timestamp,
    }
}

fn entry_quantity(cash: Decimal, risk_fraction: f64, price: Decimal) -> Decimal {
    if price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let risk = Decimal::from_f64(risk_fraction).unwrap_or(Decimal::ONE);
    ((cash * risk) / price).round_dp(4)
}

fn execution_failed(candidate_id: &str, error: &anyhow::Error) -> EvaluationError {
    EvaluationError::ExecutionFailed {
        candidate_id: candidate_id.to_string(),
        reason: error.to_string(),
    }
}

fn average_metrics(sets: &[MetricSet]) -> MetricSet {
    let n = sets.len() as f64;
    MetricSet {
        total_return_pct: sets.iter().map(|m| m.total_return_pct).sum::<f64>() / n,
        sharpe_ratio: sets.iter().map(|m| m.sharpe_ratio).sum::<f64>() / n,
        max_drawdown_pct: sets.iter().map(|m| m.max_drawdown_pct).sum::<f64>() / n,
        win_rate: sets.iter().map(|m| m.win_rate).sum::<f64>() / n,
        num_trades: sets.iter().map(|m| m.num_trades).sum(),
    }
}
