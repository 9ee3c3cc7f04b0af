//! End-to-end evolution cycles over the synthetic offline market.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evotrade::application::evolution::{
    AdaptiveController, FitnessEvaluator, GenerationOrchestrator, PopulationManager,
};
use evotrade::config::EvolutionConfig;
use evotrade::domain::candidate::{GeneratorMethod, ParameterDomains, StrategyCandidate};
use evotrade::domain::metrics::MetricSet;
use evotrade::domain::performance::StrategyPerformance;
use evotrade::domain::ports::MarketDataService;
use evotrade::domain::repositories::{EvolutionState, EvolutionStateRepository};
use evotrade::domain::types::Candle;
use evotrade::infrastructure::mock::{simulated_execution_factory, SyntheticMarketDataService};
use evotrade::infrastructure::persistence::JsonStateStore;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!(
        "evotrade-flow-test-{}-{}",
        std::process::id(),
        DIR_COUNTER.fetch_add(1, Ordering::SeqCst)
    ))
}

fn test_config(state_dir: &PathBuf) -> EvolutionConfig {
    EvolutionConfig {
        population_size: 8,
        max_workers: 2,
        symbols: vec!["AAPL".to_string(), "MSFT".to_string()],
        benchmark: "SPY".to_string(),
        state_dir: state_dir.clone(),
        ..EvolutionConfig::default()
    }
}

fn evaluator(config: &EvolutionConfig) -> Arc<FitnessEvaluator> {
    let market_data = Arc::new(SyntheticMarketDataService::new(
        7,
        config.symbols.clone(),
        &config.benchmark,
    ));
    Arc::new(FitnessEvaluator::new(
        market_data,
        simulated_execution_factory(dec!(100000)),
        config.clone(),
    ))
}

async fn orchestrator(config: &EvolutionConfig) -> GenerationOrchestrator {
    let repository = Arc::new(JsonStateStore::new(&config.state_dir).unwrap());
    let population = PopulationManager::new(
        repository.clone(),
        config.initial_mutation_rate,
        config.initial_crossover_rate,
        None,
    )
    .await
    .unwrap();
    GenerationOrchestrator::new(population, evaluator(config), repository, config.clone())
}

fn passing_elite(index: usize) -> (StrategyCandidate, StrategyPerformance) {
    let candidate = StrategyCandidate::new(
        0,
        GeneratorMethod::Random,
        index,
        ParameterDomains::default().defaults(),
        vec![],
    );
    let metrics = MetricSet {
        total_return_pct: 15.0 + index as f64,
        ..MetricSet::default()
    };
    let performance = StrategyPerformance::from_metrics(&candidate.id, &metrics, 0.0);
    (candidate, performance)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_generation_run_persists_reports() {
    let dir = temp_dir();
    let config = test_config(&dir);

    let mut orch = orchestrator(&config).await;
    let reports = orch.run_multiple_generations(2).await.unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].generation, 0);
    assert_eq!(reports[1].generation, 1);
    for report in &reports {
        assert_eq!(report.candidate_count, config.population_size);
        assert!(report.pass_rate >= 0.0 && report.pass_rate <= 1.0);
        assert!(report.best_candidate_id.is_some());
    }

    let store = JsonStateStore::new(&dir).unwrap();
    let persisted = store.load_reports().await.unwrap();
    assert_eq!(persisted.len(), 2);
    assert_eq!(persisted[1].generation, 1);

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resume_picks_up_where_the_run_stopped() {
    let dir = temp_dir();
    let config = test_config(&dir);

    {
        let mut orch = orchestrator(&config).await;
        orch.run_generation().await.unwrap();
    }

    let mut resumed = orchestrator(&config).await;
    assert_eq!(resumed.population().generation(), 1);
    assert_eq!(resumed.population().results().len(), config.population_size);

    let report = resumed.run_generation().await.unwrap();
    assert_eq!(report.generation, 1);
    assert_eq!(
        resumed.population().results().len(),
        2 * config.population_size
    );

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cold_start_runs_on_configured_initial_rates() {
    let dir = temp_dir();
    let config = test_config(&dir);

    let mut orch = orchestrator(&config).await;
    orch.run_generation().await.unwrap();
    // No prior report existed, so the first cycle must not touch the
    // configured rates.
    assert_eq!(
        orch.population().mutation_rate(),
        config.initial_mutation_rate
    );
    assert_eq!(
        orch.population().crossover_rate(),
        config.initial_crossover_rate
    );

    // With one report on record, the second cycle adapts off its pass rate.
    let store = JsonStateStore::new(&dir).unwrap();
    let pass_rate = store.load_reports().await.unwrap()[0].pass_rate;
    orch.run_generation().await.unwrap();
    let (mutation, crossover) = AdaptiveController::new().calculate_adaptive_rates(pass_rate, 1);
    assert_eq!(orch.population().mutation_rate(), mutation);
    assert_eq!(orch.population().crossover_rate(), crossover);

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_seeded_elites_are_bred_from_and_never_evicted() {
    let dir = temp_dir();
    let config = test_config(&dir);

    // Seed a persisted state with two passed elites so generation 1 has
    // breeding stock regardless of market luck.
    let store = JsonStateStore::new(&dir).unwrap();
    let (elite_a, perf_a) = passing_elite(0);
    let (elite_b, perf_b) = passing_elite(1);
    store
        .save_state(&EvolutionState {
            generation: 1,
            elites: vec![(elite_a, perf_a.clone()), (elite_b, perf_b.clone())],
            results: vec![perf_a, perf_b],
            mutation_rate: 0.3,
            crossover_rate: 0.7,
            ..EvolutionState::default()
        })
        .await
        .unwrap();

    let mut orch = orchestrator(&config).await;
    assert_eq!(orch.population().elites().len(), 2);

    orch.run_generation().await.unwrap();

    let bred = orch
        .population()
        .results()
        .iter()
        .any(|p| p.candidate_id.contains("-mutation-") || p.candidate_id.contains("-crossover-"));
    assert!(bred);
    // The seeded elites are still present whatever this generation scored.
    assert!(orch.population().elites().len() >= 2);

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_batch_drops_invalid_candidates_and_keeps_order() {
    let dir = temp_dir();
    let config = test_config(&dir);
    let evaluator = evaluator(&config);

    let domains = ParameterDomains::default();
    let mut candidates = Vec::new();
    for i in 0..5 {
        let mut params = domains.defaults();
        if i == 1 || i == 3 {
            // Below the minimum lookback; evaluation must fail for these.
            params.insert("osc_period".to_string(), 0.0);
        }
        candidates.push(StrategyCandidate::new(
            0,
            GeneratorMethod::Random,
            i,
            params,
            vec![],
        ));
    }

    let results = evaluator.test_batch(&candidates).await.unwrap();
    assert_eq!(results.len(), 3);
    let ids: Vec<&str> = results.iter().map(|(c, _)| c.id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["gen000-random-00", "gen000-random-02", "gen000-random-04"]
    );
    for (candidate, performance) in &results {
        assert_eq!(candidate.id, performance.candidate_id);
    }

    let _ = std::fs::remove_dir_all(dir);
}

/// Rising market, flat benchmark: serves a climbing series for every
/// tradeable symbol and a constant-price benchmark.
struct RisingMarket {
    benchmark: String,
}

#[async_trait]
impl MarketDataService for RisingMarket {
    async fn get_historical_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _interval: &str,
    ) -> Result<Vec<Candle>> {
        let days = (end - start).num_days().max(0) as usize;
        let bars = (0..days)
            .map(|i| {
                let close = if symbol == self.benchmark {
                    100.0
                } else {
                    100.0 + i as f64
                };
                Candle {
                    symbol: symbol.to_string(),
                    open: Decimal::from_f64(close).unwrap(),
                    high: Decimal::from_f64(close + 0.5).unwrap(),
                    low: Decimal::from_f64(close - 0.5).unwrap(),
                    close: Decimal::from_f64(close).unwrap(),
                    volume: dec!(1000),
                    timestamp: start.timestamp() + i as i64 * 86_400,
                }
            })
            .collect();
        Ok(bars)
    }
}

#[tokio::test]
async fn test_default_thresholds_profit_on_rising_series() {
    let config = EvolutionConfig {
        symbols: vec!["UPUP".to_string()],
        benchmark: "FLAT".to_string(),
        period_days: 60,
        ..EvolutionConfig::default()
    };
    let evaluator = FitnessEvaluator::new(
        Arc::new(RisingMarket {
            benchmark: "FLAT".to_string(),
        }),
        simulated_execution_factory(dec!(10000)),
        config,
    );

    let candidate = StrategyCandidate::new(
        0,
        GeneratorMethod::Random,
        0,
        ParameterDomains::default().defaults(),
        vec![],
    );
    let dataset = evaluator.fetch_dataset().await.unwrap();
    let performance = evaluator.test_candidate(&candidate, &dataset).await.unwrap();

    assert!(performance.total_return > 0.0, "got {}", performance.total_return);
    assert_eq!(performance.benchmark_return, 0.0);
    assert!(performance.outperformance > 0.0);
    assert!(performance.num_trades >= 1);
}

#[tokio::test]
async fn test_state_snapshot_save_is_idempotent() {
    let dir = temp_dir();
    let store = JsonStateStore::new(&dir).unwrap();

    let state = EvolutionState {
        generation: 2,
        mutation_rate: 0.3,
        crossover_rate: 0.7,
        ..EvolutionState::default()
    };
    store.save_state(&state).await.unwrap();
    let first = std::fs::read(dir.join("evolution_state.json")).unwrap();

    let reloaded = store.load_state().await.unwrap().unwrap();
    store.save_state(&reloaded).await.unwrap();
    let second = std::fs::read(dir.join("evolution_state.json")).unwrap();

    assert_eq!(first, second);

    let _ = std::fs::remove_dir_all(dir);
}
