//! Command-line entry point: evolutionary parameter search and walk-forward
//! validation over the synthetic offline market.

use anyhow::Result;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use evotrade::application::evolution::{FitnessEvaluator, GenerationOrchestrator, PopulationManager};
use evotrade::application::ml::HeuristicPredictor;
use evotrade::application::walkforward::WalkForwardAnalyzer;
use evotrade::config::{EvolutionConfig, WalkForwardConfig};
use evotrade::infrastructure::mock::{simulated_execution_factory, SyntheticMarketDataService};
use evotrade::infrastructure::persistence::JsonStateStore;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "evolve", version, about = "Evolutionary strategy search and validation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one or more evolutionary generation cycles
    Run {
        /// Number of generation cycles to run
        #[arg(long, default_value_t = 1)]
        generations: u32,

        /// Seed for the synthetic price feed
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Walk-forward robustness validation for one symbol
    Walkforward {
        /// Symbol to validate; defaults to the first configured symbol
        #[arg(long)]
        symbol: Option<String>,

        /// Trailing history window in days
        #[arg(long, default_value_t = 730)]
        days: i64,

        /// Seed for the synthetic price feed
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { generations, seed } => run_evolution(generations, seed).await,
        Command::Walkforward { symbol, days, seed } => run_walkforward(symbol, days, seed).await,
    }
}

async fn run_evolution(generations: u32, seed: u64) -> Result<()> {
    let config = EvolutionConfig::from_env()?;
    info!(?config, generations, "starting evolutionary search");

    let repository = Arc::new(JsonStateStore::new(&config.state_dir)?);
    let market_data = Arc::new(SyntheticMarketDataService::new(
        seed,
        config.symbols.clone(),
        &config.benchmark,
    ));
    let evaluator = Arc::new(FitnessEvaluator::new(
        market_data,
        simulated_execution_factory(dec!(100000)),
        config.clone(),
    ));
    let population = PopulationManager::new(
        repository.clone(),
        config.initial_mutation_rate,
        config.initial_crossover_rate,
        Some(Arc::new(HeuristicPredictor::new())),
    )
    .await?;

    let mut orchestrator =
        GenerationOrchestrator::new(population, evaluator, repository, config);
    let reports = orchestrator.run_multiple_generations(generations).await?;

    for report in &reports {
        println!(
            "generation {:>3}: {:>2}/{} passed ({:>5.1}%), best {} ({:+.2}pp), avg sharpe {:+.2}",
            report.generation,
            report.passed_count,
            report.candidate_count,
            report.pass_rate * 100.0,
            report.best_candidate_id.as_deref().unwrap_or("-"),
            report.best_outperformance,
            report.avg_sharpe,
        );
    }

    let best = orchestrator.population().elites().first();
    if let Some((candidate, performance)) = best {
        println!(
            "\nbest candidate so far: {} (outperformance {:+.2}pp, sharpe {:+.2})",
            candidate.id, performance.outperformance, performance.sharpe_ratio
        );
        for (name, value) in &candidate.parameters {
            println!("  {:<16} {:.4}", name, value);
        }
    }
    Ok(())
}

async fn run_walkforward(symbol: Option<String>, days: i64, seed: u64) -> Result<()> {
    let evolution = EvolutionConfig::from_env()?;
    let config = WalkForwardConfig::from_env()?;
    let symbol = symbol
        .or_else(|| evolution.symbols.first().cloned())
        .unwrap_or_else(|| "AAPL".to_string());
    info!(symbol, days, "starting walk-forward validation");

    let market_data = Arc::new(SyntheticMarketDataService::new(
        seed,
        evolution.symbols.clone(),
        &evolution.benchmark,
    ));
    let analyzer = WalkForwardAnalyzer::new(market_data, config, &evolution.interval);

    let end = Utc::now();
    let analysis = analyzer.analyze(&symbol, end - Duration::days(days), end).await?;

    println!("walk-forward analysis for {}", analysis.symbol);
    for result in &analysis.windows {
        println!(
            "  window {:>2}: train {} .. {}, test {} .. {} | IS sharpe {:+.2}, OOS sharpe {:+.2}, overfit {:.2}",
            result.window.window_num,
            result.window.train_start.format("%Y-%m-%d"),
            result.window.train_end.format("%Y-%m-%d"),
            result.window.test_start.format("%Y-%m-%d"),
            result.window.test_end.format("%Y-%m-%d"),
            result.in_sample.sharpe_ratio,
            result.out_of_sample.sharpe_ratio,
            result.overfitting_ratio,
        );
    }
    println!(
        "\nwindows {}, avg OOS sharpe {:+.2}, avg OOS return {:+.2}%, overfitting {:.2}, stability {:.2}",
        analysis.windows.len(),
        analysis.avg_oos_sharpe,
        analysis.avg_oos_return,
        analysis.overfitting_score,
        analysis.parameter_stability,
    );
    println!("recommendation: {}", analysis.recommendation);
    Ok(())
}
