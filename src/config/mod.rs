//! Configuration for the evolutionary search and walk-forward validation.
//!
//! Everything has a hard default so the engine runs with zero environment;
//! `from_env()` overrides individual knobs via `EVOTRADE_*` variables.

use crate::domain::walkforward::TargetMetric;
use anyhow::{ensure, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Knobs for the evolutionary loop and its fitness evaluator.
#[derive(Debug, Clone)]
pub struct EvolutionConfig {
    /// Candidates per generation.
    pub population_size: usize,
    /// Worker-pool bound for parallel evaluation. Hard-capped at 8.
    pub max_workers: usize,
    /// Symbols the fitness evaluator backtests against.
    pub symbols: Vec<String>,
    /// Benchmark symbol outperformance is measured against.
    pub benchmark: String,
    /// Bar interval requested from the data provider.
    pub interval: String,
    /// Trailing data window in days; backtests never see more than one
    /// calendar year of bars regardless of this value.
    pub period_days: i64,
    /// Price-series cache time-to-live, minutes.
    pub cache_ttl_minutes: u64,
    /// Below this many bars a candidate gets a neutral zero-metric result.
    pub min_history_bars: usize,
    /// Population diversity below this is logged as a warning.
    pub diversity_warn_threshold: f64,
    pub initial_mutation_rate: f64,
    pub initial_crossover_rate: f64,
    /// Directory for the JSON state store.
    pub state_dir: PathBuf,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            max_workers: 4,
            symbols: vec!["AAPL".to_string(), "MSFT".to_string(), "NVDA".to_string()],
            benchmark: "SPY".to_string(),
            interval: "1Day".to_string(),
            period_days: 365,
            cache_ttl_minutes: 60,
            min_history_bars: 20,
            diversity_warn_threshold: 0.3,
            initial_mutation_rate: 0.3,
            initial_crossover_rate: 0.7,
            state_dir: PathBuf::from(".evotrade"),
        }
    }
}

impl EvolutionConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            population_size: parse_env("EVOTRADE_POPULATION_SIZE", defaults.population_size)?,
            max_workers: parse_env("EVOTRADE_MAX_WORKERS", defaults.max_workers)?,
            symbols: env::var("EVOTRADE_SYMBOLS")
                .map(|s| s.split(',').map(|v| v.trim().to_string()).collect())
                .unwrap_or(defaults.symbols),
            benchmark: env::var("EVOTRADE_BENCHMARK").unwrap_or(defaults.benchmark),
            interval: env::var("EVOTRADE_INTERVAL").unwrap_or(defaults.interval),
            period_days: parse_env("EVOTRADE_PERIOD_DAYS", defaults.period_days)?,
            cache_ttl_minutes: parse_env("EVOTRADE_CACHE_TTL_MINUTES", defaults.cache_ttl_minutes)?,
            min_history_bars: parse_env("EVOTRADE_MIN_HISTORY_BARS", defaults.min_history_bars)?,
            diversity_warn_threshold: parse_env(
                "EVOTRADE_DIVERSITY_WARN",
                defaults.diversity_warn_threshold,
            )?,
            initial_mutation_rate: parse_env(
                "EVOTRADE_MUTATION_RATE",
                defaults.initial_mutation_rate,
            )?,
            initial_crossover_rate: parse_env(
                "EVOTRADE_CROSSOVER_RATE",
                defaults.initial_crossover_rate,
            )?,
            state_dir: env::var("EVOTRADE_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_dir),
        })
    }
}

/// Knobs for the walk-forward validator.
#[derive(Debug, Clone)]
pub struct WalkForwardConfig {
    pub train_days: i64,
    pub test_days: i64,
    /// Windows whose train or test slice spans fewer days are skipped.
    pub min_window_days: i64,
    /// Evenly spaced values sampled per tunable parameter. A coarse grid
    /// is a deliberate speed/quality tradeoff; raise it for finer search.
    pub grid_points: usize,
    pub target_metric: TargetMetric,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            train_days: 180,
            test_days: 60,
            min_window_days: 30,
            grid_points: 10,
            target_metric: TargetMetric::Sharpe,
        }
    }
}

impl WalkForwardConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            train_days: parse_env("EVOTRADE_WF_TRAIN_DAYS", defaults.train_days)?,
            test_days: parse_env("EVOTRADE_WF_TEST_DAYS", defaults.test_days)?,
            min_window_days: parse_env("EVOTRADE_WF_MIN_WINDOW_DAYS", defaults.min_window_days)?,
            grid_points: parse_env("EVOTRADE_WF_GRID_POINTS", defaults.grid_points)?,
            target_metric: match env::var("EVOTRADE_WF_TARGET") {
                Ok(raw) => TargetMetric::from_str(&raw)?,
                Err(_) => defaults.target_metric,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the window builder cannot make progress with. The
    /// frame slides by `test_days`, so a non-positive span never ends.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.train_days > 0,
            "train_days must be positive, got {}",
            self.train_days
        );
        ensure!(
            self.test_days > 0,
            "test_days must be positive, got {}",
            self.test_days
        );
        ensure!(
            self.min_window_days >= 0,
            "min_window_days must not be negative, got {}",
            self.min_window_days
        );
        ensure!(self.grid_points >= 2, "grid_points must be at least 2");
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = EvolutionConfig::default();
        assert_eq!(cfg.population_size, 20);
        assert!(cfg.max_workers <= 8);
        assert_eq!(cfg.min_history_bars, 20);
        assert!(cfg.diversity_warn_threshold > 0.0);

        let wf = WalkForwardConfig::default();
        assert!(wf.train_days > wf.test_days);
        assert_eq!(wf.grid_points, 10);
        assert!(wf.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_positive_spans() {
        let zero_test = WalkForwardConfig {
            test_days: 0,
            ..WalkForwardConfig::default()
        };
        assert!(zero_test.validate().is_err());

        let negative_train = WalkForwardConfig {
            train_days: -5,
            ..WalkForwardConfig::default()
        };
        assert!(negative_train.validate().is_err());
    }
}
