use crate::domain::metrics::MetricSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outperformance (strategy return minus benchmark return, in percentage
/// points) required for a candidate to pass. The boundary is inclusive.
pub const PASS_THRESHOLD_PCT: f64 = 10.0;

/// The authoritative backtest record for one candidate in one evaluation
/// pass. Append-only history; never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub candidate_id: String,
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub num_trades: usize,
    pub benchmark_return: f64,
    pub outperformance: f64,
    pub passed: bool,
    pub tested_at: DateTime<Utc>,
}

impl StrategyPerformance {
    pub fn from_metrics(candidate_id: &str, metrics: &MetricSet, benchmark_return: f64) -> Self {
        let outperformance = metrics.total_return_pct - benchmark_return;
        Self {
            candidate_id: candidate_id.to_string(),
            total_return: metrics.total_return_pct,
            sharpe_ratio: metrics.sharpe_ratio,
            max_drawdown: metrics.max_drawdown_pct,
            win_rate: metrics.win_rate,
            num_trades: metrics.num_trades,
            benchmark_return,
            outperformance,
            passed: outperformance >= PASS_THRESHOLD_PCT,
            tested_at: Utc::now(),
        }
    }

    /// Zero-metric record used when price history is empty or too short.
    /// Degrades gracefully instead of failing the candidate.
    pub fn neutral(candidate_id: &str) -> Self {
        Self::from_metrics(candidate_id, &MetricSet::default(), 0.0)
    }
}

/// Summary of one completed generation cycle. Appended to the persisted
/// report sequence; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub generation: u32,
    pub candidate_count: usize,
    pub passed_count: usize,
    pub pass_rate: f64,
    pub best_candidate_id: Option<String>,
    pub best_outperformance: f64,
    pub avg_outperformance: f64,
    pub avg_sharpe: f64,
    pub completed_at: DateTime<Utc>,
}
