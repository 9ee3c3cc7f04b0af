use crate::domain::candidate::StrategyParams;
use crate::domain::metrics::MetricSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One chronological train/test slice pair.
///
/// Invariant, enforced at construction: `train_end < test_start` strictly.
/// This is the anti-lookahead guarantee the whole validation rests on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardWindow {
    pub window_num: usize,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub train_start: DateTime<Utc>,
    pub train_end: DateTime<Utc>,
    pub test_start: DateTime<Utc>,
    pub test_end: DateTime<Utc>,
}

/// Metric the in-sample grid search maximizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMetric {
    TotalReturn,
    Sharpe,
    WinRate,
}

impl TargetMetric {
    pub fn extract(&self, metrics: &MetricSet) -> f64 {
        match self {
            TargetMetric::TotalReturn => metrics.total_return_pct,
            TargetMetric::Sharpe => metrics.sharpe_ratio,
            TargetMetric::WinRate => metrics.win_rate,
        }
    }
}

impl FromStr for TargetMetric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "total_return" | "return" => Ok(TargetMetric::TotalReturn),
            "sharpe" => Ok(TargetMetric::Sharpe),
            "win_rate" => Ok(TargetMetric::WinRate),
            _ => anyhow::bail!(
                "Invalid target metric: {}. Must be 'return', 'sharpe', or 'win_rate'",
                s
            ),
        }
    }
}

/// Outcome of optimizing one window and re-scoring out-of-sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowResult {
    pub window: WalkForwardWindow,
    pub parameters: StrategyParams,
    pub in_sample: MetricSet,
    pub out_of_sample: MetricSet,
    /// 1 - OOS/IS degradation over windows processed so far, clipped [0,1].
    pub overfitting_ratio: f64,
    /// Inverse mean coefficient of variation of the chosen parameters
    /// across windows processed so far; 1.0 with a single window.
    pub parameter_stability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    Buy,
    Hold,
    Sell,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Buy => write!(f, "BUY"),
            Recommendation::Hold => write!(f, "HOLD"),
            Recommendation::Sell => write!(f, "SELL"),
        }
    }
}

/// Aggregated robustness diagnostics across all processed windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardAnalysis {
    pub symbol: String,
    pub windows: Vec<WindowResult>,
    pub avg_oos_sharpe: f64,
    pub avg_oos_return: f64,
    pub overfitting_score: f64,
    pub parameter_stability: f64,
    pub recommendation: Recommendation,
}

impl WalkForwardAnalysis {
    /// Neutral analysis for a series too short to produce a single window.
    pub fn empty(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            windows: Vec::new(),
            avg_oos_sharpe: 0.0,
            avg_oos_return: 0.0,
            overfitting_score: 0.0,
            parameter_stability: 0.0,
            recommendation: Recommendation::Sell,
        }
    }
}

/// BUY needs strong out-of-sample Sharpe with little degradation; HOLD
/// tolerates moderate degradation; anything else is a SELL.
pub fn recommend(avg_oos_sharpe: f64, overfitting_score: f64) -> Recommendation {
    if avg_oos_sharpe > 1.5 && overfitting_score < 0.3 {
        Recommendation::Buy
    } else if avg_oos_sharpe > 1.0 && overfitting_score < 0.5 {
        Recommendation::Hold
    } else {
        Recommendation::Sell
    }
}
