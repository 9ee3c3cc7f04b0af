use serde::{Deserialize, Serialize};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// The metric contract the backtest returns to its callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricSet {
    pub total_return_pct: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown_pct: f64,
    pub win_rate: f64,
    pub num_trades: usize,
}

impl MetricSet {
    /// Derive the full metric set from a mark-to-market equity curve.
    ///
    /// Sharpe is annualized from bar-over-bar returns (mean/std x sqrt 252,
    /// risk-free rate 0); drawdown is peak-to-trough on the running-maximum
    /// normalized curve; win rate is the fraction of positive-return bars.
    pub fn from_equity_curve(equity: &[f64], num_trades: usize) -> Self {
        if equity.len() < 2 {
            return Self {
                num_trades,
                ..Self::default()
            };
        }

        let initial = equity[0];
        let last = equity[equity.len() - 1];
        let total_return_pct = if initial > 0.0 {
            (last - initial) / initial * 100.0
        } else {
            0.0
        };

        let returns = bar_returns(equity);
        Self {
            total_return_pct,
            sharpe_ratio: sharpe_ratio(&returns),
            max_drawdown_pct: max_drawdown_pct(equity),
            win_rate: win_rate(&returns),
            num_trades,
        }
    }

    /// Derive metrics from a long/flat position series applied to a price
    /// series. Used by the walk-forward grid search, which scores parameter
    /// sets without routing orders through a simulator.
    ///
    /// `positions[i]` is the exposure held over the return from bar i to
    /// bar i+1 (0.0 flat, 1.0 fully long).
    pub fn from_positions(closes: &[f64], positions: &[f64]) -> Self {
        if closes.len() < 2 {
            return Self::default();
        }

        let mut equity = Vec::with_capacity(closes.len());
        let mut value = 1.0_f64;
        equity.push(value);

        let mut num_trades = 0;
        let mut prev_pos = 0.0_f64;

        for i in 1..closes.len() {
            let bar_return = if closes[i - 1] > 0.0 {
                (closes[i] - closes[i - 1]) / closes[i - 1]
            } else {
                0.0
            };
            let pos = positions.get(i - 1).copied().unwrap_or(0.0);
            value *= 1.0 + pos * bar_return;
            equity.push(value);

            if (pos > 0.0) != (prev_pos > 0.0) {
                num_trades += 1;
            }
            prev_pos = pos;
        }

        Self::from_equity_curve(&equity, num_trades)
    }
}

fn bar_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    let std_dev = variance.sqrt();
    if std_dev > 0.0 {
        mean / std_dev * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}

fn max_drawdown_pct(equity: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    for &value in equity {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            let dd = (peak - value) / peak * 100.0;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd.min(100.0)
}

fn win_rate(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.iter().filter(|&&r| r > 0.0).count() as f64 / returns.len() as f64
}
