use crate::domain::candidate::StrategyParams;
use crate::domain::errors::EvaluationError;

/// Long/flat momentum strategy driven by a gain-share oscillator.
///
/// The oscillator measures what share of recent price movement was upward,
/// scaled to 0..=100 over the last `period` bar-to-bar changes (fewer while
/// the series warms up; 0 before any change is observable).
///
/// Entry is edge-triggered: go long when the oscillator crosses up through
/// `buy_threshold`. Exit when it reaches `sell_threshold` (take profit into
/// overbought) or falls back below `buy_threshold`.
#[derive(Debug, Clone)]
pub struct OscillatorStrategy {
    pub period: usize,
    pub buy_threshold: f64,
    pub sell_threshold: f64,
    pub risk_fraction: f64,
}

impl OscillatorStrategy {
    pub fn from_params(params: &StrategyParams) -> Result<Self, EvaluationError> {
        let period = params.get("osc_period").copied().unwrap_or(14.0);
        if period < 2.0 || !period.is_finite() {
            return Err(EvaluationError::InvalidParameters {
                reason: format!("osc_period must be >= 2, got {}", period),
            });
        }
        let buy_threshold = params.get("buy_threshold").copied().unwrap_or(25.0);
        let sell_threshold = params.get("sell_threshold").copied().unwrap_or(75.0);
        if !(0.0..=100.0).contains(&buy_threshold) || !(0.0..=100.0).contains(&sell_threshold) {
            return Err(EvaluationError::InvalidParameters {
                reason: "thresholds must lie in 0..=100".to_string(),
            });
        }
        let risk_fraction = params.get("risk_fraction").copied().unwrap_or(1.0);
        if risk_fraction <= 0.0 || risk_fraction > 1.0 {
            return Err(EvaluationError::InvalidParameters {
                reason: format!("risk_fraction must be in (0, 1], got {}", risk_fraction),
            });
        }
        Ok(Self {
            period: period.round() as usize,
            buy_threshold,
            sell_threshold,
            risk_fraction,
        })
    }

    /// Gain-share oscillator per bar, 0..=100. Index i covers the deltas
    /// ending at bar i. 50 when the window moved nowhere at all.
    pub fn oscillator(&self, closes: &[f64]) -> Vec<f64> {
        let mut values = Vec::with_capacity(closes.len());
        for i in 0..closes.len() {
            if i == 0 {
                values.push(0.0);
                continue;
            }
            let window_start = i.saturating_sub(self.period);
            let mut gains = 0.0;
            let mut losses = 0.0;
            for j in (window_start + 1)..=i {
                let delta = closes[j] - closes[j - 1];
                if delta >= 0.0 {
                    gains += delta;
                } else {
                    losses -= delta;
                }
            }
            let total = gains + losses;
            if total > 0.0 {
                values.push(gains / total * 100.0);
            } else {
                values.push(50.0);
            }
        }
        values
    }

    /// Exposure per bar (0.0 flat, `risk_fraction` long). `positions[i]` is
    /// the exposure held over the return from bar i to bar i+1.
    pub fn positions(&self, closes: &[f64]) -> Vec<f64> {
        let osc = self.oscillator(closes);
        let mut positions = Vec::with_capacity(closes.len());
        let mut long = false;
        let mut prev_osc = 0.0;

        for (i, &value) in osc.iter().enumerate() {
            if long {
                if value >= self.sell_threshold || value < self.buy_threshold {
                    long = false;
                }
            } else if i > 0 && prev_osc < self.buy_threshold && value >= self.buy_threshold {
                long = true;
            }
            prev_osc = value;
            positions.push(if long { self.risk_fraction } else { 0.0 });
        }
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candidate::ParameterDomains;

    fn strategy(period: f64, buy: f64, sell: f64) -> OscillatorStrategy {
        let mut params = ParameterDomains::default().defaults();
        params.insert("osc_period".to_string(), period);
        params.insert("buy_threshold".to_string(), buy);
        params.insert("sell_threshold".to_string(), sell);
        params.insert("risk_fraction".to_string(), 1.0);
        OscillatorStrategy::from_params(&params).unwrap()
    }

    #[test]
    fn test_oscillator_saturates_on_monotonic_rise() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let strat = strategy(14.0, 25.0, 75.0);
        let osc = strat.oscillator(&closes);
        assert_eq!(osc[0], 0.0);
        for &value in &osc[1..] {
            assert_eq!(value, 100.0);
        }
    }

    #[test]
    fn test_oscillator_floors_on_monotonic_fall() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let strat = strategy(14.0, 25.0, 75.0);
        let osc = strat.oscillator(&closes);
        for &value in &osc[1..] {
            assert_eq!(value, 0.0);
        }
    }

    #[test]
    fn test_rising_series_produces_one_round_trip() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let strat = strategy(14.0, 25.0, 75.0);
        let positions = strat.positions(&closes);
        // Crosses the buy threshold at bar 1, takes profit at overbought
        // on the next bar.
        assert_eq!(positions[0], 0.0);
        assert_eq!(positions[1], 1.0);
        assert_eq!(positions[2], 0.0);
        assert!(positions[3..].iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_falling_series_never_enters() {
        let closes: Vec<f64> = (0..40).map(|i| 200.0 - i as f64).collect();
        let strat = strategy(14.0, 25.0, 75.0);
        assert!(strat.positions(&closes).iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_invalid_period_is_rejected() {
        let mut params = ParameterDomains::default().defaults();
        params.insert("osc_period".to_string(), 0.0);
        assert!(matches!(
            OscillatorStrategy::from_params(&params),
            Err(EvaluationError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn test_invalid_risk_fraction_is_rejected() {
        let mut params = ParameterDomains::default().defaults();
        params.insert("risk_fraction".to_string(), 0.0);
        assert!(OscillatorStrategy::from_params(&params).is_err());
    }
}
