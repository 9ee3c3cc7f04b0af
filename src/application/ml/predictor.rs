//! Learned candidate generation.
//!
//! The predictor seam lets a model propose one parameter set per generation
//! from the elite pool. The default implementation is a closed-form
//! heuristic rather than a trained model; it exists so the population
//! manager's "learned" slot has a working producer and so a real model can
//! be swapped in behind the same trait.

use crate::domain::candidate::{ParameterDomains, ParameterKind, StrategyParams};
use crate::domain::candidate::StrategyCandidate;
use crate::domain::performance::StrategyPerformance;

pub trait ParameterPredictor: Send + Sync {
    /// Propose one parameter set given the current elite pool. Must return
    /// values inside the documented domains.
    fn suggest(
        &self,
        elites: &[(StrategyCandidate, StrategyPerformance)],
        domains: &ParameterDomains,
    ) -> StrategyParams;
}

/// Outperformance-weighted centroid of the elite pool.
///
/// Weights are shifted so the worst elite still contributes; a pool whose
/// members all scored identically degrades to a plain mean.
#[derive(Debug, Default)]
pub struct HeuristicPredictor;

impl HeuristicPredictor {
    pub fn new() -> Self {
        Self
    }
}

impl ParameterPredictor for HeuristicPredictor {
    fn suggest(
        &self,
        elites: &[(StrategyCandidate, StrategyPerformance)],
        domains: &ParameterDomains,
    ) -> StrategyParams {
        if elites.is_empty() {
            return domains.defaults();
        }

        let min_score = elites
            .iter()
            .map(|(_, p)| p.outperformance)
            .fold(f64::INFINITY, f64::min);

        let mut params = StrategyParams::new();
        for (name, domain) in domains.iter() {
            let mut weighted_sum = 0.0;
            let mut weight_total = 0.0;
            for (candidate, performance) in elites {
                let weight = performance.outperformance - min_score + 1.0;
                let value = candidate.param(name).unwrap_or(domain.default);
                weighted_sum += value * weight;
                weight_total += weight;
            }
            let mut value = weighted_sum / weight_total;
            if domain.kind == ParameterKind::Period {
                value = value.round();
            }
            params.insert(name.clone(), domain.clamp(value));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candidate::GeneratorMethod;
    use crate::domain::metrics::MetricSet;

    fn elite(period: f64, outperformance: f64) -> (StrategyCandidate, StrategyPerformance) {
        let domains = ParameterDomains::default();
        let mut params = domains.defaults();
        params.insert("osc_period".to_string(), period);
        let candidate = StrategyCandidate::new(0, GeneratorMethod::Random, 0, params, vec![]);
        let metrics = MetricSet {
            total_return_pct: outperformance,
            ..MetricSet::default()
        };
        let performance = StrategyPerformance::from_metrics(&candidate.id, &metrics, 0.0);
        (candidate, performance)
    }

    #[test]
    fn test_empty_pool_falls_back_to_defaults() {
        let domains = ParameterDomains::default();
        let params = HeuristicPredictor::new().suggest(&[], &domains);
        assert_eq!(params, domains.defaults());
    }

    #[test]
    fn test_suggestion_leans_toward_stronger_elite() {
        let domains = ParameterDomains::default();
        let elites = vec![elite(10.0, 30.0), elite(40.0, 0.0)];
        let params = HeuristicPredictor::new().suggest(&elites, &domains);
        let period = params["osc_period"];
        // Weighted toward the strong elite's period of 10, never past the
        // plain midpoint of 25.
        assert!(period < 25.0, "period was {}", period);
        assert!(period >= 10.0);
        assert_eq!(period, period.round());
    }

    #[test]
    fn test_equal_scores_produce_plain_mean() {
        let domains = ParameterDomains::default();
        let elites = vec![elite(10.0, 5.0), elite(20.0, 5.0)];
        let params = HeuristicPredictor::new().suggest(&elites, &domains);
        assert_eq!(params["osc_period"], 15.0);
    }

    #[test]
    fn test_suggestion_stays_in_domain() {
        let domains = ParameterDomains::default();
        let elites = vec![elite(50.0, 12.0), elite(50.0, 8.0)];
        let params = HeuristicPredictor::new().suggest(&elites, &domains);
        for (name, domain) in domains.iter() {
            assert!(params[name] >= domain.min && params[name] <= domain.max);
        }
    }
}
