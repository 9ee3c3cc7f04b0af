//! Feedback control for mutation and crossover rates.
//!
//! The controller reads the previous generation's pass rate and leans the
//! search toward exploration when nothing passes (high mutation, low
//! crossover) and toward exploitation once winners exist. With any success
//! at all, mutation additionally anneals as generations accumulate.

use crate::domain::candidate::{ParameterDomains, StrategyCandidate};
use tracing::debug;

const MUTATION_MIN: f64 = 0.05;
const MUTATION_MAX: f64 = 0.50;
const CROSSOVER_MIN: f64 = 0.40;
const CROSSOVER_MAX: f64 = 0.85;

/// Per-generation damping applied to the mutation rate once the search has
/// found at least one passing candidate.
const ANNEAL_PER_GENERATION: f64 = 0.05;

#[derive(Debug, Default)]
pub struct AdaptiveController;

impl AdaptiveController {
    pub fn new() -> Self {
        Self
    }

    /// Map last generation's pass rate to the next (mutation, crossover)
    /// rate pair. Both outputs are clamped to their documented bounds.
    pub fn calculate_adaptive_rates(&self, success_rate: f64, generation: u32) -> (f64, f64) {
        let success = success_rate.clamp(0.0, 1.0);
        let exploration = 1.0 - success;

        let mut mutation = MUTATION_MIN + (MUTATION_MAX - MUTATION_MIN) * exploration;
        if success > 0.0 {
            mutation /= 1.0 + ANNEAL_PER_GENERATION * generation as f64;
        }
        let mutation = mutation.clamp(MUTATION_MIN, MUTATION_MAX);

        let crossover =
            (CROSSOVER_MIN + (CROSSOVER_MAX - CROSSOVER_MIN) * success).clamp(CROSSOVER_MIN, CROSSOVER_MAX);

        debug!(success_rate = success, generation, mutation, crossover, "adapted rates");
        (mutation, crossover)
    }

    /// Population diversity in [0, 1]: the mean, over parameters, of the
    /// normalized coefficient of variation cv / (1 + cv). 0 means every
    /// candidate carries identical parameters.
    pub fn diversity_score(
        &self,
        population: &[StrategyCandidate],
        domains: &ParameterDomains,
    ) -> f64 {
        if population.len() < 2 || domains.is_empty() {
            return 0.0;
        }

        let mut total = 0.0;
        let mut counted = 0;
        for (name, domain) in domains.iter() {
            let values: Vec<f64> = population
                .iter()
                .map(|c| c.param(name).unwrap_or(domain.default))
                .collect();
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            if mean.abs() < f64::EPSILON {
                counted += 1;
                continue;
            }
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                / values.len() as f64;
            let cv = variance.sqrt() / mean.abs();
            total += cv / (1.0 + cv);
            counted += 1;
        }

        if counted == 0 {
            0.0
        } else {
            total / counted as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candidate::GeneratorMethod;

    fn candidate(period: f64, buy: f64) -> StrategyCandidate {
        let domains = ParameterDomains::default();
        let mut params = domains.defaults();
        params.insert("osc_period".to_string(), period);
        params.insert("buy_threshold".to_string(), buy);
        StrategyCandidate::new(0, GeneratorMethod::Random, 0, params, vec![])
    }

    #[test]
    fn test_zero_success_maximizes_mutation() {
        let controller = AdaptiveController::new();
        let (mutation, crossover) = controller.calculate_adaptive_rates(0.0, 5);
        assert!((mutation - MUTATION_MAX).abs() < 1e-12);
        assert!((crossover - CROSSOVER_MIN).abs() < 1e-12);
    }

    #[test]
    fn test_full_success_floors_mutation_and_maxes_crossover() {
        let controller = AdaptiveController::new();
        let (mutation, crossover) = controller.calculate_adaptive_rates(1.0, 0);
        assert!((mutation - MUTATION_MIN).abs() < 1e-12);
        assert!((crossover - CROSSOVER_MAX).abs() < 1e-12);
    }

    #[test]
    fn test_mutation_anneals_only_with_success() {
        let controller = AdaptiveController::new();
        let (early, _) = controller.calculate_adaptive_rates(0.5, 1);
        let (late, _) = controller.calculate_adaptive_rates(0.5, 20);
        assert!(late < early);

        // Zero success never anneals: stay at full exploration.
        let (stuck_early, _) = controller.calculate_adaptive_rates(0.0, 1);
        let (stuck_late, _) = controller.calculate_adaptive_rates(0.0, 20);
        assert_eq!(stuck_early, stuck_late);
    }

    #[test]
    fn test_rates_stay_within_bounds() {
        let controller = AdaptiveController::new();
        for success in [0.0, 0.1, 0.33, 0.5, 0.9, 1.0, 2.0, -1.0] {
            for generation in [0, 1, 10, 100] {
                let (mutation, crossover) =
                    controller.calculate_adaptive_rates(success, generation);
                assert!((MUTATION_MIN..=MUTATION_MAX).contains(&mutation));
                assert!((CROSSOVER_MIN..=CROSSOVER_MAX).contains(&crossover));
            }
        }
    }

    #[test]
    fn test_identical_population_has_zero_diversity() {
        let controller = AdaptiveController::new();
        let population = vec![candidate(14.0, 25.0), candidate(14.0, 25.0)];
        let score = controller.diversity_score(&population, &ParameterDomains::default());
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_spread_population_scores_higher_and_bounded() {
        let controller = AdaptiveController::new();
        let domains = ParameterDomains::default();
        let tight = vec![candidate(14.0, 25.0), candidate(15.0, 26.0)];
        let spread = vec![candidate(2.0, 5.0), candidate(50.0, 95.0)];
        let tight_score = controller.diversity_score(&tight, &domains);
        let spread_score = controller.diversity_score(&spread, &domains);
        assert!(spread_score > tight_score);
        assert!((0.0..=1.0).contains(&spread_score));
    }

    #[test]
    fn test_singleton_population_is_zero_diversity() {
        let controller = AdaptiveController::new();
        let score =
            controller.diversity_score(&[candidate(14.0, 25.0)], &ParameterDomains::default());
        assert_eq!(score, 0.0);
    }
}
