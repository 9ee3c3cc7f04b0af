//! Generation cycle driver.
//!
//! One cycle runs: adapt rates from last generation's pass rate, generate
//! the new population (warning when diversity collapses), evaluate the
//! batch in parallel, record every result, persist a generation report,
//! and advance the counter. State is persisted after every mutating step,
//! so a crash between steps resumes at the last completed one.

use crate::application::evolution::adaptive::AdaptiveController;
use crate::application::evolution::evaluator::FitnessEvaluator;
use crate::application::evolution::population::PopulationManager;
use crate::config::EvolutionConfig;
use crate::domain::performance::{GenerationReport, StrategyPerformance};
use crate::domain::repositories::EvolutionStateRepository;
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

pub struct GenerationOrchestrator {
    population: PopulationManager,
    evaluator: Arc<FitnessEvaluator>,
    adaptive: AdaptiveController,
    repository: Arc<dyn EvolutionStateRepository>,
    config: EvolutionConfig,
}

impl GenerationOrchestrator {
    pub fn new(
        population: PopulationManager,
        evaluator: Arc<FitnessEvaluator>,
        repository: Arc<dyn EvolutionStateRepository>,
        config: EvolutionConfig,
    ) -> Self {
        Self {
            population,
            evaluator,
            adaptive: AdaptiveController::new(),
            repository,
            config,
        }
    }

    pub fn population(&self) -> &PopulationManager {
        &self.population
    }

    /// Run one full generation cycle and return its report.
    pub async fn run_generation(&mut self) -> Result<GenerationReport> {
        let generation = self.population.generation();
        info!(generation, "starting generation cycle");

        // Rates adapt only once a prior report exists; a cold start runs
        // on the configured initial rates.
        let reports = self.repository.load_reports().await.unwrap_or_default();
        if let Some(last) = reports.last() {
            let (mutation_rate, crossover_rate) = self
                .adaptive
                .calculate_adaptive_rates(last.pass_rate, generation);
            self.population.set_rates(mutation_rate, crossover_rate).await;
        }

        let candidates = self
            .population
            .generate_candidates(self.config.population_size)
            .await;
        let diversity = self
            .adaptive
            .diversity_score(&candidates, self.population.domains());
        if diversity < self.config.diversity_warn_threshold {
            warn!(
                generation,
                diversity, "population diversity below threshold"
            );
        }

        let results = self
            .evaluator
            .test_batch(&candidates)
            .await
            .with_context(|| format!("evaluating generation {}", generation))?;

        for (candidate, performance) in &results {
            self.population.record_result(candidate, performance).await;
        }

        let performances: Vec<&StrategyPerformance> =
            results.iter().map(|(_, p)| p).collect();
        let report = build_report(generation, &performances);
        if let Err(e) = self.repository.append_report(&report).await {
            warn!(generation, error = %e, "failed to persist generation report");
        }

        self.population.advance_generation().await;
        info!(
            generation,
            evaluated = report.candidate_count,
            passed = report.passed_count,
            best = ?report.best_candidate_id,
            "generation cycle complete"
        );
        Ok(report)
    }

    /// Run several cycles back to back. The first failing cycle stops the
    /// run; reports from completed cycles are already persisted.
    pub async fn run_multiple_generations(&mut self, count: u32) -> Result<Vec<GenerationReport>> {
        let mut reports = Vec::with_capacity(count as usize);
        for _ in 0..count {
            reports.push(self.run_generation().await?);
        }
        Ok(reports)
    }
}

fn build_report(generation: u32, results: &[&StrategyPerformance]) -> GenerationReport {
    let candidate_count = results.len();
    let passed_count = results.iter().filter(|p| p.passed).count();
    let best = results.iter().max_by(|a, b| {
        a.outperformance
            .partial_cmp(&b.outperformance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mean = |f: fn(&StrategyPerformance) -> f64| -> f64 {
        if candidate_count == 0 {
            0.0
        } else {
            results.iter().map(|p| f(p)).sum::<f64>() / candidate_count as f64
        }
    };

    GenerationReport {
        generation,
        candidate_count,
        passed_count,
        pass_rate: if candidate_count == 0 {
            0.0
        } else {
            passed_count as f64 / candidate_count as f64
        },
        best_candidate_id: best.map(|p| p.candidate_id.clone()),
        best_outperformance: best.map(|p| p.outperformance).unwrap_or(0.0),
        avg_outperformance: mean(|p| p.outperformance),
        avg_sharpe: mean(|p| p.sharpe_ratio),
        completed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::MetricSet;

    fn perf(id: &str, outperformance: f64, sharpe: f64) -> StrategyPerformance {
        let metrics = MetricSet {
            total_return_pct: outperformance,
            sharpe_ratio: sharpe,
            ..MetricSet::default()
        };
        StrategyPerformance::from_metrics(id, &metrics, 0.0)
    }

    #[test]
    fn test_report_aggregates_batch_results() {
        let a = perf("a", 12.0, 1.5);
        let b = perf("b", 4.0, 0.5);
        let c = perf("c", -2.0, -0.1);
        let report = build_report(3, &[&a, &b, &c]);

        assert_eq!(report.generation, 3);
        assert_eq!(report.candidate_count, 3);
        assert_eq!(report.passed_count, 1);
        assert!((report.pass_rate - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(report.best_candidate_id.as_deref(), Some("a"));
        assert!((report.best_outperformance - 12.0).abs() < 1e-12);
        assert!((report.avg_outperformance - 14.0 / 3.0).abs() < 1e-12);
        assert!((report.avg_sharpe - 1.9 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_batch_yields_zeroed_report() {
        let report = build_report(0, &[]);
        assert_eq!(report.candidate_count, 0);
        assert_eq!(report.pass_rate, 0.0);
        assert!(report.best_candidate_id.is_none());
        assert_eq!(report.avg_outperformance, 0.0);
    }
}
