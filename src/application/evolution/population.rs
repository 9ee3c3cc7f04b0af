//! Population lifecycle: candidate generation, elite tracking, and
//! persistence-backed resume.
//!
//! Each new generation is composed 30% random exploration, 40% elite
//! mutation, and 30% elite crossover. When the elite pool cannot support a
//! method yet (crossover needs two parents, mutation needs one) the quota
//! falls back down the ladder toward random generation, so generation zero
//! is fully random by construction.

use crate::application::ml::ParameterPredictor;
use crate::domain::candidate::{
    GeneratorMethod, ParameterDomains, ParameterKind, StrategyCandidate, StrategyParams,
};
use crate::domain::performance::StrategyPerformance;
use crate::domain::repositories::{EvolutionState, EvolutionStateRepository};
use anyhow::Result;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info, warn};

const RANDOM_SHARE: f64 = 0.30;
const MUTATION_SHARE: f64 = 0.40;

pub struct PopulationManager {
    domains: ParameterDomains,
    repository: Arc<dyn EvolutionStateRepository>,
    predictor: Option<Arc<dyn ParameterPredictor>>,
    state: EvolutionState,
}

impl PopulationManager {
    /// Build a manager, resuming from the persisted state when one exists.
    pub async fn new(
        repository: Arc<dyn EvolutionStateRepository>,
        initial_mutation_rate: f64,
        initial_crossover_rate: f64,
        predictor: Option<Arc<dyn ParameterPredictor>>,
    ) -> Result<Self> {
        let state = match repository.load_state().await? {
            Some(state) => {
                info!(
                    generation = state.generation,
                    elites = state.elites.len(),
                    "resuming evolution from persisted state"
                );
                state
            }
            None => {
                info!("no persisted state found, starting cold");
                EvolutionState {
                    mutation_rate: initial_mutation_rate,
                    crossover_rate: initial_crossover_rate,
                    ..EvolutionState::default()
                }
            }
        };
        Ok(Self {
            domains: ParameterDomains::default(),
            repository,
            predictor,
            state,
        })
    }

    pub fn generation(&self) -> u32 {
        self.state.generation
    }

    pub fn population(&self) -> &[StrategyCandidate] {
        &self.state.population
    }

    /// Passed candidates, best-first. Append-only: an elite is never
    /// dropped, only outranked.
    pub fn elites(&self) -> &[(StrategyCandidate, StrategyPerformance)] {
        &self.state.elites
    }

    pub fn results(&self) -> &[StrategyPerformance] {
        &self.state.results
    }

    /// Candidates from every completed generation, oldest first.
    pub fn candidate_history(&self) -> &[StrategyCandidate] {
        &self.state.candidate_history
    }

    pub fn mutation_rate(&self) -> f64 {
        self.state.mutation_rate
    }

    pub fn crossover_rate(&self) -> f64 {
        self.state.crossover_rate
    }

    pub fn domains(&self) -> &ParameterDomains {
        &self.domains
    }

    pub async fn set_rates(&mut self, mutation_rate: f64, crossover_rate: f64) {
        self.state.mutation_rate = mutation_rate;
        self.state.crossover_rate = crossover_rate;
        self.persist().await;
    }

    /// Generate exactly `n` candidates for the current generation and
    /// persist the new population.
    pub async fn generate_candidates(&mut self, n: usize) -> Vec<StrategyCandidate> {
        let generation = self.state.generation;

        let mut n_random = (n as f64 * RANDOM_SHARE).round() as usize;
        let mut n_mutation = (n as f64 * MUTATION_SHARE).round() as usize;
        let mut n_crossover = n.saturating_sub(n_random + n_mutation);

        // Fallback ladder when the elite pool is too small for a method.
        if self.state.elites.len() < 2 {
            n_mutation += n_crossover;
            n_crossover = 0;
        }
        if self.state.elites.is_empty() {
            n_random += n_mutation;
            n_mutation = 0;
        }

        debug!(
            generation,
            n_random, n_mutation, n_crossover, "composing generation"
        );

        // Per-method counters keep ids unique within the generation even
        // when crossover slots degrade to mutation.
        let mut idx_random = 0;
        let mut idx_mutation = 0;
        let mut idx_crossover = 0;

        let mut candidates = Vec::with_capacity(n);
        for _ in 0..n_random {
            candidates.push(self.random_candidate(generation, &mut idx_random));
        }
        for _ in 0..n_mutation {
            candidates.push(self.mutated_candidate(generation, &mut idx_mutation));
        }
        for _ in 0..n_crossover {
            // The adaptive crossover rate is the per-slot probability that
            // the slot actually crosses; otherwise it breeds by mutation.
            let crosses = rand::rng().random_bool(self.state.crossover_rate.clamp(0.0, 1.0));
            if crosses {
                candidates.push(self.crossover_candidate(generation, &mut idx_crossover));
            } else {
                candidates.push(self.mutated_candidate(generation, &mut idx_mutation));
            }
        }

        // One learned slot replaces a random one once the predictor has
        // elites to learn from.
        if let Some(predictor) = &self.predictor {
            if !self.state.elites.is_empty() && !candidates.is_empty() {
                let params = predictor.suggest(&self.state.elites, &self.domains);
                candidates[0] =
                    StrategyCandidate::new(generation, GeneratorMethod::Learned, 0, params, vec![]);
            }
        }

        // Rounding shortfalls are filled with mutations, or randoms before
        // any elite exists.
        while candidates.len() < n {
            if self.state.elites.is_empty() {
                candidates.push(self.random_candidate(generation, &mut idx_random));
            } else {
                candidates.push(self.mutated_candidate(generation, &mut idx_mutation));
            }
        }
        candidates.truncate(n);

        self.state.population = candidates.clone();
        self.persist().await;
        candidates
    }

    fn random_candidate(&self, generation: u32, index: &mut usize) -> StrategyCandidate {
        let mut rng = rand::rng();
        let mut params = StrategyParams::new();
        for (name, domain) in self.domains.iter() {
            let value = match domain.kind {
                ParameterKind::Period => rng.random_range(domain.min..=domain.max).round(),
                _ => rng.random_range(domain.min..=domain.max),
            };
            params.insert(name.clone(), value);
        }
        let candidate =
            StrategyCandidate::new(generation, GeneratorMethod::Random, *index, params, vec![]);
        *index += 1;
        candidate
    }

    fn mutated_candidate(&self, generation: u32, index: &mut usize) -> StrategyCandidate {
        let mut rng = rand::rng();
        let parent_idx = rng.random_range(0..self.state.elites.len());
        let parent = &self.state.elites[parent_idx].0;

        let mut params = parent.parameters.clone();
        for (name, value) in params.iter_mut() {
            if !rng.random_bool(self.state.mutation_rate.clamp(0.0, 1.0)) {
                continue;
            }
            let Some(domain) = self.domains.get(name) else {
                continue;
            };
            *value = match domain.kind {
                ParameterKind::Period => {
                    let step = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
                    (*value + step).round()
                }
                ParameterKind::Percent => *value + rng.random_range(-10.0..=10.0),
                ParameterKind::Ratio => *value * (1.0 + rng.random_range(-0.2..=0.2)),
            };
        }
        self.domains.clamp_all(&mut params);

        let candidate = StrategyCandidate::new(
            generation,
            GeneratorMethod::Mutation,
            *index,
            params,
            vec![parent.id.clone()],
        );
        *index += 1;
        candidate
    }

    /// Uniform crossover: each gene comes from either parent with equal
    /// probability, no interpolation.
    fn crossover_candidate(&self, generation: u32, index: &mut usize) -> StrategyCandidate {
        let mut rng = rand::rng();
        let a_idx = rng.random_range(0..self.state.elites.len());
        let mut b_idx = rng.random_range(0..self.state.elites.len());
        if b_idx == a_idx {
            b_idx = (b_idx + 1) % self.state.elites.len();
        }
        let parent_a = &self.state.elites[a_idx].0;
        let parent_b = &self.state.elites[b_idx].0;

        let mut params = StrategyParams::new();
        for (name, domain) in self.domains.iter() {
            let source = if rng.random_bool(0.5) {
                parent_a
            } else {
                parent_b
            };
            params.insert(name.clone(), source.param(name).unwrap_or(domain.default));
        }
        self.domains.clamp_all(&mut params);

        let candidate = StrategyCandidate::new(
            generation,
            GeneratorMethod::Crossover,
            *index,
            params,
            vec![parent_a.id.clone(), parent_b.id.clone()],
        );
        *index += 1;
        candidate
    }

    /// Record one evaluation result. Passed candidates join the elite pool;
    /// the pool is kept best-first but nothing is ever evicted from it.
    pub async fn record_result(
        &mut self,
        candidate: &StrategyCandidate,
        performance: &StrategyPerformance,
    ) {
        self.state.results.push(performance.clone());

        if performance.passed {
            info!(
                candidate = %candidate.id,
                outperformance = performance.outperformance,
                "candidate passed, joining elite pool"
            );
            self.state
                .elites
                .push((candidate.clone(), performance.clone()));
            self.state.elites.sort_by(|a, b| {
                b.1.outperformance
                    .partial_cmp(&a.1.outperformance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        self.persist().await;
    }

    /// Close out the current generation. The population is superseded, not
    /// destroyed: its candidates move into the persisted history alongside
    /// the results and elites, and only the counter resets the cycle.
    pub async fn advance_generation(&mut self) -> u32 {
        self.state.generation += 1;
        let superseded = std::mem::take(&mut self.state.population);
        self.state.candidate_history.extend(superseded);
        self.persist().await;
        self.state.generation
    }

    /// Persistence failures degrade to a warning; the in-memory state stays
    /// authoritative for the rest of the run.
    async fn persist(&self) {
        if let Err(e) = self.repository.save_state(&self.state).await {
            warn!(error = %e, "failed to persist evolution state");
        }
    }
}
