//! Persistence abstractions for the evolutionary search.
//!
//! The engine survives process restarts by writing its full state after
//! every mutating operation and re-reading it at startup. A missing or
//! corrupt document is a cold start, never a fatal error; that policy lives
//! in the store implementations, not here.

use crate::domain::candidate::StrategyCandidate;
use crate::domain::performance::{GenerationReport, StrategyPerformance};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Everything the population manager needs to resume from the last
/// completed generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvolutionState {
    pub generation: u32,
    pub population: Vec<StrategyCandidate>,
    /// Candidates from completed generations. Superseded, never destroyed:
    /// every generated candidate stays on record here after its generation
    /// advances.
    #[serde(default)]
    pub candidate_history: Vec<StrategyCandidate>,
    pub elites: Vec<(StrategyCandidate, StrategyPerformance)>,
    pub results: Vec<StrategyPerformance>,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
}

#[async_trait]
pub trait EvolutionStateRepository: Send + Sync {
    /// Load the last persisted state. `Ok(None)` means cold start.
    async fn load_state(&self) -> Result<Option<EvolutionState>>;

    async fn save_state(&self, state: &EvolutionState) -> Result<()>;

    /// Append one generation report to the persisted ordered sequence.
    async fn append_report(&self, report: &GenerationReport) -> Result<()>;

    async fn load_reports(&self) -> Result<Vec<GenerationReport>>;
}
