pub mod adaptive;
pub mod cache;
pub mod evaluator;
pub mod orchestrator;
pub mod population;

pub use adaptive::AdaptiveController;
pub use cache::BenchmarkDataCache;
pub use evaluator::{FitnessEvaluator, MarketDataset};
pub use orchestrator::GenerationOrchestrator;
pub use population::PopulationManager;
