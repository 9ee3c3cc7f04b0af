mod predictor;

pub use predictor::{HeuristicPredictor, ParameterPredictor};
