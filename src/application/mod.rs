pub mod evolution;
pub mod ml;
pub mod strategies;
pub mod walkforward;
