pub mod candidate;
pub mod errors;
pub mod metrics;
pub mod performance;
pub mod ports;
pub mod repositories;
pub mod types;
pub mod walkforward;
