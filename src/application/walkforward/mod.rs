pub mod analyzer;
pub mod windows;

pub use analyzer::WalkForwardAnalyzer;
pub use windows::build_windows;
