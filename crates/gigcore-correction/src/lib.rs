pub mod analyzer;
pub mod apply;
pub mod budget;

pub use analyzer::CausalAnalyzer;
pub use apply::{ApplyRequest, CorrectionService};
