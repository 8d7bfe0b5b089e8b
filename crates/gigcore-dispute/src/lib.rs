pub mod dispute;
pub mod proof;

pub use dispute::{DisputeResolution, DisputeService};
pub use proof::{ProofReview, ProofSubmission};
