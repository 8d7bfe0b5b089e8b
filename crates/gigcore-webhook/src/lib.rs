pub mod effects;
pub mod ingest;
pub mod signature;
pub mod stripe_client;

pub use effects::StripeEffectWorker;
pub use ingest::{ingest, IngestOutcome};
pub use stripe_client::StripeClient;
