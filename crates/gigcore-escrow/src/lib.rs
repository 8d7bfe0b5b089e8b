pub mod effects;
pub mod escrow;
pub mod lifecycle;

pub use effects::EscrowRequestEffectWorker;
pub use escrow::EscrowService;
pub use lifecycle::TaskLifecycle;
