pub mod dispatcher;
pub mod writer;

pub use dispatcher::{CompositeEffectWorker, EffectOutcome, EffectWorker, OutboxDispatcher};
pub use writer::new_outbox_row;
