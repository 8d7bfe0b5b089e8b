pub mod correction;
pub mod dispute;
pub mod escrow;
pub mod notify;
pub mod outbox;
pub mod pool;
pub mod proof;
pub mod rowconv;
pub mod stripe_event;
pub mod supply;
pub mod tasks;
pub mod users;

pub use pool::{BoxFuture, Store, Txn};
