pub mod broadcast;
pub mod dispatch;
pub mod effects;

pub use broadcast::AdminBroadcaster;
pub use dispatch::Notifier;
pub use effects::{DisputeAdminNotifyEffectWorker, TaskNotificationEffectWorker};
