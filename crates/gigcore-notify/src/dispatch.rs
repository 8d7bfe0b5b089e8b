use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use gigcore_core::constants::{QUIET_HOURS_END_UTC_HOUR, QUIET_HOURS_START_UTC_HOUR};
use gigcore_core::error::CoreError;
use gigcore_core::ids::{NotificationId, TaskId, UserId};
use gigcore_core::model::{NotificationCategory, NotificationRow, Priority};
use gigcore_store::{notify as notify_store, Store};
use tracing::info;

/// A notification is associated with at most one task (§4.I); callers
/// needing an admin-cohort notification (no participant to check against)
/// go through `AdminBroadcaster` instead, which always passes `task_id: None`.
pub struct Notifier {
    store: Arc<Store>,
}

impl Notifier {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Writes a `notifications` row, respecting quiet hours unless the
    /// category bypasses them. Suppression during quiet hours is silent —
    /// not an error, just a no-op write.
    #[allow(clippy::too_many_arguments)]
    pub async fn notify(
        &self,
        user_id: UserId,
        task_id: Option<TaskId>,
        category: NotificationCategory,
        priority: Priority,
        title: &str,
        body: &str,
    ) -> Result<(), CoreError> {
        let now = self.store.now().await?;
        if !category.bypasses_quiet_hours() && in_quiet_hours(now) {
            info!(user_id = %user_id, category = ?category, "notification suppressed during quiet hours");
            return Ok(());
        }

        let notification = NotificationRow {
            id: NotificationId::new(),
            user_id,
            task_id,
            category,
            priority,
            channels: notify_store::channels_for_category(category),
            title: title.to_string(),
            body: body.to_string(),
            created_at: now,
        };
        self.store
            .in_txn(move |txn| Box::pin(async move { notify_store::insert_notification(txn, &notification).await }))
            .await
    }
}

fn in_quiet_hours(now: DateTime<Utc>) -> bool {
    let hour = now.hour();
    if QUIET_HOURS_START_UTC_HOUR < QUIET_HOURS_END_UTC_HOUR {
        hour >= QUIET_HOURS_START_UTC_HOUR && hour < QUIET_HOURS_END_UTC_HOUR
    } else {
        hour >= QUIET_HOURS_START_UTC_HOUR || hour < QUIET_HOURS_END_UTC_HOUR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn quiet_hours_wrap_past_midnight() {
        assert!(in_quiet_hours(Utc.with_ymd_and_hms(2026, 7, 26, 23, 0, 0).unwrap()));
        assert!(in_quiet_hours(Utc.with_ymd_and_hms(2026, 7, 26, 3, 0, 0).unwrap()));
        assert!(!in_quiet_hours(Utc.with_ymd_and_hms(2026, 7, 26, 12, 0, 0).unwrap()));
    }
}
