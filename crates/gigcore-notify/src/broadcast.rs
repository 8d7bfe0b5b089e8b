use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use gigcore_core::constants::ADMIN_ID_CACHE_TTL_SECS;
use gigcore_core::error::CoreError;
use gigcore_core::ids::{NotificationId, UserId};
use gigcore_core::model::{NotificationCategory, NotificationRow, Priority};
use gigcore_store::{notify as notify_store, Store};
use tokio::sync::Mutex;
use tracing::{error, info};

struct AdminIdCache {
    ids: Vec<UserId>,
    fetched_at: Instant,
}

/// Reads admin user ids from the role table, caching the result for 5
/// minutes (§4.I), and fans a notification out to every cached id without
/// short-circuiting on an individual failure.
pub struct AdminBroadcaster {
    store: Arc<Store>,
    cache: Mutex<Option<AdminIdCache>>,
}

impl AdminBroadcaster {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            cache: Mutex::new(None),
        }
    }

    async fn admin_ids(&self) -> Result<Vec<UserId>, CoreError> {
        let ttl = StdDuration::from_secs(ADMIN_ID_CACHE_TTL_SECS);
        let mut guard = self.cache.lock().await;
        if let Some(cache) = guard.as_ref() {
            if cache.fetched_at.elapsed() < ttl {
                return Ok(cache.ids.clone());
            }
        }
        let ids = self.store.list_admin_ids().await?;
        *guard = Some(AdminIdCache {
            ids: ids.clone(),
            fetched_at: Instant::now(),
        });
        Ok(ids)
    }

    /// Dispatches one notification per admin user, admin-cohort so no task
    /// is attached (§4.I: admin-cohort notifications omit the task and
    /// bypass the "must be a participant" check). Individual insert
    /// failures are logged and skipped, never aborting the rest of the
    /// broadcast.
    pub async fn broadcast(
        &self,
        category: NotificationCategory,
        priority: Priority,
        title: &str,
        body: &str,
    ) -> Result<u64, CoreError> {
        let ids = self.admin_ids().await?;
        let now = self.store.now().await?;
        let mut sent = 0u64;

        for user_id in ids {
            let notification = NotificationRow {
                id: NotificationId::new(),
                user_id,
                task_id: None,
                category,
                priority,
                channels: notify_store::channels_for_category(category),
                title: title.to_string(),
                body: body.to_string(),
                created_at: now,
            };
            let result = self
                .store
                .in_txn(move |txn| {
                    Box::pin(async move { notify_store::insert_notification(txn, &notification).await })
                })
                .await;
            match result {
                Ok(()) => sent += 1,
                Err(e) => error!(user_id = %user_id, error = %e, "admin broadcast notification failed"),
            }
        }

        info!(sent, category = ?category, "admin broadcast dispatched");
        Ok(sent)
    }
}
