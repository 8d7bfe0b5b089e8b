use std::sync::Arc;

use async_trait::async_trait;
use gigcore_core::error::CoreError;
use gigcore_core::ids::TaskId;
use gigcore_core::model::{NotificationCategory, OutboxQueue, OutboxRow, Priority};
use gigcore_outbox::dispatcher::{EffectOutcome, EffectWorker};
use gigcore_store::Store;
use uuid::Uuid;

use crate::{AdminBroadcaster, Notifier};

fn task_id_of(row: &OutboxRow) -> Result<TaskId, CoreError> {
    row.payload["task_id"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .map(TaskId::from_uuid)
        .ok_or_else(|| CoreError::Serialization("outbox row missing task_id".to_string()))
}

/// Turns task/proof lifecycle outbox events into per-participant
/// notifications. The payload only ever carries the task id, so the task
/// row is re-read here for its current poster/worker.
pub struct TaskNotificationEffectWorker {
    store: Arc<Store>,
    notifier: Notifier,
}

impl TaskNotificationEffectWorker {
    pub fn new(store: Arc<Store>) -> Self {
        let notifier = Notifier::new(Arc::clone(&store));
        Self { store, notifier }
    }

    fn title_and_body(event_type: &str, row: &OutboxRow) -> (&'static str, String) {
        match event_type {
            "task.lifecycle_changed" => (
                "Task updated",
                format!("Task moved to {}", row.payload["lifecycle_state"]),
            ),
            "task.progress_changed" => (
                "Task progress updated",
                format!("Task moved to {}", row.payload["progress_state"]),
            ),
            "proof.submitted" => ("Proof submitted", "A worker submitted proof of completion.".to_string()),
            "proof.accepted" => ("Proof accepted", "Your proof was accepted.".to_string()),
            "proof.rejected" => (
                "Proof rejected",
                format!("Your proof was rejected: {}", row.payload["reason"].as_str().unwrap_or("no reason given")),
            ),
            other => (other, String::new()),
        }
    }
}

#[async_trait]
impl EffectWorker for TaskNotificationEffectWorker {
    fn queue(&self) -> OutboxQueue {
        OutboxQueue::UserNotifications
    }

    fn can_handle(&self, event_type: &str) -> bool {
        matches!(
            event_type,
            "task.lifecycle_changed" | "task.progress_changed" | "proof.submitted" | "proof.accepted" | "proof.rejected"
        )
    }

    async fn handle(&self, row: &OutboxRow) -> Result<EffectOutcome, CoreError> {
        let task_id = task_id_of(row)?;
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or(CoreError::NotFound("task"))?;
        let (title, body) = Self::title_and_body(&row.event_type, row);

        self.notifier
            .notify(task.poster_id, Some(task_id), NotificationCategory::TaskUpdate, Priority::Medium, title, &body)
            .await?;
        if let Some(worker_id) = task.worker_id {
            self.notifier
                .notify(worker_id, Some(task_id), NotificationCategory::TaskUpdate, Priority::Medium, title, &body)
                .await?;
        }
        Ok(EffectOutcome::Processed)
    }
}

/// Fans `dispute.created` out to the admin cohort so operators see new
/// disputes without polling the admin API.
pub struct DisputeAdminNotifyEffectWorker {
    broadcaster: Arc<AdminBroadcaster>,
}

impl DisputeAdminNotifyEffectWorker {
    pub fn new(broadcaster: Arc<AdminBroadcaster>) -> Self {
        Self { broadcaster }
    }
}

#[async_trait]
impl EffectWorker for DisputeAdminNotifyEffectWorker {
    fn queue(&self) -> OutboxQueue {
        OutboxQueue::CriticalTrust
    }

    fn can_handle(&self, event_type: &str) -> bool {
        event_type == "dispute.created"
    }

    async fn handle(&self, row: &OutboxRow) -> Result<EffectOutcome, CoreError> {
        let dispute_id = row.payload["dispute_id"].as_str().unwrap_or("unknown");
        self.broadcaster
            .broadcast(
                NotificationCategory::Dispute,
                Priority::High,
                "New dispute opened",
                &format!("Dispute {dispute_id} requires admin review."),
            )
            .await?;
        Ok(EffectOutcome::Processed)
    }
}
