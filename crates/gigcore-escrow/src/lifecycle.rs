use std::sync::Arc;

use chrono::Utc;
use gigcore_core::error::CoreError;
use gigcore_core::ids::TaskId;
use gigcore_core::model::{OutboxQueue, Task, TaskLifecycleState, TaskProgressState};
use gigcore_outbox::new_outbox_row;
use gigcore_store::{outbox as outbox_store, tasks as task_store, Store};
use tracing::info;

/// The task-lifecycle and task-progress state machines (§4.D). Both live
/// here rather than in their own crate because every transition that
/// matters operationally — accept, complete, cancel — also touches the
/// escrow on the same task, and keeping them in one crate keeps that pair
/// of writes inside one transaction.
pub struct TaskLifecycle {
    store: Arc<Store>,
}

impl TaskLifecycle {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn transition_lifecycle(
        &self,
        task_id: TaskId,
        next: TaskLifecycleState,
    ) -> Result<Task, CoreError> {
        self.store
            .in_txn(move |txn| {
                Box::pin(async move {
                    let mut task = task_store::lock_task_for_update(txn, task_id)
                        .await?
                        .ok_or(CoreError::NotFound("task"))?;
                    if task.lifecycle_state.is_terminal() {
                        return Err(CoreError::TaskTerminal);
                    }
                    if !task.lifecycle_state.can_transition_to(next) {
                        return Err(CoreError::InvalidTransition("lifecycle edge not permitted"));
                    }

                    if next == TaskLifecycleState::Completed {
                        if !task_store::has_accepted_proof(txn, task_id).await? {
                            return Err(CoreError::CompletionRequiresAcceptedProof);
                        }
                    }

                    let expected_version = task.version;
                    task.lifecycle_state = next;
                    if next == TaskLifecycleState::Completed {
                        task.completed_at = Some(Utc::now());
                    }
                    if !task_store::update_task_state(txn, &task, expected_version).await? {
                        return Err(CoreError::VersionConflict);
                    }
                    task.version += 1;

                    let now = Utc::now();
                    let row = new_outbox_row(
                        "task.lifecycle_changed",
                        "task",
                        &task.id.to_string(),
                        task.version,
                        OutboxQueue::UserNotifications,
                        serde_json::json!({ "task_id": task.id, "lifecycle_state": next }),
                        now,
                    );
                    outbox_store::append_outbox_row(txn, &row).await?;

                    info!(task_id = %task.id, ?next, "task lifecycle transitioned");
                    Ok(task)
                })
            })
            .await
    }

    /// Strictly monotonic, single-step (I6): POSTED→ACCEPTED→TRAVELING→WORKING→COMPLETED→CLOSED.
    pub async fn transition_progress(
        &self,
        task_id: TaskId,
        next: TaskProgressState,
    ) -> Result<Task, CoreError> {
        self.store
            .in_txn(move |txn| {
                Box::pin(async move {
                    let mut task = task_store::lock_task_for_update(txn, task_id)
                        .await?
                        .ok_or(CoreError::NotFound("task"))?;
                    if task.lifecycle_state.is_terminal() {
                        return Err(CoreError::TaskTerminal);
                    }
                    if !task.progress_state.can_transition_to(next) {
                        return Err(CoreError::InvalidProgressTransition);
                    }

                    let expected_version = task.version;
                    task.progress_state = next;
                    if !task_store::update_task_state(txn, &task, expected_version).await? {
                        return Err(CoreError::VersionConflict);
                    }
                    task.version += 1;

                    let now = Utc::now();
                    let row = new_outbox_row(
                        "task.progress_changed",
                        "task",
                        &task.id.to_string(),
                        task.version,
                        OutboxQueue::UserNotifications,
                        serde_json::json!({ "task_id": task.id, "progress_state": next }),
                        now,
                    );
                    outbox_store::append_outbox_row(txn, &row).await?;

                    info!(task_id = %task.id, ?next, "task progress transitioned");
                    Ok(task)
                })
            })
            .await
    }

    /// MATCHING→OPEN fallback on an instant-mode acceptance timeout.
    pub async fn matching_timeout_fallback(&self, task_id: TaskId) -> Result<Task, CoreError> {
        self.transition_lifecycle(task_id, TaskLifecycleState::Open).await
    }
}
