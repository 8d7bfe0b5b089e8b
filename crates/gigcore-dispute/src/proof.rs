use std::sync::Arc;

use chrono::Utc;
use gigcore_core::error::CoreError;
use gigcore_core::ids::{ProofId, ProofPhotoId, TaskId, UserId};
use gigcore_core::model::{OutboxQueue, Proof, ProofPhoto, ProofState, TaskLifecycleState};
use gigcore_core::ports::{LogisticsVendor, LivenessStatus, VerifierVerdict, VisionVendor};
use gigcore_outbox::new_outbox_row;
use gigcore_store::{outbox as outbox_store, proof as proof_store, tasks as task_store, Store};
use tracing::{info, warn};

/// A photo to attach to a proof submission, along with whatever artifacts
/// (a captured face frame, declared GPS coordinates) the worker's app
/// collected for this task's risk tier.
pub struct ProofSubmission {
    pub task_id: TaskId,
    pub submitter_id: UserId,
    pub photos: Vec<PhotoInput>,
}

pub struct PhotoInput {
    pub storage_key: String,
    pub checksum: String,
    pub sequence: i32,
}

pub enum ProofDecision {
    Accept,
    Reject { reason: String },
}

/// Owns proof submission and review (§4.E), consulting the liveness and
/// logistics verifiers when the submission carries biometric or GPS
/// artifacts before an acceptance is allowed to stand.
pub struct ProofReview {
    store: Arc<Store>,
    vision: Arc<dyn VisionVendor>,
    logistics: Arc<dyn LogisticsVendor>,
}

impl ProofReview {
    pub fn new(store: Arc<Store>, vision: Arc<dyn VisionVendor>, logistics: Arc<dyn LogisticsVendor>) -> Self {
        Self { store, vision, logistics }
    }

    pub async fn submit(&self, submission: ProofSubmission) -> Result<Proof, CoreError> {
        let ProofSubmission { task_id, submitter_id, photos } = submission;

        self.store
            .in_txn(move |txn| {
                Box::pin(async move {
                    let mut task = task_store::lock_task_for_update(txn, task_id)
                        .await?
                        .ok_or(CoreError::NotFound("task"))?;
                    if task.lifecycle_state.is_terminal() {
                        return Err(CoreError::TaskTerminal);
                    }
                    if !task.lifecycle_state.can_transition_to(TaskLifecycleState::ProofSubmitted) {
                        return Err(CoreError::InvalidTransition("task must be ACCEPTED to submit proof"));
                    }

                    let now = Utc::now();
                    let proof = Proof {
                        id: ProofId::new(),
                        task_id,
                        submitter_id,
                        state: ProofState::Submitted,
                        reviewer_id: None,
                        rejection_reason: None,
                        created_at: now,
                    };
                    proof_store::insert_proof(txn, &proof).await?;

                    for photo in photos.into_iter() {
                        proof_store::insert_proof_photo(
                            txn,
                            &ProofPhoto {
                                id: ProofPhotoId::new(),
                                proof_id: proof.id,
                                storage_key: photo.storage_key,
                                checksum: photo.checksum,
                                captured_at: now,
                                sequence: photo.sequence,
                            },
                        )
                        .await?;
                    }

                    let expected_version = task.version;
                    task.lifecycle_state = TaskLifecycleState::ProofSubmitted;
                    if !task_store::update_task_state(txn, &task, expected_version).await? {
                        return Err(CoreError::VersionConflict);
                    }
                    task.version += 1;

                    let row = new_outbox_row(
                        "proof.submitted",
                        "proof",
                        &proof.id.to_string(),
                        1,
                        OutboxQueue::UserNotifications,
                        serde_json::json!({ "proof_id": proof.id, "task_id": task_id }),
                        now,
                    );
                    outbox_store::append_outbox_row(txn, &row).await?;

                    info!(proof_id = %proof.id, task_id = %task_id, "proof submitted");
                    Ok(proof)
                })
            })
            .await
    }

    /// `review(decision=ACCEPTED)` consults the liveness and logistics
    /// verifiers when biometric/GPS artifacts are present; either returning
    /// `Reject` fails the review with a typed code and the proof stays
    /// SUBMITTED. `ManualReview` flags the proof without blocking acceptance.
    pub async fn review(
        &self,
        proof_id: ProofId,
        reviewer_id: UserId,
        decision: ProofDecision,
        captured_face: Option<Vec<u8>>,
        liveness_session_id: Option<String>,
        declared_location: Option<(f64, f64)>,
    ) -> Result<Proof, CoreError> {
        let mut manual_review_flagged = false;

        if matches!(decision, ProofDecision::Accept) {
            if let Some(session_id) = &liveness_session_id {
                if let Some(result) = self.vision.get_liveness_session_result(session_id).await? {
                    if result.status == LivenessStatus::Completed && result.confidence < 0.5 {
                        return Err(CoreError::ProofVerifierRejected { verifier: "liveness" });
                    }
                }
            }
            if let Some(bytes) = &captured_face {
                if let Some(faces) = self.vision.detect_faces(bytes).await? {
                    if faces.is_empty() {
                        return Err(CoreError::ProofVerifierRejected { verifier: "liveness" });
                    }
                }
            }
            if let Some((lat, lng)) = declared_location {
                let task_id = self
                    .store
                    .get_proof(proof_id)
                    .await?
                    .ok_or(CoreError::NotFound("proof"))?
                    .task_id;
                if let Some(verdict) = self.logistics.score_gps_consistency(task_id, lat, lng).await? {
                    match verdict {
                        VerifierVerdict::Reject => {
                            return Err(CoreError::ProofVerifierRejected { verifier: "logistics" })
                        }
                        VerifierVerdict::ManualReview => manual_review_flagged = true,
                        VerifierVerdict::Accept => {}
                    }
                }
            }
        }

        self.store
            .in_txn(move |txn| {
                Box::pin(async move {
                    let mut proof = proof_store::lock_proof_for_update(txn, proof_id)
                        .await?
                        .ok_or(CoreError::NotFound("proof"))?;
                    if proof.state.is_terminal() {
                        return Err(CoreError::ProofTerminal);
                    }
                    if proof.state != ProofState::Submitted {
                        return Err(CoreError::InvalidState("proof must be SUBMITTED to review"));
                    }

                    let mut task = task_store::lock_task_for_update(txn, proof.task_id)
                        .await?
                        .ok_or(CoreError::NotFound("task"))?;

                    let now = Utc::now();
                    match decision {
                        ProofDecision::Accept => {
                            proof.state = ProofState::Accepted;
                            proof.reviewer_id = Some(reviewer_id);
                            proof_store::update_proof_state(txn, &proof).await?;

                            if !task.lifecycle_state.can_transition_to(TaskLifecycleState::Completed) {
                                return Err(CoreError::InvalidTransition("task not eligible for COMPLETED"));
                            }
                            let expected_version = task.version;
                            task.lifecycle_state = TaskLifecycleState::Completed;
                            task.completed_at = Some(now);
                            if !task_store::update_task_state(txn, &task, expected_version).await? {
                                return Err(CoreError::VersionConflict);
                            }
                            task.version += 1;

                            let row = new_outbox_row(
                                "proof.accepted",
                                "proof",
                                &proof.id.to_string(),
                                task.version,
                                OutboxQueue::UserNotifications,
                                serde_json::json!({
                                    "proof_id": proof.id,
                                    "task_id": task.id,
                                    "manual_review_flagged": manual_review_flagged,
                                }),
                                now,
                            );
                            outbox_store::append_outbox_row(txn, &row).await?;
                        }
                        ProofDecision::Reject { reason } => {
                            proof.state = ProofState::Rejected;
                            proof.reviewer_id = Some(reviewer_id);
                            proof.rejection_reason = Some(reason.clone());
                            proof_store::update_proof_state(txn, &proof).await?;

                            if task.lifecycle_state.can_transition_to(TaskLifecycleState::Accepted) {
                                let expected_version = task.version;
                                task.lifecycle_state = TaskLifecycleState::Accepted;
                                if !task_store::update_task_state(txn, &task, expected_version).await? {
                                    return Err(CoreError::VersionConflict);
                                }
                                task.version += 1;
                            }

                            let row = new_outbox_row(
                                "proof.rejected",
                                "proof",
                                &proof.id.to_string(),
                                task.version,
                                OutboxQueue::UserNotifications,
                                serde_json::json!({ "proof_id": proof.id, "task_id": task.id, "reason": reason }),
                                now,
                            );
                            outbox_store::append_outbox_row(txn, &row).await?;
                        }
                    }

                    if manual_review_flagged {
                        warn!(proof_id = %proof.id, "proof flagged for manual review, acceptance not blocked");
                    }
                    info!(proof_id = %proof.id, state = ?proof.state, "proof reviewed");
                    Ok(proof)
                })
            })
            .await
    }
}
