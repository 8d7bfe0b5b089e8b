use async_trait::async_trait;

use crate::error::CoreError;
use crate::money::Cents;

/// Payment processor API (§6). Called by effect workers only; idempotency
/// keys are derived by the caller from the originating outbox event.
#[async_trait]
pub trait PaymentProcessorApi: Send + Sync {
    async fn create_payment_intent(
        &self,
        idempotency_key: &str,
        amount: Cents,
        metadata: serde_json::Value,
    ) -> Result<String, CoreError>;

    async fn capture_payment_intent(
        &self,
        idempotency_key: &str,
        payment_intent_id: &str,
    ) -> Result<(), CoreError>;

    async fn cancel_payment_intent(
        &self,
        idempotency_key: &str,
        payment_intent_id: &str,
    ) -> Result<(), CoreError>;

    async fn create_transfer(
        &self,
        idempotency_key: &str,
        destination_account: &str,
        amount: Cents,
    ) -> Result<String, CoreError>;

    async fn issue_refund(
        &self,
        idempotency_key: &str,
        payment_intent_id: &str,
        amount: Cents,
    ) -> Result<String, CoreError>;

    /// The processor's own per-charge fee, read off the charge's balance
    /// transaction. `None` if the balance transaction is not yet settled
    /// (the caller should retry later).
    async fn get_charge_fee(&self, charge_id: &str) -> Result<Option<Cents>, CoreError>;
}

/// A face detection result from the vision vendor.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DetectedFace {
    pub confidence: f64,
    pub sharpness: f64,
    pub brightness: f64,
    pub sunglasses: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LivenessStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LivenessResult {
    pub confidence: f64,
    pub status: LivenessStatus,
}

/// Vision vendor (§6). Best-effort: all callers must tolerate a `None`
/// result from behind an open circuit breaker rather than fail the review.
#[async_trait]
pub trait VisionVendor: Send + Sync {
    async fn create_liveness_session(&self) -> Result<String, CoreError>;

    async fn get_liveness_session_result(
        &self,
        session_id: &str,
    ) -> Result<Option<LivenessResult>, CoreError>;

    async fn detect_faces(&self, image_bytes: &[u8]) -> Result<Option<Vec<DetectedFace>>, CoreError>;
}

/// Object storage (§6). The core addresses objects by key only; presigned
/// URLs are generated outside the core.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), CoreError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, CoreError>;
    async fn delete(&self, key: &str) -> Result<(), CoreError>;
}

/// The three-way outcome a proof-review verifier returns. `ManualReview`
/// flags the proof for a human without blocking acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VerifierVerdict {
    Accept,
    Reject,
    ManualReview,
}

/// GPS/location-consistency scorer consulted alongside `VisionVendor` when a
/// submission carries GPS artifacts.
#[async_trait]
pub trait LogisticsVendor: Send + Sync {
    async fn score_gps_consistency(
        &self,
        task_id: crate::ids::TaskId,
        declared_lat: f64,
        declared_lng: f64,
    ) -> Result<Option<VerifierVerdict>, CoreError>;
}
