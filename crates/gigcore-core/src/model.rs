use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::*;
use crate::money::{BasisPoints, Cents};

// ── User ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserMode {
    Worker,
    Poster,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Plan {
    Free,
    Premium,
    Pro,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Paused,
    Suspended,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub default_mode: UserMode,
    /// Monotonic 1..=4 except through explicit trust-ledger demotions.
    pub trust_tier: u8,
    pub xp_total: i64,
    pub current_streak: u32,
    pub verified_identity: bool,
    pub verified_phone: bool,
    pub plan: Plan,
    pub plan_expires_at: Option<DateTime<Utc>>,
    pub account_status: AccountStatus,
    pub live_session_started_at: Option<DateTime<Utc>>,
    pub stripe_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ── Task ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskMode {
    Standard,
    Live,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskLifecycleState {
    Open,
    Matching,
    Accepted,
    ProofSubmitted,
    Disputed,
    Completed,
    Cancelled,
    Expired,
}

impl TaskLifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskLifecycleState::Completed
                | TaskLifecycleState::Cancelled
                | TaskLifecycleState::Expired
        )
    }

    /// The fixed adjacency list from the lifecycle transition graph.
    pub fn can_transition_to(&self, next: TaskLifecycleState) -> bool {
        use TaskLifecycleState::*;
        matches!(
            (self, next),
            (Open, Matching)
                | (Open, Accepted)
                | (Open, Cancelled)
                | (Open, Expired)
                | (Matching, Accepted)
                | (Matching, Open)
                | (Matching, Expired)
                | (Accepted, ProofSubmitted)
                | (Accepted, Cancelled)
                | (Accepted, Disputed)
                | (ProofSubmitted, Completed)
                | (ProofSubmitted, Disputed)
                | (ProofSubmitted, Accepted)
                | (Disputed, Completed)
                | (Disputed, Cancelled)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskProgressState {
    Posted,
    Accepted,
    Traveling,
    Working,
    Completed,
    Closed,
}

impl TaskProgressState {
    /// Strictly monotonic, single-step adjacency (I6): no skips, no reversals.
    pub fn can_transition_to(&self, next: TaskProgressState) -> bool {
        use TaskProgressState::*;
        matches!(
            (self, next),
            (Posted, Accepted)
                | (Accepted, Traveling)
                | (Traveling, Working)
                | (Working, Completed)
                | (Completed, Closed)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub poster_id: UserId,
    pub worker_id: Option<UserId>,
    /// Immutable once the associated escrow has left PENDING.
    pub price: Cents,
    pub category: String,
    pub mode: TaskMode,
    pub instant_mode: bool,
    pub risk_level: RiskLevel,
    pub lifecycle_state: TaskLifecycleState,
    pub progress_state: TaskProgressState,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

// ── Escrow ───────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowState {
    Pending,
    Funded,
    LockedDispute,
    Released,
    Refunded,
    RefundPartial,
}

impl EscrowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EscrowState::Released | EscrowState::Refunded | EscrowState::RefundPartial
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Escrow {
    pub id: EscrowId,
    pub task_id: TaskId,
    /// Immutable once the escrow leaves PENDING (I4).
    pub amount: Cents,
    pub state: EscrowState,
    pub refund_amount: Option<Cents>,
    pub release_amount: Option<Cents>,
    pub payment_intent_id: Option<String>,
    pub transfer_id: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

// ── Proof ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofState {
    Pending,
    Submitted,
    Accepted,
    Rejected,
    Expired,
}

impl ProofState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProofState::Accepted | ProofState::Rejected | ProofState::Expired
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Proof {
    pub id: ProofId,
    pub task_id: TaskId,
    pub submitter_id: UserId,
    pub state: ProofState,
    pub reviewer_id: Option<UserId>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProofPhoto {
    pub id: ProofPhotoId,
    pub proof_id: ProofId,
    pub storage_key: String,
    pub checksum: String,
    pub captured_at: DateTime<Utc>,
    pub sequence: i32,
}

// ── Dispute ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeState {
    Open,
    EvidenceRequested,
    Resolved,
    Escalated,
}

impl DisputeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DisputeState::Resolved)
    }

    pub fn can_transition_to(&self, next: DisputeState) -> bool {
        use DisputeState::*;
        matches!(
            (self, next),
            (Open, EvidenceRequested)
                | (Open, Resolved)
                | (Open, Escalated)
                | (EvidenceRequested, Open)
                | (EvidenceRequested, Resolved)
                | (EvidenceRequested, Escalated)
                | (Escalated, Resolved)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeOutcome {
    Release,
    Refund,
    Split,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeRole {
    Poster,
    Worker,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub task_id: TaskId,
    pub escrow_id: EscrowId,
    pub initiator_id: UserId,
    pub poster_id: UserId,
    pub worker_id: UserId,
    pub state: DisputeState,
    pub outcome: Option<DisputeOutcome>,
    pub refund_amount: Option<Cents>,
    pub release_amount: Option<Cents>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

// ── Ledgers (append-only) ───────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct XpLedgerEntry {
    pub id: XpLedgerId,
    pub user_id: UserId,
    pub task_id: TaskId,
    pub escrow_id: EscrowId,
    pub base_xp: i64,
    pub streak_multiplier: f64,
    pub decay_factor: f64,
    pub effective_xp: i64,
    pub xp_before: i64,
    pub xp_after: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrustLedgerEntry {
    pub id: TrustLedgerId,
    pub user_id: UserId,
    pub old_tier: u8,
    pub new_tier: u8,
    pub reason_code: String,
    pub source_event_id: String,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevenueEventType {
    PlatformFee,
    Featured,
    Subscription,
    Chargeback,
    ChargebackReversal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RevenueLedgerEntry {
    pub id: RevenueLedgerId,
    pub event_type: RevenueEventType,
    pub currency: String,
    pub gross: Cents,
    pub platform_fee: Cents,
    pub net: Cents,
    pub fee_basis_points: BasisPoints,
    pub processor_fee: Cents,
    pub escrow_id: Option<EscrowId>,
    pub external_charge_id: Option<String>,
    pub external_event_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ── Outbox ───────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxStatus {
    Pending,
    Enqueued,
    Processed,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboxQueue {
    CriticalPayments,
    CriticalTrust,
    UserNotifications,
    Exports,
    Maintenance,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutboxRow {
    pub id: OutboxId,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_version: i64,
    pub idempotency_key: String,
    pub payload: serde_json::Value,
    pub queue: OutboxQueue,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ── Stripe event row ─────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StripeEventRow {
    pub external_event_id: StripeEventId,
    pub event_type: String,
    pub external_created_at: DateTime<Utc>,
    pub raw_payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

// ── Supply-control ───────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpertiseSlot {
    Primary,
    Secondary,
}

impl ExpertiseSlot {
    pub fn weight(&self) -> f64 {
        match self {
            ExpertiseSlot::Primary => 0.7,
            ExpertiseSlot::Secondary => 0.3,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Expertise {
    pub id: ExpertiseId,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Capacity {
    pub id: CapacityId,
    pub expertise_id: ExpertiseId,
    pub zone: String,
    pub max_weight_capacity: f64,
    pub min_task_to_supply_ratio: f64,
    pub current_weight: f64,
    pub active_hustlers: i32,
    pub open_tasks_7d: i32,
    pub completed_tasks_7d: i32,
    pub liquidity_ratio: f64,
    pub open_ratio: f64,
    pub auto_expand_pct: f64,
    pub auto_expand_expires_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl Capacity {
    pub fn effective_max(&self, now: DateTime<Utc>) -> f64 {
        let expanded = self
            .auto_expand_expires_at
            .map(|exp| exp > now)
            .unwrap_or(false);
        if expanded {
            self.max_weight_capacity * (1.0 + self.auto_expand_pct / 100.0)
        } else {
            self.max_weight_capacity
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserExpertise {
    pub id: UserExpertiseId,
    pub user_id: UserId,
    pub expertise_id: ExpertiseId,
    pub zone: String,
    pub slot: ExpertiseSlot,
    pub slot_weight: f64,
    pub effective_weight: f64,
    pub active: bool,
    pub locked_until: DateTime<Utc>,
    pub last_task_accepted_at: Option<DateTime<Utc>>,
    pub removed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: WaitlistId,
    pub user_id: UserId,
    pub expertise_id: ExpertiseId,
    pub zone: String,
    pub slot: ExpertiseSlot,
    pub position: i32,
    pub reason: String,
    pub invited_at: Option<DateTime<Utc>>,
    pub invite_expires_at: Option<DateTime<Utc>>,
    pub cancelled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CapacityChangeLogEntry {
    pub id: CapacityChangeLogId,
    pub capacity_id: CapacityId,
    pub user_id: Option<UserId>,
    pub action: String,
    pub outcome: String,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

// ── Correction ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrectionScope {
    Global,
    City,
    Zone,
    Category,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrectionVerdict {
    Causal,
    NonCausal,
    Inconclusive,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CorrectionRow {
    pub id: CorrectionId,
    pub correction_type: String,
    pub target_entity: String,
    pub target_id: String,
    pub adjustment_payload: serde_json::Value,
    pub prior_payload: serde_json::Value,
    pub reason_code: String,
    pub scope: CorrectionScope,
    pub zone: Option<String>,
    pub city: Option<String>,
    pub category: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub reversed: bool,
    pub reversed_at: Option<DateTime<Utc>>,
    pub verdict: Option<CorrectionVerdict>,
    pub applied_at: DateTime<Utc>,
}

// ── Notifications ────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationCategory {
    TaskUpdate,
    Payment,
    Dispute,
    SupplyInvite,
    SecurityAlert,
    Marketing,
}

impl NotificationCategory {
    /// `security_alert` bypasses quiet hours; every other category respects them.
    pub fn bypasses_quiet_hours(&self) -> bool {
        matches!(self, NotificationCategory::SecurityAlert)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channel {
    InApp,
    Push,
    Email,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationRow {
    pub id: NotificationId,
    pub user_id: UserId,
    pub task_id: Option<TaskId>,
    pub category: NotificationCategory,
    pub priority: Priority,
    pub channels: Vec<Channel>,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmailOutboxStatus {
    Pending,
    Sending,
    Sent,
    Failed,
    Suppressed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmailOutboxRow {
    pub id: EmailOutboxId,
    pub user_id: UserId,
    pub status: EmailOutboxStatus,
    pub provider_id: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
