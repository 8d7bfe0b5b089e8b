use thiserror::Error;

/// The tagged result error used at every service boundary in this crate and
/// its downstream callers. Transactions roll back on any `Err` return; no
/// variant here is ever converted silently into another family.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Invariant violations (HX1xx–HX9xx) ──────────────────────────────────
    #[error("HX101: XP ledger row requires escrow in a terminal released-like state")]
    XpRequiresReleasedEscrow,

    #[error("HX102: escrow release requires task.state = COMPLETED")]
    ReleaseRequiresTaskCompleted,

    #[error("HX103: task completion requires an accepted proof")]
    CompletionRequiresAcceptedProof,

    #[error("HX104: escrow amount is immutable once escrow leaves PENDING")]
    EscrowAmountImmutable,

    #[error("HX105: at most one XP ledger row may exist per (user, escrow)")]
    DuplicateXpLedgerRow,

    #[error("HX106: progress transition does not follow the fixed adjacency list")]
    InvalidProgressTransition,

    #[error("HX107: append-only ledger row cannot be mutated or deleted")]
    AppendOnlyViolation,

    #[error("HX108: user already holds two active expertise entries")]
    MaxActiveExpertiseExceeded,

    #[error("HX109: outbox idempotency key is not globally unique")]
    DuplicateOutboxKey,

    // ── State transition errors ─────────────────────────────────────────────
    #[error("invalid state for this operation: {0}")]
    InvalidState(&'static str),

    #[error("invalid lifecycle/progress transition: {0}")]
    InvalidTransition(&'static str),

    #[error("task is in a terminal state")]
    TaskTerminal,

    #[error("escrow is in a terminal state")]
    EscrowTerminal,

    #[error("dispute is in a terminal state")]
    DisputeTerminal,

    #[error("proof is in a terminal state")]
    ProofTerminal,

    #[error("proof review rejected by {verifier} verifier")]
    ProofVerifierRejected { verifier: &'static str },

    // ── Authorization / ownership ────────────────────────────────────────────
    #[error("forbidden: actor is not a participant of this aggregate")]
    Forbidden,

    #[error("unauthorized: admin authority required")]
    Unauthorized,

    // ── Version conflicts ────────────────────────────────────────────────────
    #[error("version conflict: row was updated concurrently")]
    VersionConflict,

    // ── Supply-control gate outcomes ─────────────────────────────────────────
    #[error("admission locked: a 30-day change lock is active")]
    SupplyLocked,

    #[error("admission rejected: user already holds 2 active expertise rows")]
    SupplyMax,

    #[error("admission rejected: duplicate active expertise row")]
    SupplyDuplicate,

    #[error("admission rejected: cooldown active on a recently removed row")]
    SupplyCooldown,

    #[error("admission waitlisted: {reason}")]
    SupplyWaitlisted { reason: String },

    // ── External-service errors ──────────────────────────────────────────────
    #[error("external service unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("circuit breaker open for {0}")]
    CircuitOpen(String),

    #[error("webhook signature verification failed")]
    SignatureVerificationFailed,

    // ── Budget / correction engine ───────────────────────────────────────────
    #[error("correction budget exhausted for scope {0}")]
    BudgetExhausted(String),

    #[error("correction engine is in safe-mode")]
    SafeMode,

    #[error("correction touches a financial/trust aggregate, which is forbidden")]
    CorrectionScopeViolation,

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("not found: {0}")]
    NotFound(&'static str),

    // ── General ──────────────────────────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Stable machine-readable code, independent of the `Display` message,
    /// used for CLI exit-code classification and HTTP status mapping.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::XpRequiresReleasedEscrow => "HX101",
            CoreError::ReleaseRequiresTaskCompleted => "HX102",
            CoreError::CompletionRequiresAcceptedProof => "HX103",
            CoreError::EscrowAmountImmutable => "HX104",
            CoreError::DuplicateXpLedgerRow => "HX105",
            CoreError::InvalidProgressTransition => "HX106",
            CoreError::AppendOnlyViolation => "HX107",
            CoreError::MaxActiveExpertiseExceeded => "HX108",
            CoreError::DuplicateOutboxKey => "HX109",
            CoreError::InvalidState(_) => "INVALID_STATE",
            CoreError::InvalidTransition(_) => "INVALID_TRANSITION",
            CoreError::TaskTerminal => "TASK_TERMINAL",
            CoreError::EscrowTerminal => "ESCROW_TERMINAL",
            CoreError::DisputeTerminal => "DISPUTE_TERMINAL",
            CoreError::ProofTerminal => "PROOF_TERMINAL",
            CoreError::ProofVerifierRejected { .. } => "PROOF_VERIFIER_REJECTED",
            CoreError::Forbidden => "FORBIDDEN",
            CoreError::Unauthorized => "UNAUTHORIZED",
            CoreError::VersionConflict => "CONFLICT",
            CoreError::SupplyLocked => "LOCKED",
            CoreError::SupplyMax => "MAX",
            CoreError::SupplyDuplicate => "DUPLICATE",
            CoreError::SupplyCooldown => "COOLDOWN",
            CoreError::SupplyWaitlisted { .. } => "WAITLISTED",
            CoreError::ExternalUnavailable(_) => "EXTERNAL_UNAVAILABLE",
            CoreError::CircuitOpen(_) => "AI_UNAVAILABLE",
            CoreError::SignatureVerificationFailed => "VERIFICATION_FAILED",
            CoreError::BudgetExhausted(_) => "BUDGET_EXHAUSTED",
            CoreError::SafeMode => "SAFE_MODE",
            CoreError::CorrectionScopeViolation => "CORRECTION_SCOPE_VIOLATION",
            CoreError::Serialization(_) => "SERIALIZATION",
            CoreError::Storage(_) => "STORAGE",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::Other(_) => "OTHER",
        }
    }

    /// True if the caller may simply retry the originating operation as-is
    /// (used by outbox workers to distinguish retryable from poison errors).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::VersionConflict
                | CoreError::ExternalUnavailable(_)
                | CoreError::CircuitOpen(_)
                | CoreError::Storage(_)
        )
    }

    /// True if this error should be folded into a no-op success rather than
    /// surfaced as a failure (correction-engine budget exhaustion only).
    pub fn is_noop_success(&self) -> bool {
        matches!(self, CoreError::BudgetExhausted(_) | CoreError::SafeMode)
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}
