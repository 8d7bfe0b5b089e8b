//! Conversions between the TEXT-encoded enum columns this schema uses and
//! the typed enums in `gigcore_core::model`. Keeping these in one place
//! means a new enum variant only needs updating here and in the migration.

use gigcore_core::model::*;

macro_rules! str_enum {
    ($ty:ty, { $($variant:ident => $s:literal),+ $(,)? }) => {
        pub fn to_str(v: $ty) -> &'static str {
            match v {
                $(<$ty>::$variant => $s,)+
            }
        }

        pub fn from_str(s: &str) -> $ty {
            match s {
                $($s => <$ty>::$variant,)+
                other => panic!(concat!(stringify!($ty), ": unknown column value {}"), other),
            }
        }
    };
}

pub mod user_mode {
    use super::*;
    str_enum!(UserMode, { Worker => "worker", Poster => "poster" });
}

pub mod plan {
    use super::*;
    str_enum!(Plan, { Free => "free", Premium => "premium", Pro => "pro" });
}

pub mod account_status {
    use super::*;
    str_enum!(AccountStatus, { Active => "active", Paused => "paused", Suspended => "suspended" });
}

pub mod task_mode {
    use super::*;
    str_enum!(TaskMode, { Standard => "standard", Live => "live" });
}

pub mod risk_level {
    use super::*;
    str_enum!(RiskLevel, { Low => "low", Medium => "medium", High => "high" });
}

pub mod lifecycle_state {
    use super::*;
    str_enum!(TaskLifecycleState, {
        Open => "open", Matching => "matching", Accepted => "accepted",
        ProofSubmitted => "proof_submitted", Disputed => "disputed",
        Completed => "completed", Cancelled => "cancelled", Expired => "expired",
    });
}

pub mod progress_state {
    use super::*;
    str_enum!(TaskProgressState, {
        Posted => "posted", Accepted => "accepted", Traveling => "traveling",
        Working => "working", Completed => "completed", Closed => "closed",
    });
}

pub mod escrow_state {
    use super::*;
    str_enum!(EscrowState, {
        Pending => "pending", Funded => "funded", LockedDispute => "locked_dispute",
        Released => "released", Refunded => "refunded", RefundPartial => "refund_partial",
    });
}

pub mod proof_state {
    use super::*;
    str_enum!(ProofState, {
        Pending => "pending", Submitted => "submitted", Accepted => "accepted",
        Rejected => "rejected", Expired => "expired",
    });
}

pub mod dispute_state {
    use super::*;
    str_enum!(DisputeState, {
        Open => "open", EvidenceRequested => "evidence_requested",
        Resolved => "resolved", Escalated => "escalated",
    });
}

pub mod dispute_outcome {
    use super::*;
    str_enum!(DisputeOutcome, { Release => "release", Refund => "refund", Split => "split" });
}

pub mod revenue_event_type {
    use super::*;
    str_enum!(RevenueEventType, {
        PlatformFee => "platform_fee", Featured => "featured", Subscription => "subscription",
        Chargeback => "chargeback", ChargebackReversal => "chargeback_reversal",
    });
}

pub mod outbox_status {
    use super::*;
    str_enum!(OutboxStatus, {
        Pending => "pending", Enqueued => "enqueued", Processed => "processed", Failed => "failed",
    });
}

pub mod outbox_queue {
    use super::*;
    str_enum!(OutboxQueue, {
        CriticalPayments => "critical_payments", CriticalTrust => "critical_trust",
        UserNotifications => "user_notifications", Exports => "exports", Maintenance => "maintenance",
    });
}

pub mod expertise_slot {
    use super::*;
    str_enum!(ExpertiseSlot, { Primary => "primary", Secondary => "secondary" });
}

pub mod correction_scope {
    use super::*;
    str_enum!(CorrectionScope, {
        Global => "global", City => "city", Zone => "zone", Category => "category",
    });
}

pub mod correction_verdict {
    use super::*;
    str_enum!(CorrectionVerdict, {
        Causal => "causal", NonCausal => "non_causal", Inconclusive => "inconclusive",
    });
}

pub mod notification_category {
    use super::*;
    str_enum!(NotificationCategory, {
        TaskUpdate => "task_update", Payment => "payment", Dispute => "dispute",
        SupplyInvite => "supply_invite", SecurityAlert => "security_alert", Marketing => "marketing",
    });
}

pub mod priority {
    use super::*;
    str_enum!(Priority, { Low => "low", Medium => "medium", High => "high", Critical => "critical" });
}

pub mod channel {
    use super::*;
    str_enum!(Channel, { InApp => "in_app", Push => "push", Email => "email" });
}

pub mod email_outbox_status {
    use super::*;
    str_enum!(EmailOutboxStatus, {
        Pending => "pending", Sending => "sending", Sent => "sent",
        Failed => "failed", Suppressed => "suppressed",
    });
}
