use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Declares a UUID-backed identifier newtype with the truncated `Debug`
/// rendering used throughout this crate (full value via `Display`/`as_uuid`).
macro_rules! id_type {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(u: Uuid) -> Self {
                Self(u)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:.8}…)", stringify!($name), self.0.to_string())
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }
    };
}

id_type!(UserId);
id_type!(TaskId);
id_type!(EscrowId);
id_type!(ProofId);
id_type!(ProofPhotoId);
id_type!(DisputeId);
id_type!(XpLedgerId);
id_type!(TrustLedgerId);
id_type!(OutboxId);
id_type!(RevenueLedgerId);
id_type!(ExpertiseId);
id_type!(CapacityId);
id_type!(UserExpertiseId);
id_type!(WaitlistId);
id_type!(CapacityChangeLogId);
id_type!(CorrectionId);
id_type!(NotificationId);
id_type!(EmailOutboxId);

/// Stripe's own event identifier is a provider-supplied opaque string
/// (`evt_...`), never a UUID generated by this service.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StripeEventId(pub String);

impl fmt::Display for StripeEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for StripeEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StripeEventId({})", self.0)
    }
}
