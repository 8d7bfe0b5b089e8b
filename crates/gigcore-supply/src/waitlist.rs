use std::sync::Arc;

use chrono::{Duration, Utc};
use gigcore_core::constants::{MAX_ACTIVE_EXPERTISE, WAITLIST_INVITE_EXPIRY_HOURS};
use gigcore_core::error::CoreError;
use gigcore_core::model::{NotificationCategory, NotificationRow, Priority};
use gigcore_core::ids::NotificationId;
use gigcore_store::{notify as notify_store, supply as supply_store, Store};
use tracing::info;

/// Runs after the daily decay/auto-expansion recompute (§4.G): for every
/// capacity row with free weight and an acceptable throughput ratio, walks
/// its waitlist FIFO, inviting entries that fit until the row runs out of
/// either free weight or fitting entries.
pub struct WaitlistProcessor {
    store: Arc<Store>,
}

impl WaitlistProcessor {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Returns the number of invitations issued.
    pub async fn process(&self) -> Result<u64, CoreError> {
        let now = Utc::now();
        let expired = supply_store::expire_stale_invitations(&self.store, now).await?;
        if expired > 0 {
            info!(expired, "stale waitlist invitations bulk-marked");
        }

        let capacities = supply_store::list_all_capacity(&self.store).await?;
        let mut invited_total = 0u64;

        for capacity in capacities {
            let ratio_ok = capacity.active_hustlers == 0 || capacity.liquidity_ratio >= capacity.min_task_to_supply_ratio;
            let mut free_weight = capacity.effective_max(now) - capacity.current_weight;
            if !ratio_ok || free_weight <= 0.0 {
                continue;
            }

            let expertise_id = capacity.expertise_id;
            let zone = capacity.zone.clone();
            let invited = self
                .store
                .in_txn(move |txn| {
                    Box::pin(async move {
                        let entries = supply_store::fifo_waitlist(txn, expertise_id, &zone).await?;
                        let mut invited = 0u64;
                        for entry in entries {
                            let active_count = supply_store::count_active_expertise_for_user(txn, entry.user_id).await?;
                            if active_count as usize >= MAX_ACTIVE_EXPERTISE {
                                supply_store::cancel_waitlist_entry(txn, entry.id).await?;
                                continue;
                            }

                            let weight = entry.slot.weight();
                            if weight > free_weight {
                                break;
                            }

                            let expires_at = now + Duration::hours(WAITLIST_INVITE_EXPIRY_HOURS);
                            supply_store::invite_waitlist_entry(txn, entry.id, now, expires_at).await?;

                            let notification = NotificationRow {
                                id: NotificationId::new(),
                                user_id: entry.user_id,
                                task_id: None,
                                category: NotificationCategory::SupplyInvite,
                                priority: Priority::Medium,
                                channels: notify_store::channels_for_category(NotificationCategory::SupplyInvite),
                                title: "A supply slot has opened up".to_string(),
                                body: format!("You have {WAITLIST_INVITE_EXPIRY_HOURS}h to accept before this invite expires."),
                                created_at: now,
                            };
                            notify_store::insert_notification(txn, &notification).await?;

                            free_weight -= weight;
                            invited += 1;
                        }
                        Ok(invited)
                    })
                })
                .await?;

            if invited > 0 {
                info!(expertise_id = %expertise_id, zone = %capacity.zone, invited, "waitlist invitations issued");
            }
            invited_total += invited;
        }
        Ok(invited_total)
    }
}
