use chrono::{DateTime, Utc};
use gigcore_core::error::CoreError;
use gigcore_core::ids::{CapacityId, ExpertiseId, UserExpertiseId, UserId, WaitlistId};
use gigcore_core::model::*;
use sqlx::Row;

use crate::pool::{Store, Txn};
use crate::rowconv;

fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::Storage(e.to_string())
}

fn row_to_capacity(row: &sqlx::postgres::PgRow) -> Result<Capacity, CoreError> {
    Ok(Capacity {
        id: CapacityId::from_uuid(row.try_get("id").map_err(db_err)?),
        expertise_id: ExpertiseId::from_uuid(row.try_get("expertise_id").map_err(db_err)?),
        zone: row.try_get("zone").map_err(db_err)?,
        max_weight_capacity: row.try_get("max_weight_capacity").map_err(db_err)?,
        min_task_to_supply_ratio: row.try_get("min_task_to_supply_ratio").map_err(db_err)?,
        current_weight: row.try_get("current_weight").map_err(db_err)?,
        active_hustlers: row.try_get("active_hustlers").map_err(db_err)?,
        open_tasks_7d: row.try_get("open_tasks_7d").map_err(db_err)?,
        completed_tasks_7d: row.try_get("completed_tasks_7d").map_err(db_err)?,
        liquidity_ratio: row.try_get("liquidity_ratio").map_err(db_err)?,
        open_ratio: row.try_get("open_ratio").map_err(db_err)?,
        auto_expand_pct: row.try_get("auto_expand_pct").map_err(db_err)?,
        auto_expand_expires_at: row.try_get("auto_expand_expires_at").map_err(db_err)?,
        version: row.try_get("version").map_err(db_err)?,
    })
}

fn row_to_user_expertise(row: &sqlx::postgres::PgRow) -> Result<UserExpertise, CoreError> {
    Ok(UserExpertise {
        id: UserExpertiseId::from_uuid(row.try_get("id").map_err(db_err)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(db_err)?),
        expertise_id: ExpertiseId::from_uuid(row.try_get("expertise_id").map_err(db_err)?),
        zone: row.try_get("zone").map_err(db_err)?,
        slot: rowconv::expertise_slot::from_str(row.try_get("slot").map_err(db_err)?),
        slot_weight: row.try_get("slot_weight").map_err(db_err)?,
        effective_weight: row.try_get("effective_weight").map_err(db_err)?,
        active: row.try_get("active").map_err(db_err)?,
        locked_until: row.try_get("locked_until").map_err(db_err)?,
        last_task_accepted_at: row.try_get("last_task_accepted_at").map_err(db_err)?,
        removed_at: row.try_get("removed_at").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn row_to_waitlist(row: &sqlx::postgres::PgRow) -> Result<WaitlistEntry, CoreError> {
    Ok(WaitlistEntry {
        id: WaitlistId::from_uuid(row.try_get("id").map_err(db_err)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(db_err)?),
        expertise_id: ExpertiseId::from_uuid(row.try_get("expertise_id").map_err(db_err)?),
        zone: row.try_get("zone").map_err(db_err)?,
        slot: rowconv::expertise_slot::from_str(row.try_get("slot").map_err(db_err)?),
        position: row.try_get("position").map_err(db_err)?,
        reason: row.try_get("reason").map_err(db_err)?,
        invited_at: row.try_get("invited_at").map_err(db_err)?,
        invite_expires_at: row.try_get("invite_expires_at").map_err(db_err)?,
        cancelled: row.try_get("cancelled").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

impl Store {
    pub async fn get_capacity(&self, expertise_id: ExpertiseId, zone: &str) -> Result<Option<Capacity>, CoreError> {
        let row = sqlx::query("SELECT * FROM capacity WHERE expertise_id = $1 AND zone = $2")
            .bind(expertise_id.as_uuid())
            .bind(zone)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_capacity).transpose()
    }

    pub async fn list_active_user_expertise(&self, user_id: UserId) -> Result<Vec<UserExpertise>, CoreError> {
        let rows = sqlx::query("SELECT * FROM user_expertise WHERE user_id = $1 AND active ORDER BY created_at")
            .bind(user_id.as_uuid())
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_user_expertise).collect()
    }

    /// Any inactive (decayed/removed) row for this (user, expertise) newer
    /// than the cooldown window (§4.G step 3).
    pub async fn find_recent_inactive_expertise(
        &self,
        user_id: UserId,
        expertise_id: ExpertiseId,
        cooldown_cutoff: DateTime<Utc>,
    ) -> Result<Option<UserExpertise>, CoreError> {
        let row = sqlx::query(
            "SELECT * FROM user_expertise
             WHERE user_id = $1 AND expertise_id = $2 AND NOT active AND removed_at > $3
             ORDER BY removed_at DESC LIMIT 1",
        )
        .bind(user_id.as_uuid())
        .bind(expertise_id.as_uuid())
        .bind(cooldown_cutoff)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;
        row.as_ref().map(row_to_user_expertise).transpose()
    }
}

/// Any inactive row for this (user, expertise), regardless of age — used by
/// the admission gate to decide between COOLDOWN and stale-row cleanup
/// (§4.G step 3). Locked `FOR UPDATE` since a deletion may follow.
pub async fn find_any_inactive_expertise_for_update(
    txn: &mut Txn,
    user_id: UserId,
    expertise_id: ExpertiseId,
) -> Result<Option<UserExpertise>, CoreError> {
    let row = sqlx::query(
        "SELECT * FROM user_expertise
         WHERE user_id = $1 AND expertise_id = $2 AND NOT active
         ORDER BY removed_at DESC LIMIT 1 FOR UPDATE",
    )
    .bind(user_id.as_uuid())
    .bind(expertise_id.as_uuid())
    .fetch_optional(&mut **txn)
    .await
    .map_err(db_err)?;
    row.as_ref().map(row_to_user_expertise).transpose()
}

pub async fn lock_capacity_for_update(
    txn: &mut Txn,
    expertise_id: ExpertiseId,
    zone: &str,
) -> Result<Option<Capacity>, CoreError> {
    let row = sqlx::query("SELECT * FROM capacity WHERE expertise_id = $1 AND zone = $2 FOR UPDATE")
        .bind(expertise_id.as_uuid())
        .bind(zone)
        .fetch_optional(&mut **txn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_capacity).transpose()
}

pub async fn update_capacity(txn: &mut Txn, capacity: &Capacity, expected_version: i64) -> Result<bool, CoreError> {
    let result = sqlx::query(
        "UPDATE capacity SET current_weight = $2, active_hustlers = $3, open_tasks_7d = $4,
            completed_tasks_7d = $5, liquidity_ratio = $6, open_ratio = $7, auto_expand_pct = $8,
            auto_expand_expires_at = $9, version = version + 1
         WHERE id = $1 AND version = $10",
    )
    .bind(capacity.id.as_uuid())
    .bind(capacity.current_weight)
    .bind(capacity.active_hustlers)
    .bind(capacity.open_tasks_7d)
    .bind(capacity.completed_tasks_7d)
    .bind(capacity.liquidity_ratio)
    .bind(capacity.open_ratio)
    .bind(capacity.auto_expand_pct)
    .bind(capacity.auto_expand_expires_at)
    .bind(expected_version)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(result.rows_affected() > 0)
}

/// Locks every active row for the user so the admission gate's 30-day lock
/// and max-two checks (§4.G steps 1–2) observe a consistent snapshot.
pub async fn list_active_user_expertise_for_update(
    txn: &mut Txn,
    user_id: UserId,
) -> Result<Vec<UserExpertise>, CoreError> {
    let rows = sqlx::query("SELECT * FROM user_expertise WHERE user_id = $1 AND active ORDER BY created_at FOR UPDATE")
        .bind(user_id.as_uuid())
        .fetch_all(&mut **txn)
        .await
        .map_err(db_err)?;
    rows.iter().map(row_to_user_expertise).collect()
}

pub async fn count_active_expertise_for_user(txn: &mut Txn, user_id: UserId) -> Result<i64, CoreError> {
    sqlx::query_scalar("SELECT count(*) FROM user_expertise WHERE user_id = $1 AND active")
        .bind(user_id.as_uuid())
        .fetch_one(&mut **txn)
        .await
        .map_err(db_err)
}

pub async fn find_active_expertise_row(
    txn: &mut Txn,
    user_id: UserId,
    expertise_id: ExpertiseId,
) -> Result<Option<UserExpertise>, CoreError> {
    let row = sqlx::query(
        "SELECT * FROM user_expertise WHERE user_id = $1 AND expertise_id = $2 AND active",
    )
    .bind(user_id.as_uuid())
    .bind(expertise_id.as_uuid())
    .fetch_optional(&mut **txn)
    .await
    .map_err(db_err)?;
    row.as_ref().map(row_to_user_expertise).transpose()
}

pub async fn lock_user_expertise_for_update(
    txn: &mut Txn,
    id: UserExpertiseId,
) -> Result<Option<UserExpertise>, CoreError> {
    let row = sqlx::query("SELECT * FROM user_expertise WHERE id = $1 FOR UPDATE")
        .bind(id.as_uuid())
        .fetch_optional(&mut **txn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_user_expertise).transpose()
}

pub async fn update_user_expertise(txn: &mut Txn, row: &UserExpertise) -> Result<(), CoreError> {
    sqlx::query(
        "UPDATE user_expertise SET slot = $2, slot_weight = $3, effective_weight = $4,
            active = $5, locked_until = $6, last_task_accepted_at = $7, removed_at = $8
         WHERE id = $1",
    )
    .bind(row.id.as_uuid())
    .bind(rowconv::expertise_slot::to_str(row.slot))
    .bind(row.slot_weight)
    .bind(row.effective_weight)
    .bind(row.active)
    .bind(row.locked_until)
    .bind(row.last_task_accepted_at)
    .bind(row.removed_at)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(())
}

/// Every active row system-wide, for the daily decay recompute. Not locked:
/// the recompute updates rows one at a time under their own lock.
pub async fn list_all_active_user_expertise(store: &Store) -> Result<Vec<UserExpertise>, CoreError> {
    let rows = sqlx::query("SELECT * FROM user_expertise WHERE active")
        .fetch_all(store.pool())
        .await
        .map_err(db_err)?;
    rows.iter().map(row_to_user_expertise).collect()
}

/// Every (expertise, zone) capacity row, for the daily auto-expansion sweep.
pub async fn list_all_capacity(store: &Store) -> Result<Vec<Capacity>, CoreError> {
    let rows = sqlx::query("SELECT * FROM capacity")
        .fetch_all(store.pool())
        .await
        .map_err(db_err)?;
    rows.iter().map(row_to_capacity).collect()
}

pub async fn delete_stale_inactive_row(txn: &mut Txn, id: UserExpertiseId) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM user_expertise WHERE id = $1 AND NOT active")
        .bind(id.as_uuid())
        .execute(&mut **txn)
        .await
        .map_err(db_err)?;
    Ok(())
}

pub async fn insert_user_expertise(txn: &mut Txn, row: &UserExpertise) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO user_expertise (id, user_id, expertise_id, zone, slot, slot_weight,
            effective_weight, active, locked_until, last_task_accepted_at, removed_at, created_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
    )
    .bind(row.id.as_uuid())
    .bind(row.user_id.as_uuid())
    .bind(row.expertise_id.as_uuid())
    .bind(&row.zone)
    .bind(rowconv::expertise_slot::to_str(row.slot))
    .bind(row.slot_weight)
    .bind(row.effective_weight)
    .bind(row.active)
    .bind(row.locked_until)
    .bind(row.last_task_accepted_at)
    .bind(row.removed_at)
    .bind(row.created_at)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(())
}

pub async fn soft_delete_user_expertise(
    txn: &mut Txn,
    id: UserExpertiseId,
    removed_at: DateTime<Utc>,
) -> Result<(), CoreError> {
    sqlx::query("UPDATE user_expertise SET active = FALSE, removed_at = $2 WHERE id = $1")
        .bind(id.as_uuid())
        .bind(removed_at)
        .execute(&mut **txn)
        .await
        .map_err(db_err)?;
    Ok(())
}

pub async fn insert_waitlist_entry(txn: &mut Txn, entry: &WaitlistEntry) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO waitlist (id, user_id, expertise_id, zone, slot, position, reason,
            invited_at, invite_expires_at, cancelled, created_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)",
    )
    .bind(entry.id.as_uuid())
    .bind(entry.user_id.as_uuid())
    .bind(entry.expertise_id.as_uuid())
    .bind(&entry.zone)
    .bind(rowconv::expertise_slot::to_str(entry.slot))
    .bind(entry.position)
    .bind(&entry.reason)
    .bind(entry.invited_at)
    .bind(entry.invite_expires_at)
    .bind(entry.cancelled)
    .bind(entry.created_at)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(())
}

pub async fn next_waitlist_position(
    txn: &mut Txn,
    expertise_id: ExpertiseId,
    zone: &str,
) -> Result<i32, CoreError> {
    let max: Option<i32> = sqlx::query_scalar(
        "SELECT max(position) FROM waitlist WHERE expertise_id = $1 AND zone = $2",
    )
    .bind(expertise_id.as_uuid())
    .bind(zone)
    .fetch_one(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(max.unwrap_or(0) + 1)
}

pub async fn fifo_waitlist(
    txn: &mut Txn,
    expertise_id: ExpertiseId,
    zone: &str,
) -> Result<Vec<WaitlistEntry>, CoreError> {
    let rows = sqlx::query(
        "SELECT * FROM waitlist WHERE expertise_id = $1 AND zone = $2
            AND NOT cancelled AND invited_at IS NULL
         ORDER BY position FOR UPDATE",
    )
    .bind(expertise_id.as_uuid())
    .bind(zone)
    .fetch_all(&mut **txn)
    .await
    .map_err(db_err)?;
    rows.iter().map(row_to_waitlist).collect()
}

pub async fn cancel_waitlist_entry(txn: &mut Txn, id: WaitlistId) -> Result<(), CoreError> {
    sqlx::query("UPDATE waitlist SET cancelled = TRUE WHERE id = $1")
        .bind(id.as_uuid())
        .execute(&mut **txn)
        .await
        .map_err(db_err)?;
    Ok(())
}

pub async fn invite_waitlist_entry(
    txn: &mut Txn,
    id: WaitlistId,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<(), CoreError> {
    sqlx::query("UPDATE waitlist SET invited_at = $2, invite_expires_at = $3 WHERE id = $1")
        .bind(id.as_uuid())
        .bind(now)
        .bind(expires_at)
        .execute(&mut **txn)
        .await
        .map_err(db_err)?;
    Ok(())
}

pub async fn expire_stale_invitations(store: &Store, now: DateTime<Utc>) -> Result<u64, CoreError> {
    let result = sqlx::query(
        "UPDATE waitlist SET cancelled = TRUE
         WHERE invited_at IS NOT NULL AND NOT cancelled AND invite_expires_at < $1",
    )
    .bind(now)
    .execute(store.pool())
    .await
    .map_err(db_err)?;
    Ok(result.rows_affected())
}

pub async fn insert_change_log(txn: &mut Txn, entry: &CapacityChangeLogEntry) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO capacity_change_log (id, capacity_id, user_id, action, outcome, detail, created_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7)",
    )
    .bind(entry.id.as_uuid())
    .bind(entry.capacity_id.as_uuid())
    .bind(entry.user_id.map(|u| u.as_uuid()))
    .bind(&entry.action)
    .bind(&entry.outcome)
    .bind(&entry.detail)
    .bind(entry.created_at)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(())
}

/// Sampled accept latencies (seconds) over the lookback window for one
/// (expertise, zone), used by the auto-expansion P95 check (§4.G).
pub async fn accept_latencies_seconds(
    store: &Store,
    expertise_id: ExpertiseId,
    zone: &str,
    since: DateTime<Utc>,
) -> Result<Vec<f64>, CoreError> {
    let rows: Vec<(f64,)> = sqlx::query_as(
        "SELECT EXTRACT(EPOCH FROM (ue.last_task_accepted_at - ue.created_at))
         FROM user_expertise ue
         WHERE ue.last_task_accepted_at IS NOT NULL AND ue.created_at >= $1
           AND ue.expertise_id = $2 AND ue.zone = $3",
    )
    .bind(since)
    .bind(expertise_id.as_uuid())
    .bind(zone)
    .fetch_all(store.pool())
    .await
    .map_err(db_err)?;
    Ok(rows.into_iter().map(|(v,)| v).collect())
}
