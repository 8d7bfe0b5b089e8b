use gigcore_core::error::CoreError;
use gigcore_core::ids::UserId;
use gigcore_core::model::*;
use sqlx::Row;

use crate::pool::{Store, Txn};
use crate::rowconv;

fn row_to_user(row: &sqlx::postgres::PgRow) -> Result<User, CoreError> {
    Ok(User {
        id: UserId::from_uuid(row.try_get("id").map_err(db_err)?),
        default_mode: rowconv::user_mode::from_str(row.try_get("default_mode").map_err(db_err)?),
        trust_tier: row.try_get::<i16, _>("trust_tier").map_err(db_err)? as u8,
        xp_total: row.try_get("xp_total").map_err(db_err)?,
        current_streak: row.try_get::<i32, _>("current_streak").map_err(db_err)? as u32,
        verified_identity: row.try_get("verified_identity").map_err(db_err)?,
        verified_phone: row.try_get("verified_phone").map_err(db_err)?,
        plan: rowconv::plan::from_str(row.try_get("plan").map_err(db_err)?),
        plan_expires_at: row.try_get("plan_expires_at").map_err(db_err)?,
        account_status: rowconv::account_status::from_str(row.try_get("account_status").map_err(db_err)?),
        live_session_started_at: row.try_get("live_session_started_at").map_err(db_err)?,
        stripe_customer_id: row.try_get("stripe_customer_id").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::Storage(e.to_string())
}

impl Store {
    pub async fn get_user(&self, id: UserId) -> Result<Option<User>, CoreError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn is_admin(&self, id: UserId) -> Result<bool, CoreError> {
        let row = sqlx::query(
            "SELECT 1 FROM admin_roles WHERE user_id = $1 AND role IN ('admin', 'founder', 'moderator')",
        )
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;
        Ok(row.is_some())
    }

    /// Admin ids filtered to {admin, founder, moderator} (§4.I). Callers are
    /// expected to cache this for 5 minutes; this function itself is not cached.
    pub async fn list_admin_ids(&self) -> Result<Vec<UserId>, CoreError> {
        let rows = sqlx::query("SELECT user_id FROM admin_roles WHERE role IN ('admin', 'founder', 'moderator')")
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|r| r.try_get::<uuid::Uuid, _>("user_id").map(UserId::from_uuid).map_err(db_err))
            .collect()
    }
}

pub async fn lock_user_for_update(txn: &mut Txn, id: UserId) -> Result<Option<User>, CoreError> {
    let row = sqlx::query("SELECT * FROM users WHERE id = $1 FOR UPDATE")
        .bind(id.as_uuid())
        .fetch_optional(&mut **txn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_user).transpose()
}

pub async fn update_trust_tier(txn: &mut Txn, id: UserId, new_tier: u8) -> Result<(), CoreError> {
    sqlx::query("UPDATE users SET trust_tier = $2 WHERE id = $1")
        .bind(id.as_uuid())
        .bind(new_tier as i16)
        .execute(&mut **txn)
        .await
        .map_err(db_err)?;
    Ok(())
}

/// Applied by the Stripe effect worker on subscription lifecycle events.
pub async fn update_user_plan(
    txn: &mut Txn,
    id: UserId,
    plan: Plan,
    plan_expires_at: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<(), CoreError> {
    sqlx::query("UPDATE users SET plan = $2, plan_expires_at = $3 WHERE id = $1")
        .bind(id.as_uuid())
        .bind(rowconv::plan::to_str(plan))
        .bind(plan_expires_at)
        .execute(&mut **txn)
        .await
        .map_err(db_err)?;
    Ok(())
}

pub async fn find_user_by_stripe_customer(
    txn: &mut Txn,
    stripe_customer_id: &str,
) -> Result<Option<User>, CoreError> {
    let row = sqlx::query("SELECT * FROM users WHERE stripe_customer_id = $1")
        .bind(stripe_customer_id)
        .fetch_optional(&mut **txn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_user).transpose()
}

pub async fn insert_trust_ledger_entry(
    txn: &mut Txn,
    entry: &TrustLedgerEntry,
) -> Result<bool, CoreError> {
    let result = sqlx::query(
        "INSERT INTO trust_ledger (id, user_id, old_tier, new_tier, reason_code, source_event_id, idempotency_key)
         VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT (idempotency_key) DO NOTHING",
    )
    .bind(entry.id.as_uuid())
    .bind(entry.user_id.as_uuid())
    .bind(entry.old_tier as i16)
    .bind(entry.new_tier as i16)
    .bind(&entry.reason_code)
    .bind(&entry.source_event_id)
    .bind(&entry.idempotency_key)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(result.rows_affected() > 0)
}
