use chrono::{DateTime, Utc};
use gigcore_core::error::CoreError;
use gigcore_core::ids::CorrectionId;
use gigcore_core::model::*;
use sqlx::Row;

use crate::pool::{Store, Txn};
use crate::rowconv;

fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::Storage(e.to_string())
}

fn row_to_correction(row: &sqlx::postgres::PgRow) -> Result<CorrectionRow, CoreError> {
    Ok(CorrectionRow {
        id: CorrectionId::from_uuid(row.try_get("id").map_err(db_err)?),
        correction_type: row.try_get("correction_type").map_err(db_err)?,
        target_entity: row.try_get("target_entity").map_err(db_err)?,
        target_id: row.try_get("target_id").map_err(db_err)?,
        adjustment_payload: row.try_get("adjustment_payload").map_err(db_err)?,
        prior_payload: row.try_get("prior_payload").map_err(db_err)?,
        reason_code: row.try_get("reason_code").map_err(db_err)?,
        scope: rowconv::correction_scope::from_str(row.try_get("scope").map_err(db_err)?),
        zone: row.try_get("zone").map_err(db_err)?,
        city: row.try_get("city").map_err(db_err)?,
        category: row.try_get("category").map_err(db_err)?,
        expires_at: row.try_get("expires_at").map_err(db_err)?,
        reversed: row.try_get("reversed").map_err(db_err)?,
        reversed_at: row.try_get("reversed_at").map_err(db_err)?,
        verdict: row
            .try_get::<Option<String>, _>("verdict")
            .map_err(db_err)?
            .map(|s| rowconv::correction_verdict::from_str(&s)),
        applied_at: row.try_get("applied_at").map_err(db_err)?,
    })
}

impl Store {
    pub async fn get_correction(&self, id: CorrectionId) -> Result<Option<CorrectionRow>, CoreError> {
        let row = sqlx::query("SELECT * FROM corrections WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_correction).transpose()
    }

    pub async fn safe_mode_enabled(&self) -> Result<bool, CoreError> {
        sqlx::query_scalar("SELECT enabled FROM safe_mode_flags WHERE id")
            .fetch_one(self.pool())
            .await
            .map_err(db_err)
    }

    pub async fn set_safe_mode(&self, enabled: bool, set_by: &str) -> Result<(), CoreError> {
        sqlx::query("UPDATE safe_mode_flags SET enabled = $1, set_by = $2, updated_at = now() WHERE id")
            .bind(enabled)
            .bind(set_by)
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Corrections of the same type in the same window but a *different*
    /// zone, used by the analyzer to pick a matched control (§4.H, Open
    /// Question (c): matched by type alone).
    pub async fn corrections_of_type_excluding_zone(
        &self,
        correction_type: &str,
        excluded_zone: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<CorrectionRow>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM corrections
             WHERE correction_type = $1 AND (zone IS NULL OR zone != $2)
               AND applied_at BETWEEN $3 AND $4",
        )
        .bind(correction_type)
        .bind(excluded_zone)
        .bind(window_start)
        .bind(window_end)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_correction).collect()
    }

    pub async fn recent_verdict_counts(
        &self,
        since: DateTime<Utc>,
    ) -> Result<(i64, i64), CoreError> {
        let (total, non_causal): (i64, i64) = sqlx::query_as(
            "SELECT count(*) FILTER (WHERE verdict IS NOT NULL),
                    count(*) FILTER (WHERE verdict = 'non_causal')
             FROM corrections WHERE applied_at >= $1",
        )
        .bind(since)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;
        Ok((total, non_causal))
    }

    /// Read-only budget check (§4.H: "the budget check is read-only"); the
    /// write side is `consume_budget`, called only after a successful apply.
    pub async fn budget_count(
        &self,
        scope: &str,
        scope_key: &str,
        window_start: DateTime<Utc>,
    ) -> Result<i32, CoreError> {
        let count: Option<i32> = sqlx::query_scalar(
            "SELECT count FROM correction_budget_counters
             WHERE scope = $1 AND scope_key = $2 AND window_start = $3",
        )
        .bind(scope)
        .bind(scope_key)
        .bind(window_start)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;
        Ok(count.unwrap_or(0))
    }

    /// Corrections whose post-window has closed (§4.H: analyzed "after a
    /// fixed post-window") and that have not yet received a verdict.
    pub async fn corrections_pending_verdict(&self, now: DateTime<Utc>) -> Result<Vec<CorrectionRow>, CoreError> {
        let rows = sqlx::query("SELECT * FROM corrections WHERE verdict IS NULL AND expires_at <= $1")
            .bind(now)
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_correction).collect()
    }

    pub async fn expire_corrections(&self, now: DateTime<Utc>) -> Result<Vec<CorrectionRow>, CoreError> {
        let rows = sqlx::query(
            "SELECT * FROM corrections WHERE NOT reversed AND expires_at <= $1",
        )
        .bind(now)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_correction).collect()
    }
}

pub async fn lock_correction_for_update(txn: &mut Txn, id: CorrectionId) -> Result<Option<CorrectionRow>, CoreError> {
    let row = sqlx::query("SELECT * FROM corrections WHERE id = $1 FOR UPDATE")
        .bind(id.as_uuid())
        .fetch_optional(&mut **txn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_correction).transpose()
}

pub async fn insert_correction(txn: &mut Txn, row: &CorrectionRow) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO corrections (id, correction_type, target_entity, target_id, adjustment_payload,
            prior_payload, reason_code, scope, zone, city, category, expires_at, reversed, applied_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)",
    )
    .bind(row.id.as_uuid())
    .bind(&row.correction_type)
    .bind(&row.target_entity)
    .bind(&row.target_id)
    .bind(&row.adjustment_payload)
    .bind(&row.prior_payload)
    .bind(&row.reason_code)
    .bind(rowconv::correction_scope::to_str(row.scope))
    .bind(&row.zone)
    .bind(&row.city)
    .bind(&row.category)
    .bind(row.expires_at)
    .bind(row.reversed)
    .bind(row.applied_at)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(())
}

pub async fn mark_reversed(txn: &mut Txn, id: CorrectionId, reversed_at: DateTime<Utc>) -> Result<(), CoreError> {
    sqlx::query("UPDATE corrections SET reversed = TRUE, reversed_at = $2 WHERE id = $1")
        .bind(id.as_uuid())
        .bind(reversed_at)
        .execute(&mut **txn)
        .await
        .map_err(db_err)?;
    Ok(())
}

pub async fn set_verdict(txn: &mut Txn, id: CorrectionId, verdict: CorrectionVerdict) -> Result<(), CoreError> {
    sqlx::query("UPDATE corrections SET verdict = $2 WHERE id = $1")
        .bind(id.as_uuid())
        .bind(rowconv::correction_verdict::to_str(verdict))
        .execute(&mut **txn)
        .await
        .map_err(db_err)?;
    Ok(())
}

/// Budget check-and-consume (§4.H): atomically upserts the rounded-hour
/// window counter and returns the post-increment count, so the caller can
/// compare against the scope's limit without a separate read.
pub async fn consume_budget(
    txn: &mut Txn,
    scope: &str,
    scope_key: &str,
    window_start: DateTime<Utc>,
) -> Result<i32, CoreError> {
    let count: i32 = sqlx::query_scalar(
        "INSERT INTO correction_budget_counters (scope, scope_key, window_start, count)
         VALUES ($1, $2, $3, 1)
         ON CONFLICT (scope, scope_key, window_start)
         DO UPDATE SET count = correction_budget_counters.count + 1
         RETURNING count",
    )
    .bind(scope)
    .bind(scope_key)
    .bind(window_start)
    .fetch_one(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(count)
}
