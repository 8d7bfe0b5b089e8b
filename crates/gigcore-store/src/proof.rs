use gigcore_core::error::CoreError;
use gigcore_core::ids::{ProofId, ProofPhotoId, TaskId, UserId};
use gigcore_core::model::*;
use sqlx::Row;

use crate::pool::{Store, Txn};
use crate::rowconv;

fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::Storage(e.to_string())
}

fn row_to_proof(row: &sqlx::postgres::PgRow) -> Result<Proof, CoreError> {
    Ok(Proof {
        id: ProofId::from_uuid(row.try_get("id").map_err(db_err)?),
        task_id: TaskId::from_uuid(row.try_get("task_id").map_err(db_err)?),
        submitter_id: UserId::from_uuid(row.try_get("submitter_id").map_err(db_err)?),
        state: rowconv::proof_state::from_str(row.try_get("state").map_err(db_err)?),
        reviewer_id: row
            .try_get::<Option<uuid::Uuid>, _>("reviewer_id")
            .map_err(db_err)?
            .map(UserId::from_uuid),
        rejection_reason: row.try_get("rejection_reason").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

impl Store {
    pub async fn get_proof(&self, id: ProofId) -> Result<Option<Proof>, CoreError> {
        let row = sqlx::query("SELECT * FROM proofs WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?;
        row.as_ref().map(row_to_proof).transpose()
    }

    pub async fn list_proof_photos(&self, proof_id: ProofId) -> Result<Vec<ProofPhoto>, CoreError> {
        let rows = sqlx::query("SELECT * FROM proof_photos WHERE proof_id = $1 ORDER BY sequence")
            .bind(proof_id.as_uuid())
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                Ok(ProofPhoto {
                    id: ProofPhotoId::from_uuid(row.try_get("id").map_err(db_err)?),
                    proof_id,
                    storage_key: row.try_get("storage_key").map_err(db_err)?,
                    checksum: row.try_get("checksum").map_err(db_err)?,
                    captured_at: row.try_get("captured_at").map_err(db_err)?,
                    sequence: row.try_get("sequence").map_err(db_err)?,
                })
            })
            .collect()
    }
}

pub async fn insert_proof(txn: &mut Txn, proof: &Proof) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO proofs (id, task_id, submitter_id, state, reviewer_id, rejection_reason, created_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7)",
    )
    .bind(proof.id.as_uuid())
    .bind(proof.task_id.as_uuid())
    .bind(proof.submitter_id.as_uuid())
    .bind(rowconv::proof_state::to_str(proof.state))
    .bind(proof.reviewer_id.map(|u| u.as_uuid()))
    .bind(&proof.rejection_reason)
    .bind(proof.created_at)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(())
}

pub async fn insert_proof_photo(txn: &mut Txn, photo: &ProofPhoto) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO proof_photos (id, proof_id, storage_key, checksum, captured_at, sequence)
         VALUES ($1,$2,$3,$4,$5,$6)",
    )
    .bind(photo.id.as_uuid())
    .bind(photo.proof_id.as_uuid())
    .bind(&photo.storage_key)
    .bind(&photo.checksum)
    .bind(photo.captured_at)
    .bind(photo.sequence)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(())
}

pub async fn lock_proof_for_update(txn: &mut Txn, id: ProofId) -> Result<Option<Proof>, CoreError> {
    let row = sqlx::query("SELECT * FROM proofs WHERE id = $1 FOR UPDATE")
        .bind(id.as_uuid())
        .fetch_optional(&mut **txn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(row_to_proof).transpose()
}

/// Uniqueness on `uq_proofs_accepted_per_task` is the backstop; the caller
/// still performs this ordinary state-guarded update.
pub async fn update_proof_state(txn: &mut Txn, proof: &Proof) -> Result<(), CoreError> {
    sqlx::query(
        "UPDATE proofs SET state = $2, reviewer_id = $3, rejection_reason = $4 WHERE id = $1",
    )
    .bind(proof.id.as_uuid())
    .bind(rowconv::proof_state::to_str(proof.state))
    .bind(proof.reviewer_id.map(|u| u.as_uuid()))
    .bind(&proof.rejection_reason)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(())
}
