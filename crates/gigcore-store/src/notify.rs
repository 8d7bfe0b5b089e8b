use gigcore_core::error::CoreError;
use gigcore_core::model::{Channel, EmailOutboxRow, NotificationRow};

use crate::pool::Txn;
use crate::rowconv;

fn db_err(e: sqlx::Error) -> CoreError {
    CoreError::Storage(e.to_string())
}

pub async fn insert_notification(txn: &mut Txn, row: &NotificationRow) -> Result<(), CoreError> {
    let channels: Vec<&str> = row.channels.iter().map(|c| rowconv::channel::to_str(*c)).collect();
    sqlx::query(
        "INSERT INTO notifications (id, user_id, task_id, category, priority, channels, title, body, created_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
    )
    .bind(row.id.as_uuid())
    .bind(row.user_id.as_uuid())
    .bind(row.task_id.map(|t| t.as_uuid()))
    .bind(rowconv::notification_category::to_str(row.category))
    .bind(rowconv::priority::to_str(row.priority))
    .bind(&channels)
    .bind(&row.title)
    .bind(&row.body)
    .bind(row.created_at)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(())
}

pub async fn insert_email_outbox_row(txn: &mut Txn, row: &EmailOutboxRow) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO email_outbox (id, user_id, status, provider_id, next_retry_at, created_at)
         VALUES ($1,$2,$3,$4,$5,$6)",
    )
    .bind(row.id.as_uuid())
    .bind(row.user_id.as_uuid())
    .bind(rowconv::email_outbox_status::to_str(row.status))
    .bind(&row.provider_id)
    .bind(row.next_retry_at)
    .bind(row.created_at)
    .execute(&mut **txn)
    .await
    .map_err(db_err)?;
    Ok(())
}

pub fn channels_for_category(category: gigcore_core::model::NotificationCategory) -> Vec<Channel> {
    use gigcore_core::model::NotificationCategory::*;
    match category {
        SecurityAlert => vec![Channel::InApp, Channel::Push, Channel::Email],
        Dispute | Payment => vec![Channel::InApp, Channel::Push, Channel::Email],
        TaskUpdate | SupplyInvite => vec![Channel::InApp, Channel::Push],
        Marketing => vec![Channel::Email],
    }
}
