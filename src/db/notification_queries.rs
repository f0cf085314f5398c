use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use super::store::{ProgressUpdate, StoreError};
use crate::models::notification::{Notification, NotificationStatus, PhotoOutcome};

const COLUMNS: &str =
    "id, batch_id, user_id, created_at, status, total, completed, failed, message, read";

fn from_row(row: &PgRow) -> Result<Notification, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status = NotificationStatus::from_str(&status).map_err(|e| sqlx::Error::ColumnDecode {
        index: "status".to_string(),
        source: Box::new(e),
    })?;

    Ok(Notification {
        id: row.try_get("id")?,
        batch_id: row.try_get("batch_id")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        status,
        total: row.try_get("total")?,
        completed: row.try_get("completed")?,
        failed: row.try_get("failed")?,
        message: row.try_get("message")?,
        read: row.try_get("read")?,
    })
}

/// Insert a new batch progress record; an existing one for the batch is kept
pub async fn create_notification(
    pool: &PgPool,
    notification: &Notification,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO notifications
            (id, batch_id, user_id, created_at, status, total, completed, failed, message, read)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (user_id, batch_id) DO NOTHING
        "#,
    )
    .bind(notification.id)
    .bind(notification.batch_id)
    .bind(notification.user_id)
    .bind(notification.created_at)
    .bind(notification.status.as_ref())
    .bind(notification.total)
    .bind(notification.completed)
    .bind(notification.failed)
    .bind(notification.message.as_deref())
    .bind(notification.read)
    .execute(pool)
    .await?;

    Ok(())
}

/// Count one photo toward a batch, at most once per photo key.
///
/// The record row is locked for the duration of the transaction, so
/// concurrent results for the same batch serialize here and nowhere else.
pub async fn record_result(
    pool: &PgPool,
    user_id: Uuid,
    batch_id: Uuid,
    photo_key: &str,
    outcome: PhotoOutcome,
) -> Result<ProgressUpdate, StoreError> {
    let mut tx = pool.begin().await?;

    let current = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM notifications WHERE user_id = $1 AND batch_id = $2 FOR UPDATE"
    ))
    .bind(user_id)
    .bind(batch_id)
    .fetch_optional(&mut *tx)
    .await?;

    let current = match current {
        Some(row) => from_row(&row)?,
        None => return Err(StoreError::NotFound { batch_id }),
    };

    if current.processed() >= current.total {
        tx.rollback().await?;
        return Ok(ProgressUpdate::Saturated(current));
    }

    let claimed = sqlx::query(
        r#"
        INSERT INTO notification_results (notification_id, photo_key, outcome)
        VALUES ($1, $2, $3)
        ON CONFLICT (notification_id, photo_key) DO NOTHING
        "#,
    )
    .bind(current.id)
    .bind(photo_key)
    .bind(outcome.as_ref())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if claimed == 0 {
        tx.rollback().await?;
        return Ok(ProgressUpdate::Duplicate(current));
    }

    let (completed_inc, failed_inc) = match outcome {
        PhotoOutcome::Embedded => (1, 0),
        PhotoOutcome::Failed => (0, 1),
    };

    let row = sqlx::query(&format!(
        r#"
        UPDATE notifications
        SET completed = completed + $2,
            failed = failed + $3,
            read = FALSE
        WHERE id = $1
        RETURNING {COLUMNS}
        "#
    ))
    .bind(current.id)
    .bind(completed_inc)
    .bind(failed_inc)
    .fetch_one(&mut *tx)
    .await?;

    let updated = from_row(&row)?;
    tx.commit().await?;

    Ok(ProgressUpdate::Applied(updated))
}

/// Move a pending record to a terminal status; terminal records are left alone.
pub async fn set_status(
    pool: &PgPool,
    user_id: Uuid,
    batch_id: Uuid,
    status: NotificationStatus,
    message: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE notifications
        SET status = $3,
            message = $4
        WHERE user_id = $1
          AND batch_id = $2
          AND status = 'pending'
        "#,
    )
    .bind(user_id)
    .bind(batch_id)
    .bind(status.as_ref())
    .bind(message)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// All records of one owner, newest first
pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Notification>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM notifications WHERE user_id = $1 ORDER BY created_at DESC, id"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

/// Mark the owner's records among `ids` as read
pub async fn mark_read(pool: &PgPool, user_id: Uuid, ids: &[Uuid]) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        r#"
        UPDATE notifications
        SET read = TRUE
        WHERE user_id = $1
          AND id = ANY($2)
        "#,
    )
    .bind(user_id)
    .bind(ids)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
