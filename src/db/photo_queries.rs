use sqlx::postgres::PgRow;
use sqlx::{PgPool, QueryBuilder, Row};
use uuid::Uuid;

use crate::models::photo::Photo;

fn from_row(row: &PgRow) -> Result<Photo, sqlx::Error> {
    Ok(Photo {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        path: row.try_get("path")?,
        upload_at: row.try_get("upload_at")?,
        batch_id: row.try_get("batch_id")?,
        embedded: row.try_get("embedded")?,
    })
}

/// Insert the metadata of one upload batch in a single statement
pub async fn insert_photos(pool: &PgPool, photos: &[Photo]) -> Result<(), sqlx::Error> {
    if photos.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::new(
        "INSERT INTO photos (id, user_id, name, path, upload_at, batch_id, embedded) ",
    );
    builder.push_values(photos, |mut row, photo| {
        row.push_bind(photo.id)
            .push_bind(photo.user_id)
            .push_bind(&photo.name)
            .push_bind(&photo.path)
            .push_bind(photo.upload_at)
            .push_bind(photo.batch_id)
            .push_bind(photo.embedded);
    });
    builder.build().execute(pool).await?;

    Ok(())
}

/// One page of an owner's photos, newest first
pub async fn list_photos(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Photo>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, name, path, upload_at, batch_id, embedded
        FROM photos
        WHERE user_id = $1
        ORDER BY upload_at DESC, id
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

pub async fn count_photos(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS total FROM photos WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    row.try_get("total")
}

/// Flag a photo as embedded. Matching on path, or on name when path is empty.
pub async fn mark_embedded(
    pool: &PgPool,
    user_id: Uuid,
    batch_id: Uuid,
    name: &str,
    path: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE photos
        SET embedded = TRUE
        WHERE user_id = $1
          AND batch_id = $2
          AND (path = $3 OR ($3 = '' AND name = $4))
        "#,
    )
    .bind(user_id)
    .bind(batch_id)
    .bind(path)
    .bind(name)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// The owner's most recent photo with this path (or name when path is empty)
pub async fn find_photo(
    pool: &PgPool,
    user_id: Uuid,
    batch_id: Option<Uuid>,
    name: &str,
    path: &str,
) -> Result<Option<Photo>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, name, path, upload_at, batch_id, embedded
        FROM photos
        WHERE user_id = $1
          AND ($2::uuid IS NULL OR batch_id = $2)
          AND (path = $3 OR ($3 = '' AND name = $4))
        ORDER BY upload_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(batch_id)
    .bind(path)
    .bind(name)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(from_row).transpose()
}
