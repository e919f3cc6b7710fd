use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::Category;

pub async fn create(
    pool: &SqlitePool,
    user_id: i64,
    name: &str,
    description: &str,
) -> Result<Category, sqlx::Error> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO categories (name, description, user_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(description)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?")
        .bind(result.last_insert_rowid())
        .fetch_one(pool)
        .await
}

pub async fn list_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<Category>, sqlx::Error> {
    sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE user_id = ? ORDER BY id")
        .bind(user_id)
        .fetch_all(pool)
        .await
}

pub async fn find_for_user(
    pool: &SqlitePool,
    id: i64,
    user_id: i64,
) -> Result<Option<Category>, sqlx::Error> {
    sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Update an owned category. Returns the updated row, or `None` when the
/// category does not exist or belongs to another user.
pub async fn update_for_user(
    pool: &SqlitePool,
    id: i64,
    user_id: i64,
    name: &str,
    description: &str,
) -> Result<Option<Category>, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE categories SET name = ?, description = ?, updated_at = ? WHERE id = ? AND user_id = ?",
    )
    .bind(name)
    .bind(description)
    .bind(Utc::now())
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    find_for_user(pool, id, user_id).await
}

pub async fn delete_for_user(pool: &SqlitePool, id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM categories WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
