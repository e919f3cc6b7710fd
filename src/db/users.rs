use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::User;

pub async fn create(pool: &SqlitePool, email: &str) -> Result<User, sqlx::Error> {
    let now = Utc::now();
    let result = sqlx::query("INSERT INTO users (email, created_at, updated_at) VALUES (?, ?, ?)")
        .bind(email)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(result.last_insert_rowid())
        .fetch_one(pool)
        .await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await
}
