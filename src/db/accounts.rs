use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::Account;

/// Fields for a freshly connected mailbox account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub provider_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expiry: DateTime<Utc>,
    pub user_id: i64,
}

pub async fn create(pool: &SqlitePool, account: NewAccount) -> Result<Account, sqlx::Error> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO accounts (email, provider_id, access_token, refresh_token, token_expiry,
                              user_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&account.email)
    .bind(&account.provider_id)
    .bind(&account.access_token)
    .bind(&account.refresh_token)
    .bind(account.token_expiry)
    .bind(account.user_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
        .bind(result.last_insert_rowid())
        .fetch_one(pool)
        .await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_for_user(
    pool: &SqlitePool,
    id: i64,
    user_id: i64,
) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_provider_id(
    pool: &SqlitePool,
    provider_id: &str,
) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE provider_id = ?")
        .bind(provider_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE user_id = ? ORDER BY id")
        .bind(user_id)
        .fetch_all(pool)
        .await
}

pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts ORDER BY id")
        .fetch_all(pool)
        .await
}

/// Persist refreshed OAuth tokens. A missing refresh token keeps the stored
/// one (Google only returns it on the first consent).
pub async fn update_tokens(
    pool: &SqlitePool,
    id: i64,
    access_token: &str,
    refresh_token: Option<&str>,
    token_expiry: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE accounts
        SET access_token = ?,
            refresh_token = COALESCE(?, refresh_token),
            token_expiry = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(access_token)
    .bind(refresh_token)
    .bind(token_expiry)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn set_last_sync_time(
    pool: &SqlitePool,
    id: i64,
    at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE accounts SET last_sync_time = ?, updated_at = ? WHERE id = ?")
        .bind(at)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Delete an account owned by the given user. Stored emails cascade.
pub async fn delete_for_user(pool: &SqlitePool, id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM accounts WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
