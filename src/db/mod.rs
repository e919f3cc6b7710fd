//! SQLite persistence layer.
//!
//! A thin set of query modules over a shared [`SqlitePool`]; services and API
//! handlers receive the pool as an explicit dependency.

use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

pub mod accounts;
pub mod categories;
pub mod emails;
pub mod users;

/// Open the SQLite pool, creating the database file (and its parent
/// directory) when missing. Foreign keys are enforced; category deletion
/// relies on `ON DELETE SET NULL` and account deletion on cascades.
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(path) = database_url.strip_prefix("sqlite:") {
        if path != ":memory:" && !path.is_empty() {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
                }
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

/// Apply pending migrations from `migrations/`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    info!("Running database migrations");
    sqlx::migrate!("./migrations").run(pool).await
}


#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::models::{Account, Category, User};
    use chrono::{DateTime, Utc};

    /// In-memory pool with the full schema applied. A single connection so
    /// every query sees the same `:memory:` database.
    pub async fn memory_pool() -> SqlitePool {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .expect("parse sqlite url")
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .expect("open in-memory database");
        run_migrations(&pool).await.expect("apply migrations");
        pool
    }

    pub async fn seed_user(pool: &SqlitePool, email: &str) -> User {
        users::create(pool, email).await.expect("seed user")
    }

    pub async fn seed_account(pool: &SqlitePool, user_id: i64, email: &str) -> Account {
        accounts::create(
            pool,
            accounts::NewAccount {
                email: email.to_string(),
                provider_id: format!("sub-{email}"),
                access_token: "access-token".to_string(),
                refresh_token: Some("refresh-token".to_string()),
                token_expiry: Utc::now() + chrono::Duration::hours(1),
                user_id,
            },
        )
        .await
        .expect("seed account")
    }

    pub async fn seed_category(pool: &SqlitePool, user_id: i64, name: &str) -> Category {
        categories::create(pool, user_id, name, "seeded for tests")
            .await
            .expect("seed category")
    }

    pub async fn set_watermark(pool: &SqlitePool, account_id: i64, at: DateTime<Utc>) {
        accounts::set_last_sync_time(pool, account_id, at)
            .await
            .expect("set watermark")
    }
}
