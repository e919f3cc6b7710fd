//! Domain records as stored in SQLite.
//!
//! OAuth credentials on [`Account`] are never serialized into API responses.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A connected mailbox account.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub email: String,
    /// The provider's stable subject identifier for this mailbox.
    pub provider_id: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing)]
    pub token_expiry: Option<DateTime<Utc>>,
    /// Sync watermark: the last successfully synced point in time.
    pub last_sync_time: Option<DateTime<Utc>>,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user-defined classification target for incoming mail.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A locally stored copy of a mailbox message.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Email {
    pub id: i64,
    pub provider_message_id: String,
    pub subject: String,
    pub sender: String,
    pub body: String,
    pub summary: Option<String>,
    pub unsubscribe_link: Option<String>,
    pub received_at: DateTime<Utc>,
    pub is_archived: bool,
    pub category_id: Option<i64>,
    pub user_id: i64,
    pub account_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
