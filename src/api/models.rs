//! Request/response payloads for the REST API.

use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

/// Create/update payload for a category. Both fields are required; the
/// update endpoint replaces the whole record.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CategoryPayload {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 500, message = "description must be at most 500 characters"))]
    pub description: String,
}

fn default_limit() -> i64 {
    50
}

/// Query parameters for listing emails.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ListEmailsQuery {
    pub category_id: Option<i64>,
    pub account_id: Option<i64>,
    pub search: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub skip: i64,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100))]
    pub limit: i64,
}

/// Partial update for an email. Absent fields are left alone; an explicit
/// `"category_id": null` clears the category.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailUpdateRequest {
    #[serde(default, deserialize_with = "double_option")]
    pub category_id: Option<Option<i64>>,
    pub summary: Option<String>,
    pub is_archived: Option<bool>,
}

/// Distinguishes a missing field (outer `None`) from an explicit null
/// (`Some(None)`).
fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<i64>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkDeleteRequest {
    pub email_ids: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthUrlQuery {
    #[serde(default)]
    pub connect_account: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthUrlResponse {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeCodeRequest {
    pub code: String,
    pub state: String,
}

/// Query parameters Google appends to the callback redirect.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkDeleteResponse {
    pub message: String,
    pub deleted: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStartedResponse {
    pub message: String,
    pub accounts: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResultResponse {
    pub message: String,
    pub new_count: u64,
}
