// Copyright (c) 2025 Mailsift
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mailbox client over the Gmail REST API.
//!
//! Two operations: list new inbox messages since a watermark (capped at 50
//! per call) and archive a message by removing its INBOX label. Credentials
//! are refreshed lazily before use; a 401 mid-call gets exactly one
//! refresh-and-retry before becoming fatal for the sync pass.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine as _};
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use reqwest::StatusCode;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::db;
use crate::models::Account;
use crate::services::oauth::OAuthService;

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Limit per sync pass; anything newer is picked up next tick.
const LIST_PAGE_SIZE: u32 = 50;

/// Refresh this long before the recorded expiry to avoid using a token that
/// dies mid-request.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Error, Debug)]
pub enum MailboxError {
    #[error("Mailbox provider rejected credentials after refresh")]
    Unauthorized,
    #[error("Account has no refresh token")]
    MissingRefreshToken,
    #[error("Credential refresh failed: {0}")]
    CredentialRefresh(String),
    #[error("Mailbox provider error (status {status}): {detail}")]
    Provider { status: u16, detail: String },
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A message as pulled from the mailbox provider.
#[derive(Debug, Clone)]
pub struct RemoteMessage {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// Inbox messages received after `since`, at most 50.
    async fn list_new_messages(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<RemoteMessage>, MailboxError>;

    /// Archive a message in the source mailbox. Idempotent on the provider
    /// side: removing an absent label is a no-op.
    async fn archive(&self, message_id: &str) -> Result<(), MailboxError>;
}

// --- Gmail wire format ---

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Option<Vec<MessageRef>>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GmailMessage {
    id: String,
    #[serde(rename = "internalDate", default)]
    internal_date: Option<String>,
    payload: GmailPayload,
}

#[derive(Debug, Deserialize)]
struct GmailPayload {
    #[serde(rename = "mimeType", default)]
    mime_type: Option<String>,
    #[serde(default)]
    headers: Option<Vec<GmailHeader>>,
    #[serde(default)]
    body: Option<GmailBody>,
    #[serde(default)]
    parts: Option<Vec<GmailPayload>>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct GmailBody {
    #[serde(default)]
    data: Option<String>,
}

struct TokenState {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

/// Gmail-backed [`MailboxClient`] for one connected account. Refreshed
/// tokens are written back to the account row so later passes reuse them.
pub struct GmailClient {
    http: reqwest::Client,
    db: SqlitePool,
    oauth: Arc<OAuthService>,
    account_id: i64,
    tokens: Mutex<TokenState>,
}

impl GmailClient {
    pub fn for_account(db: SqlitePool, oauth: Arc<OAuthService>, account: &Account) -> Self {
        Self {
            http: reqwest::Client::new(),
            db,
            oauth,
            account_id: account.id,
            tokens: Mutex::new(TokenState {
                access_token: account.access_token.clone().unwrap_or_default(),
                refresh_token: account.refresh_token.clone(),
                expires_at: account.token_expiry,
            }),
        }
    }

    /// Current access token, refreshed (and persisted) when expired or when
    /// the caller forces it after a 401.
    async fn access_token(&self, force_refresh: bool) -> Result<String, MailboxError> {
        let mut state = self.tokens.lock().await;

        let expired = state.access_token.is_empty()
            || state.expires_at.map_or(true, |expires_at| {
                expires_at - Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) <= Utc::now()
            });

        if force_refresh || expired {
            let refresh_token = state
                .refresh_token
                .clone()
                .ok_or(MailboxError::MissingRefreshToken)?;

            debug!("Refreshing access token for account {}", self.account_id);
            let response = self
                .oauth
                .refresh_access_token(&refresh_token)
                .await
                .map_err(|e| MailboxError::CredentialRefresh(e.to_string()))?;

            let expires_at = Utc::now() + Duration::seconds(response.expires_in as i64);
            db::accounts::update_tokens(
                &self.db,
                self.account_id,
                &response.access_token,
                response.refresh_token.as_deref(),
                expires_at,
            )
            .await?;

            state.access_token = response.access_token;
            if let Some(refresh_token) = response.refresh_token {
                state.refresh_token = Some(refresh_token);
            }
            state.expires_at = Some(expires_at);
        }

        Ok(state.access_token.clone())
    }

    /// Send an authorized request; on a 401, refresh credentials and retry
    /// exactly once. A second 401 propagates as fatal for this pass.
    async fn send_authorized<F>(&self, build: F) -> Result<reqwest::Response, MailboxError>
    where
        F: Fn(&reqwest::Client, &str) -> reqwest::RequestBuilder,
    {
        let token = self.access_token(false).await?;
        let response = build(&self.http, &token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        warn!(
            "Mailbox call for account {} returned 401; refreshing credentials and retrying once",
            self.account_id
        );
        let token = self.access_token(true).await?;
        let response = build(&self.http, &token).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(MailboxError::Unauthorized);
        }
        check_status(response).await
    }

    async fn fetch_message(&self, id: &str) -> Result<GmailMessage, MailboxError> {
        let url = format!("{GMAIL_API_BASE}/messages/{id}?format=full");
        let response = self
            .send_authorized(|http, token| http.get(&url).bearer_auth(token))
            .await?;

        response
            .json::<GmailMessage>()
            .await
            .map_err(MailboxError::Http)
    }
}

#[async_trait]
impl MailboxClient for GmailClient {
    async fn list_new_messages(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<RemoteMessage>, MailboxError> {
        // "in:inbox" keeps archived mail out of the pull; "after:" takes a
        // Unix timestamp in seconds.
        let query = format!("in:inbox after:{}", since.timestamp());
        let url = format!(
            "{GMAIL_API_BASE}/messages?maxResults={LIST_PAGE_SIZE}&q={}",
            urlencoding::encode(&query)
        );

        let response = self
            .send_authorized(|http, token| http.get(&url).bearer_auth(token))
            .await?;
        let list: MessageList = response.json().await.map_err(MailboxError::Http)?;

        let refs = list.messages.unwrap_or_default();
        debug!(
            "Account {}: {} inbox messages newer than {}",
            self.account_id,
            refs.len(),
            since
        );

        let mut messages = Vec::with_capacity(refs.len());
        for message_ref in refs {
            let message = self.fetch_message(&message_ref.id).await?;
            messages.push(into_remote_message(message));
        }

        Ok(messages)
    }

    async fn archive(&self, message_id: &str) -> Result<(), MailboxError> {
        let url = format!("{GMAIL_API_BASE}/messages/{message_id}/modify");
        let body = serde_json::json!({ "removeLabelIds": ["INBOX"] });

        self.send_authorized(|http, token| http.post(&url).bearer_auth(token).json(&body))
            .await?;

        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, MailboxError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let detail = response.text().await.unwrap_or_default();
    Err(MailboxError::Provider {
        status: status.as_u16(),
        detail,
    })
}

/// Flatten a full Gmail message into the fields the triage pipeline keeps.
fn into_remote_message(message: GmailMessage) -> RemoteMessage {
    let subject = header_value(&message.payload, "Subject").unwrap_or_else(|| "No Subject".to_string());
    let sender = header_value(&message.payload, "From").unwrap_or_else(|| "Unknown".to_string());
    let body = extract_text_body(&message.payload).unwrap_or_default();

    let received_at = message
        .internal_date
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    RemoteMessage {
        id: message.id,
        subject,
        sender,
        body,
        received_at,
    }
}

fn header_value(payload: &GmailPayload, name: &str) -> Option<String> {
    payload
        .headers
        .as_ref()?
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(name))
        .map(|header| header.value.clone())
}

/// Prefer the first `text/plain` part, walking nested multiparts; fall back
/// to the top-level body.
fn extract_text_body(payload: &GmailPayload) -> Option<String> {
    if payload.mime_type.as_deref() == Some("text/plain") {
        if let Some(data) = payload.body.as_ref().and_then(|body| body.data.as_deref()) {
            return decode_body_data(data);
        }
    }

    if let Some(parts) = &payload.parts {
        for part in parts {
            if let Some(text) = extract_text_body(part) {
                return Some(text);
            }
        }
    }

    payload
        .body
        .as_ref()
        .and_then(|body| body.data.as_deref())
        .and_then(decode_body_data)
}

/// Gmail body data is base64url, with or without padding depending on the
/// producing client.
fn decode_body_data(data: &str) -> Option<String> {
    let bytes = BASE64URL.decode(data.trim_end_matches('=')).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}
