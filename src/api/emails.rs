// Copyright (c) 2025 Mailsift
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Email endpoints: listing/filtering, updates, deletion, and the
//! fire-and-forget sync-all trigger.

use actix_web::{web, HttpResponse};
use log::error;
use validator::Validate;

use crate::api::auth::AuthedUser;
use crate::api::errors::ApiError;
use crate::api::models::{
    BulkDeleteRequest, BulkDeleteResponse, EmailUpdateRequest, ListEmailsQuery, MessageResponse,
    SyncStartedResponse,
};
use crate::db;
use crate::services::AppState;

/// GET /api/v1/emails
///
/// Filters: category, account (404 when not owned), free-text search over
/// subject/body, and skip/limit pagination. Newest first.
pub async fn list_emails(
    state: web::Data<AppState>,
    AuthedUser(user): AuthedUser,
    query: web::Query<ListEmailsQuery>,
) -> Result<HttpResponse, ApiError> {
    query
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if let Some(account_id) = query.account_id {
        // Filtering by an account that is not the caller's is a 404, not an
        // empty page.
        db::accounts::find_for_user(&state.db, account_id, user.id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Account not found".to_string()))?;
    }

    let emails = db::emails::list_for_user(
        &state.db,
        user.id,
        &db::emails::EmailFilter {
            category_id: query.category_id,
            account_id: query.account_id,
            search: query.search.clone(),
            skip: query.skip,
            limit: query.limit,
        },
    )
    .await?;

    Ok(HttpResponse::Ok().json(emails))
}

/// GET /api/v1/emails/{email_id}
pub async fn get_email(
    state: web::Data<AppState>,
    AuthedUser(user): AuthedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let email = db::emails::find_for_user(&state.db, path.into_inner(), user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Email not found".to_string()))?;
    Ok(HttpResponse::Ok().json(email))
}

/// PUT /api/v1/emails/{email_id}
///
/// Updates category, summary, and archived flag only; everything else is
/// owned by the sync pipeline.
pub async fn update_email(
    state: web::Data<AppState>,
    AuthedUser(user): AuthedUser,
    path: web::Path<i64>,
    payload: web::Json<EmailUpdateRequest>,
) -> Result<HttpResponse, ApiError> {
    let email = db::emails::update_for_user(
        &state.db,
        path.into_inner(),
        user.id,
        payload.category_id,
        payload.summary.as_deref(),
        payload.is_archived,
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Email not found".to_string()))?;
    Ok(HttpResponse::Ok().json(email))
}

/// DELETE /api/v1/emails/{email_id}
pub async fn delete_email(
    state: web::Data<AppState>,
    AuthedUser(user): AuthedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let deleted = db::emails::delete_for_user(&state.db, path.into_inner(), user.id).await?;
    if !deleted {
        return Err(ApiError::NotFound("Email not found".to_string()));
    }
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Email deleted successfully".to_string(),
    }))
}

/// POST /api/v1/emails/bulk-delete
pub async fn bulk_delete(
    state: web::Data<AppState>,
    AuthedUser(user): AuthedUser,
    payload: web::Json<BulkDeleteRequest>,
) -> Result<HttpResponse, ApiError> {
    let deleted =
        db::emails::bulk_delete_for_user(&state.db, user.id, &payload.email_ids).await?;
    Ok(HttpResponse::Ok().json(BulkDeleteResponse {
        message: format!("Successfully deleted {} emails", deleted),
        deleted,
    }))
}

/// POST /api/v1/emails/sync
///
/// Fire-and-forget: kicks off a sync of all the caller's accounts in the
/// background. Accounts inside their cooldown window are skipped silently.
pub async fn sync_all_accounts(
    state: web::Data<AppState>,
    AuthedUser(user): AuthedUser,
) -> Result<HttpResponse, ApiError> {
    let accounts = db::accounts::list_for_user(&state.db, user.id).await?;
    if accounts.is_empty() {
        return Err(ApiError::BadRequest(
            "No mailbox accounts connected".to_string(),
        ));
    }

    let emails: Vec<String> = accounts.iter().map(|account| account.email.clone()).collect();

    let sync = state.sync.clone();
    let user_id = user.id;
    tokio::spawn(async move {
        if let Err(e) = sync.sync_user_accounts(user_id).await {
            error!("Background sync failed for user {}: {}", user_id, e);
        }
    });

    Ok(HttpResponse::Ok().json(SyncStartedResponse {
        message: format!("Started syncing emails for {} account(s)", emails.len()),
        accounts: emails,
    }))
}
