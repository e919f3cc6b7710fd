// Copyright (c) 2025 Mailsift
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Connected mailbox account endpoints, including the single-account sync
//! trigger with its cooldown handling.

use actix_web::{web, HttpResponse};
use log::error;

use crate::api::auth::AuthedUser;
use crate::api::errors::ApiError;
use crate::api::models::{MessageResponse, SyncResultResponse};
use crate::db;
use crate::services::sync::SyncError;
use crate::services::AppState;

/// GET /api/v1/accounts
pub async fn list_accounts(
    state: web::Data<AppState>,
    AuthedUser(user): AuthedUser,
) -> Result<HttpResponse, ApiError> {
    let accounts = db::accounts::list_for_user(&state.db, user.id).await?;
    Ok(HttpResponse::Ok().json(accounts))
}

/// GET /api/v1/accounts/{account_id}
pub async fn get_account(
    state: web::Data<AppState>,
    AuthedUser(user): AuthedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let account = db::accounts::find_for_user(&state.db, path.into_inner(), user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found".to_string()))?;
    Ok(HttpResponse::Ok().json(account))
}

/// DELETE /api/v1/accounts/{account_id}
///
/// Disconnect a mailbox. Stored emails for the account cascade away.
pub async fn delete_account(
    state: web::Data<AppState>,
    AuthedUser(user): AuthedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let deleted = db::accounts::delete_for_user(&state.db, path.into_inner(), user.id).await?;
    if !deleted {
        return Err(ApiError::NotFound("Account not found".to_string()));
    }
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Account disconnected".to_string(),
    }))
}

/// POST /api/v1/accounts/{account_id}/sync
///
/// Sync one account now. Inside the cooldown window this is a 429 carrying
/// the remaining wait in both the body and a Retry-After header.
pub async fn sync_account(
    state: web::Data<AppState>,
    AuthedUser(user): AuthedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let account = db::accounts::find_for_user(&state.db, path.into_inner(), user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found".to_string()))?;

    match state.sync.sync_account(&account).await {
        Ok(report) => Ok(HttpResponse::Ok().json(SyncResultResponse {
            message: format!(
                "Successfully synced {} new emails for {}",
                report.new_count, account.email
            ),
            new_count: report.new_count,
        })),
        Err(SyncError::Cooldown { retry_after }) => Err(ApiError::RateLimited { retry_after }),
        Err(e) => {
            error!("Sync failed for {}: {}", account.email, e);
            Err(ApiError::InternalError(format!("Failed to sync emails: {}", e)))
        }
    }
}
