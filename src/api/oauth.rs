// Copyright (c) 2025 Mailsift
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! OAuth2 API endpoints for Google mailbox linking.
//!
//! Two flows share one exchange path: a login (find-or-create the user by
//! the Google identity's email) and connecting an additional mailbox to an
//! already authenticated user. The `state` generated by the authorize
//! endpoint remembers which flow started the handshake.

use actix_web::{http::header, web, HttpResponse};
use chrono::{Duration, Utc};
use log::{error, info};
use serde_json::Value;

use crate::api::auth::{create_session_token, AuthedUser};
use crate::api::errors::ApiError;
use crate::api::models::{AuthUrlQuery, AuthUrlResponse, ExchangeCodeRequest, OAuthCallbackQuery};
use crate::db;
use crate::services::oauth::{decode_id_token, AuthIntent};
use crate::services::AppState;

/// GET /api/v1/auth/google-auth-url
///
/// Returns the Google OAuth2 authorization URL for the frontend to redirect
/// to. With `connect_account=true` the flow links an additional mailbox to
/// the authenticated caller.
pub async fn google_auth_url(
    state: web::Data<AppState>,
    query: web::Query<AuthUrlQuery>,
    user: Option<AuthedUser>,
) -> Result<HttpResponse, ApiError> {
    let intent = if query.connect_account {
        let AuthedUser(user) = user.ok_or_else(|| {
            ApiError::Unauthorized("Connecting an account requires a session".to_string())
        })?;
        AuthIntent::Connect { user_id: user.id }
    } else {
        AuthIntent::Login
    };

    let (url, _state) = state.oauth.authorize_url(intent).await?;
    Ok(HttpResponse::Ok().json(AuthUrlResponse { url }))
}

/// GET /api/v1/auth/google/callback
///
/// Browser redirect target for Google. Runs the exchange and bounces the
/// result (or the error) to the frontend as query parameters.
pub async fn google_callback(
    state: web::Data<AppState>,
    query: web::Query<OAuthCallbackQuery>,
) -> HttpResponse {
    let frontend = state.settings.frontend.url.trim_end_matches('/').to_string();

    if let Some(error) = &query.error {
        error!("Google OAuth callback error: {}", error);
        return redirect_with_error(&frontend, error);
    }

    let (code, oauth_state) = match (&query.code, &query.state) {
        (Some(code), Some(oauth_state)) => (code, oauth_state),
        _ => return redirect_with_error(&frontend, "Missing code or state parameter"),
    };

    match handle_exchange(&state, oauth_state, code).await {
        Ok(result) => {
            let params = result
                .as_object()
                .map(|fields| {
                    fields
                        .iter()
                        .map(|(key, value)| {
                            format!("{}={}", key, urlencoding::encode(&plain_value(value)))
                        })
                        .collect::<Vec<_>>()
                        .join("&")
                })
                .unwrap_or_default();
            HttpResponse::Found()
                .insert_header((header::LOCATION, format!("{frontend}/auth/callback?{params}")))
                .finish()
        }
        Err(e) => redirect_with_error(&frontend, &e.to_string()),
    }
}

/// POST /api/v1/auth/exchange-code
///
/// Same exchange as the callback, called by the frontend with a JSON body
/// when it receives the redirect itself.
pub async fn exchange_code(
    state: web::Data<AppState>,
    payload: web::Json<ExchangeCodeRequest>,
) -> Result<HttpResponse, ApiError> {
    let result = handle_exchange(&state, &payload.state, &payload.code).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// GET /api/v1/auth/me
pub async fn me(AuthedUser(user): AuthedUser) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(user))
}

/// Common exchange logic for the callback and exchange-code endpoints.
///
/// No partial state is committed on failure: the user/account writes happen
/// only after the token exchange and identity decoding both succeed.
async fn handle_exchange(
    state: &web::Data<AppState>,
    oauth_state: &str,
    code: &str,
) -> Result<Value, ApiError> {
    let (tokens, intent) = state.oauth.exchange_code(oauth_state, code).await?;

    let identity = tokens
        .id_token
        .as_deref()
        .and_then(decode_id_token)
        .ok_or_else(|| {
            ApiError::Upstream("Token response carried no usable identity".to_string())
        })?;

    let user = match intent {
        AuthIntent::Connect { user_id } => db::users::find_by_id(&state.db, user_id)
            .await?
            .ok_or_else(|| ApiError::BadRequest("Unknown user for connect flow".to_string()))?,
        AuthIntent::Login => match db::users::find_by_email(&state.db, &identity.email).await? {
            Some(user) => user,
            None => {
                info!("Creating user for {}", identity.email);
                db::users::create(&state.db, &identity.email).await?
            }
        },
    };

    let token_expiry = Utc::now() + Duration::seconds(tokens.expires_in as i64);

    let account = match db::accounts::find_by_provider_id(&state.db, &identity.sub).await? {
        Some(existing) if existing.user_id == user.id => {
            // Same user reconnecting: just refresh the stored credentials.
            db::accounts::update_tokens(
                &state.db,
                existing.id,
                &tokens.access_token,
                tokens.refresh_token.as_deref(),
                token_expiry,
            )
            .await?;
            existing
        }
        Some(_) => {
            return Err(ApiError::BadRequest(
                "This mailbox account is already connected to another user".to_string(),
            ))
        }
        None => {
            db::accounts::create(
                &state.db,
                db::accounts::NewAccount {
                    email: identity.email.clone(),
                    provider_id: identity.sub.clone(),
                    access_token: tokens.access_token.clone(),
                    refresh_token: tokens.refresh_token.clone(),
                    token_expiry,
                    user_id: user.id,
                },
            )
            .await?
        }
    };

    info!("Mailbox account {} linked to user {}", account.email, user.id);

    match intent {
        AuthIntent::Connect { .. } => Ok(serde_json::json!({
            "message": "Mailbox account connected successfully",
            "account_id": account.id,
        })),
        AuthIntent::Login => {
            let session_token = create_session_token(
                user.id,
                &state.settings.auth.secret_key,
                state.settings.auth.session_ttl_days,
            )?;
            Ok(serde_json::json!({
                "access_token": session_token,
                "token_type": "bearer",
                "account_id": account.id,
            }))
        }
    }
}

fn redirect_with_error(frontend: &str, message: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((
            header::LOCATION,
            format!("{frontend}/auth/callback?error={}", urlencoding::encode(message)),
        ))
        .finish()
}

/// Render a JSON scalar without the quoting `Value::to_string` adds.
fn plain_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
