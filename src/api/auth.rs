//! Session token issuing/verification and the authenticated-user extractor.
//!
//! Tokens are compact two-segment strings:
//! `base64url(claims json) . base64url(sha256(secret . "." . payload))`.
//! The claims carry the user id and an expiry; anything that fails to parse,
//! verify, or is past expiry is rejected as unauthorized.

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine as _};
use chrono::{Duration, Utc};
use futures_util::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::api::errors::ApiError;
use crate::db;
use crate::models::User;
use crate::services::AppState;

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    /// User id.
    sub: i64,
    /// Expiry as a Unix timestamp (seconds).
    exp: i64,
}

/// Issue a signed session token for a user.
pub fn create_session_token(
    user_id: i64,
    secret: &str,
    ttl_days: i64,
) -> Result<String, ApiError> {
    let claims = SessionClaims {
        sub: user_id,
        exp: (Utc::now() + Duration::days(ttl_days)).timestamp(),
    };
    let payload = serde_json::to_vec(&claims)
        .map_err(|e| ApiError::InternalError(format!("Failed to encode session claims: {}", e)))?;
    let payload_b64 = BASE64URL.encode(payload);
    let signature = sign(&payload_b64, secret);
    Ok(format!("{payload_b64}.{signature}"))
}

/// Verify a session token and return the user id it was issued for.
pub fn verify_session_token(token: &str, secret: &str) -> Result<i64, ApiError> {
    let (payload_b64, signature) = token
        .split_once('.')
        .ok_or_else(|| ApiError::Unauthorized("Malformed session token".to_string()))?;

    if sign(payload_b64, secret) != signature {
        return Err(ApiError::Unauthorized("Invalid session token".to_string()));
    }

    let payload = BASE64URL
        .decode(payload_b64)
        .map_err(|_| ApiError::Unauthorized("Malformed session token".to_string()))?;
    let claims: SessionClaims = serde_json::from_slice(&payload)
        .map_err(|_| ApiError::Unauthorized("Malformed session token".to_string()))?;

    if claims.exp <= Utc::now().timestamp() {
        return Err(ApiError::Unauthorized("Session expired".to_string()));
    }

    Ok(claims.sub)
}

fn sign(payload_b64: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b".");
    hasher.update(payload_b64.as_bytes());
    BASE64URL.encode(hasher.finalize())
}

/// Extractor for the authenticated user behind `Authorization: Bearer`.
#[derive(Debug, Clone)]
pub struct AuthedUser(pub User);

impl FromRequest for AuthedUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let header_value = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        Box::pin(async move {
            let state = state.ok_or_else(|| {
                ApiError::InternalError("Application state is not configured".to_string())
            })?;
            let header_value = header_value.ok_or_else(|| {
                ApiError::Unauthorized("Missing Authorization header".to_string())
            })?;

            let token = header_value
                .strip_prefix("Bearer ")
                .or_else(|| header_value.strip_prefix("bearer "))
                .ok_or_else(|| {
                    ApiError::Unauthorized("Authorization header must use Bearer scheme".to_string())
                })?;

            let user_id = verify_session_token(token, &state.settings.auth.secret_key)?;
            let user = db::users::find_by_id(&state.db, user_id)
                .await?
                .ok_or_else(|| ApiError::Unauthorized("Unknown user".to_string()))?;

            Ok(AuthedUser(user))
        })
    }
}
