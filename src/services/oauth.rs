// Copyright (c) 2025 Mailsift
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! OAuth2 service for the Google authorization code flow.
//!
//! Handles:
//! - Generating authorization URLs with a random `state`
//! - Exchanging authorization codes for tokens
//! - Refreshing expired access tokens
//!
//! The `state` parameter doubles as the carrier of flow intent: it is the key
//! into a pending-authorization map that remembers whether the handshake was
//! started as a login or to connect an additional mailbox to an existing user.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine as _};
use log::{debug, error, info};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Google OAuth2 authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google OAuth2 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Required scopes: identify the user and read/modify their inbox.
pub const GOOGLE_SCOPES: &[&str] = &[
    "openid",
    "email",
    "https://www.googleapis.com/auth/gmail.modify",
];

/// Errors from OAuth2 operations.
#[derive(Error, Debug)]
pub enum OAuthError {
    #[error("Google OAuth is not configured")]
    NotConfigured,
    #[error("No pending authorization for state: {0}")]
    NoPendingAuth(String),
    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),
    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Google OAuth client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Full redirect URI registered with Google.
    pub redirect_uri: String,
    /// Endpoint overrides, used by tests. Production uses the Google URLs.
    pub auth_url: String,
    pub token_url: String,
}

impl GoogleConfig {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }
}

/// Token response from the Google OAuth2 token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// The Google identity carried in an id token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleIdentity {
    /// Google's stable subject identifier.
    pub sub: String,
    pub email: String,
}

/// Why the OAuth handshake was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthIntent {
    /// First login (or returning login): find or create the user by email.
    Login,
    /// Connect an additional mailbox to an already authenticated user.
    Connect { user_id: i64 },
}

/// Pending authorization data stored between the authorize redirect and callback.
#[derive(Debug, Clone)]
struct PendingAuth {
    intent: AuthIntent,
}

/// OAuth2 service managing the Google authorization code flow.
pub struct OAuthService {
    config: Option<GoogleConfig>,
    http_client: reqwest::Client,
    /// Map from state parameter → pending auth data (in-memory, short-lived).
    pending_auths: Arc<Mutex<HashMap<String, PendingAuth>>>,
}

impl OAuthService {
    pub fn new(config: Option<GoogleConfig>) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
            pending_auths: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns true if Google OAuth is configured.
    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    /// Generate a Google OAuth2 authorization URL.
    ///
    /// Returns `(authorization_url, state)`. The state correlates the
    /// callback with this request and carries the flow intent.
    pub async fn authorize_url(&self, intent: AuthIntent) -> Result<(String, String), OAuthError> {
        let config = self.config.as_ref().ok_or(OAuthError::NotConfigured)?;

        let state = generate_random_string(32);
        {
            let mut pending = self.pending_auths.lock().await;
            pending.insert(state.clone(), PendingAuth { intent });
        }

        let scopes = GOOGLE_SCOPES.join(" ");
        let auth_url = format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&scope={}&state={}&access_type=offline&prompt=consent",
            config.auth_url,
            urlencoding::encode(&config.client_id),
            urlencoding::encode(&config.redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(&state),
        );

        debug!("Generated Google OAuth2 authorization URL (state={})", &state[..8]);
        Ok((auth_url, state))
    }

    /// Exchange an authorization code for tokens.
    ///
    /// `state` and `code` come from the OAuth callback query parameters. The
    /// pending authorization is consumed whether or not the exchange succeeds.
    pub async fn exchange_code(
        &self,
        state: &str,
        code: &str,
    ) -> Result<(OAuthTokenResponse, AuthIntent), OAuthError> {
        let config = self.config.as_ref().ok_or(OAuthError::NotConfigured)?;

        let pending = {
            let mut pending_map = self.pending_auths.lock().await;
            pending_map
                .remove(state)
                .ok_or_else(|| OAuthError::NoPendingAuth(state.to_string()))?
        };

        let params = [
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        info!("Exchanging authorization code for tokens");

        let response = self
            .http_client
            .post(&config.token_url)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Token exchange failed: HTTP {} - {}", status, body);
            return Err(OAuthError::TokenExchangeFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let token_response: OAuthTokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::TokenExchangeFailed(format!("JSON parse: {}", e)))?;

        info!("Successfully exchanged authorization code for tokens");
        Ok((token_response, pending.intent))
    }

    /// Refresh an access token using a refresh token.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<OAuthTokenResponse, OAuthError> {
        let config = self.config.as_ref().ok_or(OAuthError::NotConfigured)?;

        let params = [
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        debug!("Refreshing Google OAuth2 access token");

        let response = self
            .http_client
            .post(&config.token_url)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Token refresh failed: HTTP {} - {}", status, body);
            return Err(OAuthError::TokenRefreshFailed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let token_response: OAuthTokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::TokenRefreshFailed(format!("JSON parse: {}", e)))?;

        info!("Successfully refreshed Google OAuth2 access token");
        Ok(token_response)
    }
}

/// Extract the Google identity (`sub`, `email`) from an id token.
///
/// Id tokens are JWTs with 3 base64url-encoded segments. We decode the
/// payload (segment 1) without verifying the signature; the token arrived
/// directly from Google's token endpoint over TLS.
pub fn decode_id_token(id_token: &str) -> Option<GoogleIdentity> {
    let parts: Vec<&str> = id_token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    let payload_b64 = parts[1].trim_end_matches('=');
    let decoded = BASE64URL.decode(payload_b64).ok()?;
    let payload: serde_json::Value = serde_json::from_slice(&decoded).ok()?;

    let sub = payload.get("sub")?.as_str()?.to_string();
    let email = payload.get("email")?.as_str()?.to_string();
    Some(GoogleIdentity { sub, email })
}

/// Generate a cryptographically random URL-safe string of the given byte length.
fn generate_random_string(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64URL.encode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GoogleConfig {
        GoogleConfig {
            client_id: "test-client-id".to_string(),
            client_secret: "test-secret".to_string(),
            redirect_uri: "http://localhost:8080/api/v1/auth/google/callback".to_string(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            // Nothing listens here; exchanges fail fast without leaving the host.
            token_url: "http://127.0.0.1:9/token".to_string(),
        }
    }

    /// Build a fake JWT with the given JSON payload (no real signature).
    fn fake_jwt(payload_json: &str) -> String {
        let header = BASE64URL.encode(b"{\"alg\":\"none\"}");
        let payload = BASE64URL.encode(payload_json.as_bytes());
        format!("{}.{}.sig", header, payload)
    }

    #[test]
    fn test_decode_id_token() {
        let jwt = fake_jwt(r#"{"sub":"108234","email":"user@gmail.com","aud":"x"}"#);
        let identity = decode_id_token(&jwt).expect("identity");
        assert_eq!(identity.sub, "108234");
        assert_eq!(identity.email, "user@gmail.com");
    }

    #[test]
    fn test_decode_id_token_missing_email() {
        let jwt = fake_jwt(r#"{"sub":"108234"}"#);
        assert_eq!(decode_id_token(&jwt), None);
    }

    #[test]
    fn test_decode_id_token_invalid() {
        assert_eq!(decode_id_token("not-a-jwt"), None);
        assert_eq!(decode_id_token(""), None);
    }

    #[test]
    fn test_generate_random_string_uniqueness() {
        let s1 = generate_random_string(32);
        let s2 = generate_random_string(32);
        assert_ne!(s1, s2);
        // 32 bytes base64url encoded = 43 chars
        assert_eq!(s1.len(), 43);
    }

    #[tokio::test]
    async fn test_not_configured() {
        let service = OAuthService::new(None);
        assert!(!service.is_configured());

        let result = service.authorize_url(AuthIntent::Login).await;
        assert!(matches!(result.unwrap_err(), OAuthError::NotConfigured));
    }

    #[tokio::test]
    async fn test_authorize_url_format() {
        let service = OAuthService::new(Some(test_config()));

        let (url, state) = service
            .authorize_url(AuthIntent::Connect { user_id: 7 })
            .await
            .unwrap();

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("client_id=test-client-id"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("gmail.modify"));
        assert!(url.contains(urlencoding::encode(&state).as_ref()));
    }

    #[tokio::test]
    async fn test_exchange_code_unknown_state() {
        let service = OAuthService::new(Some(test_config()));

        let result = service.exchange_code("nonexistent-state", "some-code").await;
        assert!(matches!(result.unwrap_err(), OAuthError::NoPendingAuth(_)));
    }

    #[tokio::test]
    async fn test_pending_auth_consumed_on_exchange() {
        let service = OAuthService::new(Some(test_config()));

        let (_url, state) = service.authorize_url(AuthIntent::Login).await.unwrap();

        {
            let pending = service.pending_auths.lock().await;
            assert!(pending.contains_key(&state));
        }

        // The exchange fails (nothing listens on the test endpoint) but must
        // still consume the pending auth.
        let result = service.exchange_code(&state, "fake-code").await;
        assert!(result.is_err());

        {
            let pending = service.pending_auths.lock().await;
            assert!(!pending.contains_key(&state));
        }
    }
}
