// Copyright (c) 2025 Mailsift
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Chat-completion providers backing the enrichment engine.

use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Get OpenAI API base URL from environment or use default
fn get_base_url() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
}

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Completion provider is not configured")]
    NotConfigured,
    #[error("Completion service unavailable: {0}")]
    Unavailable(String),
    #[error("Unusable completion response: {0}")]
    BadResponse(String),
}

/// A single system+user completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}

// --- OpenAI Specific Request/Response Structs ---

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Clone)]
pub struct OpenAiProvider {
    api_key: String,
    http_client: Client,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, http_client: Client) -> Self {
        Self {
            api_key,
            http_client,
            model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string()),
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let chat_url = format!("{}/chat/completions", get_base_url());

        let payload = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user.clone(),
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(
            "Sending completion request: model={}, max_tokens={}",
            payload.model, payload.max_tokens
        );

        let response = self
            .http_client
            .post(&chat_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            error!("Completion API request failed with status {}: {}", status, error_body);
            return Err(ProviderError::Unavailable(format!(
                "status {}: {}",
                status, error_body
            )));
        }

        let response_body = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| ProviderError::BadResponse(format!("deserialize: {}", e)))?;

        match response_body.choices.first() {
            Some(choice) => Ok(choice.message.content.clone()),
            None => {
                warn!("Completion response did not contain any choices");
                Err(ProviderError::BadResponse(
                    "response was empty or missing choices".to_string(),
                ))
            }
        }
    }
}

/// Stand-in provider when no API key is configured. Every call fails, which
/// the enrichment engine degrades to empty fields.
#[derive(Debug, Clone, Copy)]
pub struct NoopProvider;

#[async_trait]
impl CompletionProvider for NoopProvider {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
        Err(ProviderError::NotConfigured)
    }
}
