// Copyright (c) 2025 Mailsift
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Enrichment engine: three independent model calls per synced email.
//!
//! Every call failure is caught and degrades to the field's empty value. An
//! enrichment problem never blocks storing or archiving the message.

pub mod provider;

use log::warn;
use std::sync::Arc;

use crate::models::Category;
use provider::{CompletionProvider, CompletionRequest, ProviderError};

/// Result of enriching one email. `None` fields mean the corresponding call
/// failed or produced nothing usable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub summary: Option<String>,
    pub category_id: Option<i64>,
    pub unsubscribe_link: Option<String>,
}

pub struct EnrichmentService {
    provider: Arc<dyn CompletionProvider>,
}

impl EnrichmentService {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    /// Run all three enrichment passes over a message.
    pub async fn enrich(&self, subject: &str, body: &str, categories: &[Category]) -> Enrichment {
        let summary = match self.summarize(body, subject).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!("Summarization failed: {}", e);
                None
            }
        };

        let category_id = match self.classify(body, categories).await {
            Ok(category_id) => category_id,
            Err(e) => {
                warn!("Classification failed: {}", e);
                None
            }
        };

        let unsubscribe_link = match self.find_unsubscribe_link(body).await {
            Ok(link) => link,
            Err(e) => {
                warn!("Unsubscribe extraction failed: {}", e);
                None
            }
        };

        Enrichment {
            summary,
            category_id,
            unsubscribe_link,
        }
    }

    /// Classify an email into one of the user's categories, or none.
    ///
    /// The model's answer is validated against the supplied set; an id it
    /// invented (or any non-numeric reply) is treated as none.
    pub async fn classify(
        &self,
        body: &str,
        categories: &[Category],
    ) -> Result<Option<i64>, ProviderError> {
        if categories.is_empty() {
            return Ok(None);
        }

        let categories_context = categories
            .iter()
            .map(|category| {
                format!(
                    "Category {}: {} - {}",
                    category.id, category.name, category.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "You are an email classifier. Your task is to classify the following email into one of these categories:\n\n\
             {categories_context}\n\n\
             The email content is:\n{body}\n\n\
             Analyze the email and choose the most appropriate category. If none of the categories fit well, return \"None\".\n\
             Only respond with the category ID number or \"None\". No other text."
        );

        let raw = self
            .provider
            .complete(&CompletionRequest {
                system: "You are a precise email classifier that only responds with category IDs or None."
                    .to_string(),
                user: prompt,
                temperature: 0.0,
                max_tokens: 10,
            })
            .await?;

        Ok(parse_category_id(&raw, categories))
    }

    /// Generate a concise 2-3 sentence summary of an email.
    pub async fn summarize(&self, body: &str, subject: &str) -> Result<String, ProviderError> {
        let prompt = format!(
            "Summarize this email concisely in 2-3 sentences. Focus on the main points and any action items.\n\n\
             Subject: {subject}\n\n\
             Content:\n{body}\n\n\
             Provide only the summary, no additional text."
        );

        let raw = self
            .provider
            .complete(&CompletionRequest {
                system: "You are a precise email summarizer that creates concise, informative summaries."
                    .to_string(),
                user: prompt,
                temperature: 0.3,
                max_tokens: 150,
            })
            .await?;

        Ok(raw.trim().to_string())
    }

    /// Find an unsubscribe link or instructions in the email, or none.
    pub async fn find_unsubscribe_link(&self, body: &str) -> Result<Option<String>, ProviderError> {
        let prompt = format!(
            "Find the unsubscribe link or instructions in this email. If found, return ONLY the complete URL or instructions. If not found, return \"None\".\n\n\
             Email content:\n{body}\n\n\
             Return only the unsubscribe URL or instructions, or \"None\". No other text."
        );

        let raw = self
            .provider
            .complete(&CompletionRequest {
                system: "You are an unsubscribe link finder that only returns URLs or None.".to_string(),
                user: prompt,
                temperature: 0.0,
                max_tokens: 100,
            })
            .await?;

        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            Ok(None)
        } else {
            Ok(Some(trimmed.to_string()))
        }
    }
}

/// Validate a classification reply against the supplied category set.
fn parse_category_id(raw: &str, categories: &[Category]) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("none") {
        return None;
    }
    let id: i64 = trimmed.parse().ok()?;
    if categories.iter().any(|category| category.id == id) {
        Some(id)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::provider::*;
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn category(id: i64, name: &str) -> Category {
        Category {
            id,
            name: name.to_string(),
            description: format!("{name} mail"),
            user_id: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Replies with a fixed string for every call.
    struct FixedProvider(String);

    #[async_trait]
    impl CompletionProvider for FixedProvider {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
            Ok(self.0.clone())
        }
    }

    /// Pops one scripted result per call, in order.
    struct ScriptedProvider(Mutex<VecDeque<Result<String, ProviderError>>>);

    impl ScriptedProvider {
        fn new(responses: Vec<Result<String, ProviderError>>) -> Self {
            Self(Mutex::new(responses.into_iter().collect()))
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
            self.0
                .lock()
                .expect("scripted provider lock")
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::BadResponse("script exhausted".to_string())))
        }
    }

    #[test]
    fn test_parse_category_id_validates_against_set() {
        let categories = vec![category(1, "Work"), category(2, "Newsletters")];

        assert_eq!(parse_category_id("2", &categories), Some(2));
        assert_eq!(parse_category_id(" 1 \n", &categories), Some(1));
        // Model invented an id that is not in the supplied set.
        assert_eq!(parse_category_id("999", &categories), None);
        assert_eq!(parse_category_id("None", &categories), None);
        assert_eq!(parse_category_id("none", &categories), None);
        assert_eq!(parse_category_id("the best category is 2", &categories), None);
        assert_eq!(parse_category_id("", &categories), None);
    }

    #[tokio::test]
    async fn test_classify_with_empty_category_set_skips_call() {
        let service = EnrichmentService::new(Arc::new(FixedProvider("1".to_string())));
        let result = service.classify("hello", &[]).await.expect("classify");
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_classify_round_trip() {
        let categories = vec![category(4, "Receipts")];
        let service = EnrichmentService::new(Arc::new(FixedProvider("4".to_string())));
        let result = service
            .classify("Your order has shipped", &categories)
            .await
            .expect("classify");
        assert_eq!(result, Some(4));
    }

    #[tokio::test]
    async fn test_summarize_trims_whitespace() {
        let service =
            EnrichmentService::new(Arc::new(FixedProvider("  A short summary.  \n".to_string())));
        let summary = service.summarize("body", "subject").await.expect("summarize");
        assert_eq!(summary, "A short summary.");
    }

    #[tokio::test]
    async fn test_find_unsubscribe_link_none_reply() {
        let service = EnrichmentService::new(Arc::new(FixedProvider("None".to_string())));
        let link = service.find_unsubscribe_link("body").await.expect("extract");
        assert_eq!(link, None);
    }

    #[tokio::test]
    async fn test_enrich_degrades_field_by_field() {
        // Summary call fails; classification and unsubscribe succeed.
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::Unavailable("boom".to_string())),
            Ok("7".to_string()),
            Ok("https://example.com/unsubscribe".to_string()),
        ]);
        let service = EnrichmentService::new(Arc::new(provider));
        let categories = vec![category(7, "Newsletters")];

        let enrichment = service.enrich("subject", "body", &categories).await;
        assert_eq!(enrichment.summary, None);
        assert_eq!(enrichment.category_id, Some(7));
        assert_eq!(
            enrichment.unsubscribe_link.as_deref(),
            Some("https://example.com/unsubscribe")
        );
    }

    #[tokio::test]
    async fn test_enrich_with_unconfigured_provider_yields_empty_fields() {
        let service = EnrichmentService::new(Arc::new(NoopProvider));
        let categories = vec![category(1, "Work")];

        let enrichment = service.enrich("subject", "body", &categories).await;
        assert_eq!(enrichment, Enrichment::default());
    }
}
