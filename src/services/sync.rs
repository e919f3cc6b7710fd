// Copyright (c) 2025 Mailsift
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Sync orchestrator.
//!
//! Per account: compute the watermark, pull new inbox messages, dedupe
//! against the store, persist, enrich, archive the source message, advance
//! the watermark. Accounts are processed one at a time and messages within
//! an account one at a time, because enrichment calls and mailbox writes
//! must stay ordered with respect to the single credential-refresh retry.

use chrono::{Duration, Utc};
use log::{debug, error, info};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;

use crate::db;
use crate::models::Account;
use crate::services::enrich::EnrichmentService;
use crate::services::mailbox::{MailboxClient, MailboxError};

/// Minimum wait between two sync runs for the same account.
pub const SYNC_COOLDOWN_SECS: i64 = 300;

/// When an account has never synced, look this far back.
const INITIAL_LOOKBACK_HOURS: i64 = 24;

/// Builds a mailbox client for an account. Injected so the orchestrator can
/// be exercised against a fake mailbox in tests.
pub type MailboxFactory = Arc<dyn Fn(&Account) -> Arc<dyn MailboxClient> + Send + Sync>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Synced too recently; retry in {retry_after} seconds")]
    Cooldown { retry_after: i64 },
    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of one successful account sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub new_count: u64,
}

pub struct SyncService {
    db: SqlitePool,
    enrichment: Arc<EnrichmentService>,
    mailbox_factory: MailboxFactory,
}

impl SyncService {
    pub fn new(
        db: SqlitePool,
        enrichment: Arc<EnrichmentService>,
        mailbox_factory: MailboxFactory,
    ) -> Self {
        Self {
            db,
            enrichment,
            mailbox_factory,
        }
    }

    /// Sync a single account.
    ///
    /// Any failure mid-batch aborts this account only and leaves the
    /// watermark unadvanced; already-inserted rows are covered by the dedupe
    /// key on the next pass, and archiving is idempotent on the provider.
    pub async fn sync_account(&self, account: &Account) -> Result<SyncReport, SyncError> {
        if let Some(last_sync) = account.last_sync_time {
            let elapsed = (Utc::now() - last_sync).num_seconds();
            if elapsed < SYNC_COOLDOWN_SECS {
                return Err(SyncError::Cooldown {
                    retry_after: SYNC_COOLDOWN_SECS - elapsed,
                });
            }
        }

        info!("Starting sync for {}", account.email);
        let mailbox = (self.mailbox_factory)(account);

        let since = account
            .last_sync_time
            .unwrap_or_else(|| Utc::now() - Duration::hours(INITIAL_LOOKBACK_HOURS));
        let remote_messages = mailbox.list_new_messages(since).await?;

        let categories = db::categories::list_for_user(&self.db, account.user_id).await?;
        let mut new_count = 0u64;

        for message in remote_messages {
            if db::emails::exists(&self.db, account.id, &message.id).await? {
                debug!("Skipping already stored message {}", message.id);
                continue;
            }

            let email_id = db::emails::insert_synced(
                &self.db,
                db::emails::NewEmail {
                    provider_message_id: &message.id,
                    subject: &message.subject,
                    sender: &message.sender,
                    body: &message.body,
                    received_at: message.received_at,
                    user_id: account.user_id,
                    account_id: account.id,
                },
            )
            .await?;

            debug!("Processing email '{}' with AI", message.subject);
            let enrichment = self
                .enrichment
                .enrich(&message.subject, &message.body, &categories)
                .await;
            db::emails::set_enrichment(
                &self.db,
                email_id,
                enrichment.summary.as_deref(),
                enrichment.category_id,
                enrichment.unsubscribe_link.as_deref(),
            )
            .await?;

            mailbox.archive(&message.id).await?;
            new_count += 1;
        }

        db::accounts::set_last_sync_time(&self.db, account.id, Utc::now()).await?;
        info!("Synced {} new emails for {}", new_count, account.email);

        Ok(SyncReport { new_count })
    }

    /// Sync every account belonging to one user. Per-account failures are
    /// logged and do not stop the remaining accounts.
    pub async fn sync_user_accounts(&self, user_id: i64) -> Result<(), sqlx::Error> {
        let accounts = db::accounts::list_for_user(&self.db, user_id).await?;
        self.sync_accounts(accounts).await;
        Ok(())
    }

    /// Sync every connected account (scheduler entry point).
    pub async fn sync_all(&self) -> Result<(), sqlx::Error> {
        let accounts = db::accounts::list_all(&self.db).await?;
        self.sync_accounts(accounts).await;
        Ok(())
    }

    async fn sync_accounts(&self, accounts: Vec<Account>) {
        for account in accounts {
            match self.sync_account(&account).await {
                Ok(report) => {
                    debug!("Synced {} new emails for {}", report.new_count, account.email)
                }
                Err(SyncError::Cooldown { retry_after }) => {
                    debug!(
                        "Skipping {} - too soon since last sync ({}s remaining)",
                        account.email, retry_after
                    )
                }
                Err(e) => error!("Error syncing {}: {}", account.email, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{memory_pool, seed_account, seed_category, seed_user, set_watermark};
    use crate::services::enrich::provider::{
        CompletionProvider, CompletionRequest, NoopProvider, ProviderError,
    };
    use crate::services::mailbox::RemoteMessage;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex as StdMutex;

    struct FakeMailbox {
        messages: StdMutex<Vec<RemoteMessage>>,
        archived: StdMutex<Vec<String>>,
        fail_archive: bool,
    }

    impl FakeMailbox {
        fn build(ids: &[&str], fail_archive: bool) -> Arc<Self> {
            let messages = ids
                .iter()
                .map(|id| RemoteMessage {
                    id: id.to_string(),
                    subject: format!("Subject {id}"),
                    sender: "sender@example.com".to_string(),
                    body: format!("Body of {id}"),
                    received_at: Utc::now() - chrono::Duration::minutes(5),
                })
                .collect();
            Arc::new(Self {
                messages: StdMutex::new(messages),
                archived: StdMutex::new(Vec::new()),
                fail_archive,
            })
        }

        fn with_messages(ids: &[&str]) -> Arc<Self> {
            Self::build(ids, false)
        }

        fn failing_archive(ids: &[&str]) -> Arc<Self> {
            Self::build(ids, true)
        }

        fn archived_ids(&self) -> Vec<String> {
            self.archived.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MailboxClient for FakeMailbox {
        async fn list_new_messages(
            &self,
            _since: DateTime<Utc>,
        ) -> Result<Vec<RemoteMessage>, MailboxError> {
            Ok(self.messages.lock().unwrap().clone())
        }

        async fn archive(&self, message_id: &str) -> Result<(), MailboxError> {
            if self.fail_archive {
                return Err(MailboxError::Provider {
                    status: 500,
                    detail: "archive unavailable".to_string(),
                });
            }
            self.archived.lock().unwrap().push(message_id.to_string());
            Ok(())
        }
    }

    fn factory_for(mailbox: Arc<FakeMailbox>) -> MailboxFactory {
        Arc::new(move |_account: &Account| {
            let client: Arc<dyn MailboxClient> = mailbox.clone();
            client
        })
    }

    fn service_with(
        pool: &SqlitePool,
        mailbox: Arc<FakeMailbox>,
        provider: Arc<dyn CompletionProvider>,
    ) -> SyncService {
        SyncService::new(
            pool.clone(),
            Arc::new(EnrichmentService::new(provider)),
            factory_for(mailbox),
        )
    }

    struct FixedProvider(String);

    #[async_trait]
    impl CompletionProvider for FixedProvider {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
            Ok(self.0.clone())
        }
    }

    async fn list_all_emails(pool: &SqlitePool, user_id: i64) -> Vec<crate::models::Email> {
        db::emails::list_for_user(
            pool,
            user_id,
            &db::emails::EmailFilter {
                limit: 100,
                ..Default::default()
            },
        )
        .await
        .expect("list emails")
    }

    #[tokio::test]
    async fn test_initial_sync_stores_archives_and_advances_watermark() {
        let pool = memory_pool().await;
        let user = seed_user(&pool, "a@example.com").await;
        let account = seed_account(&pool, user.id, "a@gmail.com").await;
        assert!(account.last_sync_time.is_none());

        let mailbox = FakeMailbox::with_messages(&["m1", "m2"]);
        let service = service_with(&pool, mailbox.clone(), Arc::new(NoopProvider));

        let report = service.sync_account(&account).await.expect("sync");
        assert_eq!(report.new_count, 2);

        let emails = list_all_emails(&pool, user.id).await;
        assert_eq!(emails.len(), 2);
        assert!(emails.iter().all(|email| email.is_archived));
        assert_eq!(mailbox.archived_ids().len(), 2);

        let account = db::accounts::find_by_id(&pool, account.id)
            .await
            .expect("query")
            .expect("account");
        assert!(account.last_sync_time.is_some(), "watermark advanced");
    }

    #[tokio::test]
    async fn test_overlapping_pull_dedupes_by_provider_id() {
        let pool = memory_pool().await;
        let user = seed_user(&pool, "a@example.com").await;
        let account = seed_account(&pool, user.id, "a@gmail.com").await;

        let first = FakeMailbox::with_messages(&["m1", "m2"]);
        let service = service_with(&pool, first, Arc::new(NoopProvider));
        service.sync_account(&account).await.expect("first sync");

        // Step past the cooldown, then pull an overlapping window.
        set_watermark(&pool, account.id, Utc::now() - chrono::Duration::minutes(10)).await;
        let account = db::accounts::find_by_id(&pool, account.id)
            .await
            .expect("query")
            .expect("account");

        let second = FakeMailbox::with_messages(&["m1", "m3"]);
        let service = service_with(&pool, second, Arc::new(NoopProvider));
        let report = service.sync_account(&account).await.expect("second sync");
        assert_eq!(report.new_count, 1, "only m3 is new");

        let emails = list_all_emails(&pool, user.id).await;
        assert_eq!(emails.len(), 3);
        let m1_copies = emails
            .iter()
            .filter(|email| email.provider_message_id == "m1")
            .count();
        assert_eq!(m1_copies, 1);
    }

    #[tokio::test]
    async fn test_cooldown_rejects_with_remaining_wait() {
        let pool = memory_pool().await;
        let user = seed_user(&pool, "a@example.com").await;
        let account = seed_account(&pool, user.id, "a@gmail.com").await;

        set_watermark(&pool, account.id, Utc::now() - chrono::Duration::seconds(60)).await;
        let account = db::accounts::find_by_id(&pool, account.id)
            .await
            .expect("query")
            .expect("account");

        let service = service_with(
            &pool,
            FakeMailbox::with_messages(&[]),
            Arc::new(NoopProvider),
        );

        match service.sync_account(&account).await {
            Err(SyncError::Cooldown { retry_after }) => {
                assert!((200..=SYNC_COOLDOWN_SECS).contains(&retry_after));
            }
            other => panic!("expected cooldown rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cooldown_boundary_allows_sync() {
        let pool = memory_pool().await;
        let user = seed_user(&pool, "a@example.com").await;
        let account = seed_account(&pool, user.id, "a@gmail.com").await;

        set_watermark(
            &pool,
            account.id,
            Utc::now() - chrono::Duration::seconds(SYNC_COOLDOWN_SECS + 1),
        )
        .await;
        let account = db::accounts::find_by_id(&pool, account.id)
            .await
            .expect("query")
            .expect("account");

        let service = service_with(
            &pool,
            FakeMailbox::with_messages(&[]),
            Arc::new(NoopProvider),
        );
        let report = service.sync_account(&account).await.expect("sync runs");
        assert_eq!(report.new_count, 0);
    }

    #[tokio::test]
    async fn test_enrichment_failure_still_persists_and_archives() {
        let pool = memory_pool().await;
        let user = seed_user(&pool, "a@example.com").await;
        let account = seed_account(&pool, user.id, "a@gmail.com").await;

        // Every completion call fails; sync must not care.
        let mailbox = FakeMailbox::with_messages(&["m1"]);
        let service = service_with(&pool, mailbox.clone(), Arc::new(NoopProvider));

        let report = service.sync_account(&account).await.expect("sync");
        assert_eq!(report.new_count, 1);

        let emails = list_all_emails(&pool, user.id).await;
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].summary, None);
        assert_eq!(emails[0].category_id, None);
        assert_eq!(mailbox.archived_ids(), vec!["m1".to_string()]);
    }

    #[tokio::test]
    async fn test_classification_outside_category_set_stored_as_none() {
        let pool = memory_pool().await;
        let user = seed_user(&pool, "a@example.com").await;
        let account = seed_account(&pool, user.id, "a@gmail.com").await;
        seed_category(&pool, user.id, "Newsletters").await;

        // The model answers with an id that is not among the user's
        // categories; the stored email must have no category.
        let service = service_with(
            &pool,
            FakeMailbox::with_messages(&["m1"]),
            Arc::new(FixedProvider("424242".to_string())),
        );
        service.sync_account(&account).await.expect("sync");

        let emails = list_all_emails(&pool, user.id).await;
        assert_eq!(emails[0].category_id, None);
    }

    #[tokio::test]
    async fn test_archive_failure_aborts_account_and_keeps_watermark() {
        let pool = memory_pool().await;
        let user = seed_user(&pool, "a@example.com").await;
        let account = seed_account(&pool, user.id, "a@gmail.com").await;

        let mailbox = FakeMailbox::failing_archive(&["m1"]);
        let service = service_with(&pool, mailbox, Arc::new(NoopProvider));

        let result = service.sync_account(&account).await;
        assert!(matches!(result, Err(SyncError::Mailbox(_))));

        // Watermark unadvanced: the next pass re-pulls and the dedupe key
        // prevents a duplicate insert.
        let account = db::accounts::find_by_id(&pool, account.id)
            .await
            .expect("query")
            .expect("account");
        assert!(account.last_sync_time.is_none());
    }

    #[tokio::test]
    async fn test_failing_account_does_not_block_others() {
        let pool = memory_pool().await;
        let user = seed_user(&pool, "a@example.com").await;
        let broken = seed_account(&pool, user.id, "broken@gmail.com").await;
        let healthy = seed_account(&pool, user.id, "healthy@gmail.com").await;

        let broken_mailbox = FakeMailbox::failing_archive(&["m1"]);
        let healthy_mailbox = FakeMailbox::with_messages(&["m2"]);
        let broken_id = broken.id;
        let factory: MailboxFactory = Arc::new(move |account: &Account| {
            let client: Arc<dyn MailboxClient> = if account.id == broken_id {
                broken_mailbox.clone()
            } else {
                healthy_mailbox.clone()
            };
            client
        });
        let service = SyncService::new(
            pool.clone(),
            Arc::new(EnrichmentService::new(Arc::new(NoopProvider))),
            factory,
        );

        service.sync_user_accounts(user.id).await.expect("pass");

        let emails = list_all_emails(&pool, user.id).await;
        assert_eq!(emails.iter().filter(|e| e.account_id == healthy.id).count(), 1);

        let healthy = db::accounts::find_by_id(&pool, healthy.id)
            .await
            .expect("query")
            .expect("account");
        assert!(healthy.last_sync_time.is_some());
    }
}
