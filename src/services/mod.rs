// Mailsift services
//
// This module contains the core services behind the API:
// - OAuth handshake and token refresh
// - Mailbox access (Gmail REST)
// - AI enrichment
// - Sync orchestration and scheduling

pub mod enrich;
pub mod mailbox;
pub mod oauth;
pub mod scheduler;
pub mod sync;

// Re-export main service types for convenience
pub use enrich::EnrichmentService;
pub use oauth::OAuthService;
pub use sync::{SyncService, MailboxFactory};

use log::{info, warn};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::Settings;
use enrich::provider::{CompletionProvider, NoopProvider, OpenAiProvider};
use mailbox::{GmailClient, MailboxClient};

/// Shared application state handed to every request handler. All service
/// handles are constructed here and passed in explicitly.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub settings: Arc<Settings>,
    pub oauth: Arc<OAuthService>,
    pub sync: Arc<SyncService>,
}

/// Initialize the services from configuration.
pub fn init(settings: Settings, db: SqlitePool) -> AppState {
    info!("Initializing services");

    let settings = Arc::new(settings);

    let google = settings.google();
    if google.is_none() {
        warn!("Google OAuth is not configured. Set GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET to enable mailbox linking.");
    }
    let oauth = Arc::new(OAuthService::new(google));

    let provider: Arc<dyn CompletionProvider> = match settings.openai_api_key.as_deref() {
        Some(key) if !key.is_empty() => {
            info!("Using OpenAI completion provider");
            Arc::new(OpenAiProvider::new(key.to_string(), reqwest::Client::new()))
        }
        _ => {
            warn!("No OPENAI_API_KEY found. Synced emails will be stored without summaries or categories.");
            Arc::new(NoopProvider)
        }
    };
    let enrichment = Arc::new(EnrichmentService::new(provider));

    let mailbox_factory: MailboxFactory = {
        let db = db.clone();
        let oauth = oauth.clone();
        Arc::new(move |account| {
            let client: Arc<dyn MailboxClient> =
                Arc::new(GmailClient::for_account(db.clone(), oauth.clone(), account));
            client
        })
    };

    let sync = Arc::new(SyncService::new(db.clone(), enrichment, mailbox_factory));

    AppState {
        db,
        settings,
        oauth,
        sync,
    }
}
