use config::{Environment, File};
use log::warn;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

use crate::services::oauth::GoogleConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret used to sign session tokens. Required; no default.
    pub secret_key: String,
    pub session_ttl_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendConfig {
    /// Origin of the frontend, used for CORS and OAuth redirects.
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Run the periodic sync loop inside the API server process.
    /// Disable when deploying the standalone `mailsift-worker` binary.
    pub enabled: bool,
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub log: LogConfig,
    pub auth: AuthConfig,
    pub frontend: FrontendConfig,
    pub sync: SyncConfig,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub google_redirect_uri: String,
    pub openai_api_key: Option<String>,
}

impl Settings {
    pub fn new(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut config_builder = config::Config::builder()
            // Server defaults
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            // Database defaults
            .set_default("database.url", "sqlite:data/mailsift.db")?
            // Session defaults
            .set_default("auth.session_ttl_days", 7)?
            // Frontend defaults
            .set_default("frontend.url", "http://localhost:4200")?
            // Sync defaults
            .set_default("sync.enabled", true)?
            .set_default("sync.interval_seconds", 60)?
            .set_default(
                "google_redirect_uri",
                "http://localhost:8080/api/v1/auth/google/callback",
            )?
            // Log defaults
            .set_default("log.level", "info")?;

        // Add configuration from file
        if let Some(path) = config_path {
            config_builder = config_builder.add_source(File::with_name(path));
        }

        // Add environment variables with prefix
        // e.g. `MAILSIFT_SERVER_PORT=...` would override `server.port`
        config_builder = config_builder.add_source(
            Environment::with_prefix("MAILSIFT")
                .separator("_")
                .ignore_empty(true),
        );

        // Add direct environment variables for deployment-critical settings
        // e.g. `DATABASE_URL=...` would override `database.url`
        let env_vars = [
            ("DATABASE_URL", "database.url"),
            ("SECRET_KEY", "auth.secret_key"),
            ("FRONTEND_URL", "frontend.url"),
            ("GOOGLE_CLIENT_ID", "google_client_id"),
            ("GOOGLE_CLIENT_SECRET", "google_client_secret"),
            ("GOOGLE_REDIRECT_URI", "google_redirect_uri"),
            ("OPENAI_API_KEY", "openai_api_key"),
            ("SERVER_HOST", "server.host"),
            ("SERVER_PORT", "server.port"),
            ("SYNC_ENABLED", "sync.enabled"),
            ("SYNC_INTERVAL_SECONDS", "sync.interval_seconds"),
        ];

        for (env_var, config_path) in &env_vars {
            if let Ok(value) = env::var(env_var) {
                if value.is_empty() {
                    continue;
                }
                if *env_var == "SERVER_PORT" {
                    if let Ok(port) = value.parse::<u16>() {
                        config_builder = config_builder.set_override(*config_path, i64::from(port))?;
                    } else {
                        warn!("Invalid port value in {}: {}", env_var, value);
                    }
                } else if *env_var == "SYNC_INTERVAL_SECONDS" {
                    if let Ok(secs) = value.parse::<i64>() {
                        config_builder = config_builder.set_override(*config_path, secs)?;
                    } else {
                        warn!("Invalid interval value in {}: {}", env_var, value);
                    }
                } else if *env_var == "SYNC_ENABLED" {
                    if let Ok(enabled) = value.parse::<bool>() {
                        config_builder = config_builder.set_override(*config_path, enabled)?;
                    } else {
                        warn!("Invalid boolean value in {}: {}", env_var, value);
                    }
                } else {
                    config_builder = config_builder.set_override(*config_path, value)?;
                }
            }
        }

        config_builder.build()?.try_deserialize()
    }

    /// Google OAuth configuration, when both client credentials are present.
    pub fn google(&self) -> Option<GoogleConfig> {
        let client_id = self.google_client_id.clone().filter(|s| !s.is_empty())?;
        let client_secret = self.google_client_secret.clone().filter(|s| !s.is_empty())?;
        Some(GoogleConfig::new(
            client_id,
            client_secret,
            self.google_redirect_uri.clone(),
        ))
    }
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load or parse configuration: {0}")]
    LoadError(#[from] config::ConfigError),
}
