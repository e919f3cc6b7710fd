// Copyright (c) 2025 Mailsift
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Standalone email sync worker.
//!
//! Runs the scheduler loop in its own process: every interval, sync all
//! connected accounts; log failures and keep going. Deploy this alongside
//! the API server with `SYNC_ENABLED=false` so only one scheduler runs.
//! An overlap is harmless anyway; the per-account cooldown serializes them.
//!
//! Usage:
//!   mailsift-worker                 # Sync all accounts forever
//!   mailsift-worker --once          # Run a single pass and exit
//!   mailsift-worker --interval 120  # Custom interval in seconds

use clap::Parser;
use env_logger::Env;
use log::error;
use std::time::Duration;

use mailsift::config::Settings;
use mailsift::services::scheduler;
use mailsift::{db, services};

#[derive(Parser)]
#[command(name = "mailsift-worker", about = "Standalone email sync worker")]
struct Cli {
    /// Seconds between sync passes
    #[arg(long, env = "SYNC_INTERVAL_SECONDS", default_value_t = 60)]
    interval: u64,

    /// Run a single sync pass and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = Settings::new(None).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Configuration error: {e}"),
        )
    })?;

    env_logger::Builder::from_env(Env::default().default_filter_or(settings.log.level.clone()))
        .init();

    let pool = db::connect(&settings.database.url).await.map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Database connection failed: {e}"),
        )
    })?;
    db::run_migrations(&pool).await.map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::Other, format!("Migration failed: {e}"))
    })?;

    let state = services::init(settings, pool);

    if cli.once {
        if let Err(e) = state.sync.sync_all().await {
            error!("Sync pass failed: {}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    scheduler::run_sync_loop(state.sync, Duration::from_secs(cli.interval)).await;
    Ok(())
}
