// Copyright (c) 2025 Mailsift
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Fixed-interval scheduler driving the sync orchestrator.

use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::services::sync::SyncService;

/// Run the sync loop forever: one pass over every account, then sleep.
/// Per-iteration errors are logged and never terminate the loop.
pub async fn run_sync_loop(sync: Arc<SyncService>, period: Duration) {
    info!(
        "Starting email sync loop ({}-second intervals)",
        period.as_secs()
    );

    let mut interval = time::interval(period);
    loop {
        interval.tick().await;
        if let Err(e) = sync.sync_all().await {
            error!("Error in sync pass: {}", e);
        }
    }
}

/// Spawn the sync loop as a background task inside the current runtime.
pub fn start_background_sync(
    sync: Arc<SyncService>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_sync_loop(sync, period))
}
