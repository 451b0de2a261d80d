// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background tasks owned by an active encryption session.
//!
//! Each task holds only a `Weak` reference to the service and exits when the
//! session token is cancelled (session expiry, termination or shutdown) or
//! the service is dropped. Loop bodies are awaited in place, so ticks never
//! overlap.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::service::EncryptionService;

pub(crate) fn spawn_session_tasks(
    service: &Arc<EncryptionService>,
    token: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let options = service.options();
    let mut handles = vec![tokio::spawn(idle_watcher(
        Arc::downgrade(service),
        token.clone(),
    ))];

    if let Some(interval) = options.key_rotation_interval {
        handles.push(tokio::spawn(key_rotation(
            Arc::downgrade(service),
            interval,
            token.clone(),
        )));
    }
    if let Some(interval) = options.memory_cleanup_interval {
        handles.push(tokio::spawn(memory_cleanup(
            Arc::downgrade(service),
            interval,
            token,
        )));
    }
    handles
}

/// Sleeps until the idle deadline, re-arming whenever activity moved it.
async fn idle_watcher(service: Weak<EncryptionService>, cancel: CancellationToken) {
    loop {
        let Some(deadline) = service.upgrade().and_then(|s| s.idle_deadline()) else {
            debug!("idle watcher stopped");
            return;
        };
        tokio::select! {
            _ = time::sleep_until(deadline) => {}
            _ = cancel.cancelled() => return,
        }
    }
}

async fn key_rotation(service: Weak<EncryptionService>, period: Duration, cancel: CancellationToken) {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(service) = service.upgrade() else { return };
                match service.rotate_cached_keys().await {
                    Ok(rotated) => info!(count = rotated.len(), "scheduled key rotation complete"),
                    Err(e) => warn!(error = %e, "scheduled key rotation skipped (non-fatal)"),
                }
            }
            _ = cancel.cancelled() => {
                debug!("key rotation task shutting down");
                return;
            }
        }
    }
}

async fn memory_cleanup(
    service: Weak<EncryptionService>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(service) = service.upgrade() else { return };
                service.clear_memory();
            }
            _ = cancel.cancelled() => {
                debug!("memory cleanup task shutting down");
                return;
            }
        }
    }
}
