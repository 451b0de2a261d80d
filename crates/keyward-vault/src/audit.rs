// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only audit trail kept in the blob store.
//!
//! Recording is best effort: a failed write is logged and swallowed so it
//! never fails the operation being audited. Entries never carry secrets.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use keyward_core::{KeyValueStore, KeywardError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;
use tracing::warn;

/// Key prefix of audit entries.
pub const AUDIT_PREFIX: &str = "audit:";

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditEvent {
    Create,
    Access,
    Update,
    Delete,
    Rotate,
    RotationRollback,
    UsageRecorded,
    ConnectionTest,
    Export,
    Import,
    Migration,
    IntegrityFailure,
    OperationFailed,
}

/// One persisted audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    pub event: AuditEvent,
    #[serde(default)]
    pub subject_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: Value,
}

/// Orders entries written within the same millisecond.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Writes audit entries under `audit:<millis>-<seq>-<uuid>`. The zero-padded
/// prefix makes key order chronological.
#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn KeyValueStore>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Record `event`. Never fails.
    pub async fn record(&self, event: AuditEvent, subject_id: Option<&str>, details: Value) {
        let timestamp = Utc::now();
        let id = format!(
            "{:020}-{:010}-{}",
            timestamp.timestamp_millis().max(0),
            SEQUENCE.fetch_add(1, Ordering::Relaxed) % 10_000_000_000,
            uuid::Uuid::new_v4()
        );
        let entry = AuditLogEntry {
            id: id.clone(),
            event,
            subject_id: subject_id.map(str::to_string),
            timestamp,
            details,
        };

        let value = match serde_json::to_value(&entry) {
            Ok(value) => value,
            Err(e) => {
                warn!(%event, error = %e, "failed to encode audit entry");
                return;
            }
        };
        if let Err(e) = self.store.set(&format!("{AUDIT_PREFIX}{id}"), value).await {
            warn!(%event, error = %e, "failed to write audit entry");
        }
    }

    /// The newest `limit` entries, newest first. Unreadable entries are
    /// skipped.
    pub async fn recent(&self, limit: usize) -> Result<Vec<AuditLogEntry>, KeywardError> {
        let keys = self.store.list_keys(AUDIT_PREFIX).await?;
        let newest: Vec<String> = keys.into_iter().rev().take(limit).collect();
        let mut found = self.store.get_batch(&newest).await?;

        let mut entries = Vec::with_capacity(newest.len());
        for key in &newest {
            let Some(value) = found.remove(key) else {
                continue;
            };
            match serde_json::from_value::<AuditLogEntry>(value) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(key = %key, error = %e, "skipping unreadable audit entry"),
            }
        }
        Ok(entries)
    }
}
