// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-time migration of plaintext `apikey:<name>` entries into encrypted
//! credential records.
//!
//! Runs at startup after the session is unlocked. Each legacy entry goes
//! through the normal add path and is removed once its encrypted record is
//! stored. Failures are reported per entry and never abort the run.

use keyward_core::{KeywardError, Provider};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::audit::AuditEvent;
use crate::record::{NewCredential, STORAGE_VERSION};
use crate::vault::CredentialVault;

/// Key prefix of pre-encryption entries.
pub const LEGACY_PREFIX: &str = "apikey:";

/// Blob-store key holding the last completed migration version.
pub const MIGRATION_VERSION_KEY: &str = "migration:version";

/// Report of what the migration did.
#[derive(Debug, Default, PartialEq)]
pub struct MigrationReport {
    /// Legacy names stored as encrypted credentials.
    pub migrated: Vec<String>,
    /// Legacy names left alone or already present in the vault.
    pub skipped: Vec<String>,
    /// Non-fatal problems, one per affected entry.
    pub warnings: Vec<String>,
}

/// A legacy entry: either the bare key or an object describing it.
#[derive(Deserialize)]
#[serde(untagged)]
enum LegacyEntry {
    Bare(String),
    Described {
        key: String,
        #[serde(default)]
        provider: Option<Provider>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        tags: Vec<String>,
    },
}

impl LegacyEntry {
    fn into_credential(self, label: &str) -> NewCredential {
        match self {
            Self::Bare(key) => NewCredential::new(key, label),
            Self::Described {
                key,
                provider,
                name,
                description,
                tags,
            } => {
                let mut input = NewCredential::new(key, name.unwrap_or_else(|| label.to_string()))
                    .with_tags(tags);
                input.provider = provider;
                input.description = description;
                input
            }
        }
    }
}

/// Encrypt every legacy entry, then record [`STORAGE_VERSION`] under
/// `migration:version`. Does nothing when that version is already current.
pub async fn migrate_legacy(vault: &CredentialVault) -> Result<MigrationReport, KeywardError> {
    vault.encryption().ensure_active()?;
    let kv = vault.kv();
    let mut report = MigrationReport::default();

    let completed = kv
        .get(MIGRATION_VERSION_KEY)
        .await?
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    if completed >= u64::from(STORAGE_VERSION) {
        info!(version = completed, "storage layout is current; nothing to migrate");
        return Ok(report);
    }

    for key in kv.list_keys(LEGACY_PREFIX).await? {
        let label = key.strip_prefix(LEGACY_PREFIX).unwrap_or(&key).to_string();
        let Some(value) = kv.get(&key).await? else {
            continue;
        };
        let entry = match serde_json::from_value::<LegacyEntry>(value) {
            Ok(entry) => entry,
            Err(_) => {
                let warning = format!("{label}: unrecognized legacy entry");
                warn!(name = %label, "skipping unrecognized legacy entry");
                report.warnings.push(warning);
                report.skipped.push(label);
                continue;
            }
        };

        match vault.add(entry.into_credential(&label)).await {
            Ok(record) => {
                info!(name = %label, id = %record.id, "migrated legacy credential");
                report.migrated.push(label);
            }
            Err(KeywardError::DuplicateKey { existing_id }) => {
                info!(name = %label, id = %existing_id, "legacy credential already in vault");
                report.skipped.push(label);
            }
            Err(e) if e.is_session_error() => return Err(e),
            Err(e) => {
                warn!(name = %label, error = %e, "legacy credential not migrated");
                report.warnings.push(format!("{label}: {e}"));
                report.skipped.push(label);
                continue;
            }
        }

        // Encrypted copy exists; drop the plaintext.
        if let Err(e) = kv.remove(&key).await {
            warn!(key = %key, error = %e, "failed to remove legacy plaintext entry");
            report
                .warnings
                .push(format!("{key}: plaintext entry could not be removed: {e}"));
        }
    }

    kv.set(MIGRATION_VERSION_KEY, json!(STORAGE_VERSION)).await?;
    vault
        .audit_log()
        .record(
            AuditEvent::Migration,
            None,
            json!({
                "version": STORAGE_VERSION,
                "migrated": report.migrated.len(),
                "skipped": report.skipped.len(),
            }),
        )
        .await;
    if !report.migrated.is_empty() {
        warn!(
            count = report.migrated.len(),
            "migrated plaintext credentials into the encrypted vault"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_and_described_entries_parse() {
        let bare: LegacyEntry = serde_json::from_value(json!("sk-abc")).unwrap();
        let input = bare.into_credential("work");
        assert_eq!(input.name, "work");
        assert_eq!(input.provider, None);

        let described: LegacyEntry = serde_json::from_value(json!({
            "key": "sk-abc",
            "provider": "openai",
            "name": "Team key",
            "tags": ["prod"]
        }))
        .unwrap();
        let input = described.into_credential("work");
        assert_eq!(input.name, "Team key");
        assert_eq!(input.provider, Some(Provider::OpenAI));
        assert_eq!(input.tags, vec!["prod"]);
    }

    #[test]
    fn other_shapes_are_rejected() {
        assert!(serde_json::from_value::<LegacyEntry>(json!(42)).is_err());
        assert!(serde_json::from_value::<LegacyEntry>(json!({ "name": "x" })).is_err());
    }
}
