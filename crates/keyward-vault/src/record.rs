// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stored credential records and the request/response types of the vault.

use chrono::{DateTime, Utc};
use keyward_core::{
    CredentialConfiguration, CredentialMetadata, IndexRecord, KeyStatus, KeyType, Provider,
    RotationState, UsageStats,
};
use keyward_crypto::EncryptedBlob;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Layout version written into every record and into `migration:version`.
pub const STORAGE_VERSION: u32 = 2;

/// Blob-store key prefix of credential records.
pub const RECORD_PREFIX: &str = "record:";

pub(crate) fn record_key(id: &str) -> String {
    format!("{RECORD_PREFIX}{id}")
}

/// A credential as persisted under `record:<id>`. Holds no plaintext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub id: String,
    pub metadata: CredentialMetadata,
    pub encrypted_blob: EncryptedBlob,
    /// SHA-256 of the plaintext secret, for duplicate detection only.
    pub key_hash: String,
    /// Integrity checksum over `encrypted_blob`.
    pub checksum: String,
    pub storage_version: u32,
    #[serde(default)]
    pub configuration: CredentialConfiguration,
    #[serde(default)]
    pub usage_stats: UsageStats,
    #[serde(default)]
    pub rotation: RotationState,
}

impl CredentialRecord {
    pub(crate) fn index_record(&self) -> IndexRecord {
        IndexRecord {
            metadata: self.metadata.clone(),
            key_hash: self.key_hash.clone(),
        }
    }
}

/// Input to [`CredentialVault::add`](crate::CredentialVault::add).
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub key: SecretString,
    /// Detected from the key's prefix when absent.
    pub provider: Option<Provider>,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub permissions: Vec<String>,
    pub configuration: CredentialConfiguration,
}

impl NewCredential {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: SecretString::from(key.into()),
            provider: None,
            name: name.into(),
            description: None,
            tags: Vec::new(),
            permissions: Vec::new(),
            configuration: CredentialConfiguration::default(),
        }
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Mutable fields of a credential. Provider, key type and creation time
/// cannot be changed.
#[derive(Debug, Clone, Default)]
pub struct CredentialPatch {
    pub name: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub status: Option<KeyStatus>,
    pub tags: Option<Vec<String>>,
    pub permissions: Option<Vec<String>>,
    pub configuration: Option<CredentialConfiguration>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    #[default]
    CreatedAt,
    UpdatedAt,
    LastUsed,
    Name,
    Provider,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Filters, ordering and paging for [`CredentialVault::list`](crate::CredentialVault::list).
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub provider: Option<Provider>,
    pub status: Option<KeyStatus>,
    pub key_type: Option<KeyType>,
    /// Every listed tag must be present.
    pub tags: Vec<String>,
    /// Case-insensitive substring of name, description or a tag.
    pub search: Option<String>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult {
    pub keys: Vec<CredentialMetadata>,
    /// Filtered count before paging.
    pub total: usize,
    pub has_more: bool,
}

/// Result of [`CredentialVault::rotate`](crate::CredentialVault::rotate).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationOutcome {
    pub success: bool,
    pub new_key_id: Option<String>,
    pub rollback_available: bool,
    pub error: Option<String>,
}

impl RotationOutcome {
    pub(crate) fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            new_key_id: None,
            rollback_available: false,
            error: Some(error.to_string()),
        }
    }
}

/// Usage to add to a credential's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageDelta {
    pub requests: u64,
    pub tokens: u64,
    pub cost: f64,
    /// Average latency of these requests, in milliseconds.
    pub response_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResult {
    pub success: bool,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

/// One exported credential: metadata only, or the full encrypted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExportedCredential {
    Record(Box<CredentialRecord>),
    Metadata(CredentialMetadata),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultExport {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub include_secrets: bool,
    pub items: Vec<ExportedCredential>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub encryption_ready: bool,
    pub session_active: bool,
    pub metadata_store: bool,
    pub blob_store: bool,
    pub healthy: bool,
}
