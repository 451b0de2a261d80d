// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared between the vault and the persistence backends.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by persistence backends and services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Operational but experiencing issues.
    Degraded(String),
    /// Not operational.
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// AI provider a credential belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Provider {
    OpenAI,
    Anthropic,
    Google,
    Groq,
    OpenRouter,
    Mistral,
    /// Any other endpoint; no key format is enforced beyond basic hygiene.
    Custom,
}

/// Kind of credential within a provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum KeyType {
    ApiKey,
    ProjectKey,
    ServiceAccount,
    AdminKey,
}

/// Lifecycle status of a stored credential.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Inactive,
    Revoked,
}

/// Plaintext-free description of a credential. This is what the metadata
/// index stores and what listings return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialMetadata {
    pub id: String,
    pub provider: Provider,
    pub key_type: KeyType,
    pub status: KeyStatus,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    /// First and last few characters of the secret, middle redacted.
    pub masked_key: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Per-credential provider settings carried alongside the secret.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialConfiguration {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub rate_limit_rpm: Option<u32>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// Accumulated usage counters. Counters only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total_requests: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    /// Request-weighted running average latency in milliseconds.
    pub average_response_time_ms: f64,
}

/// Where a credential stands in its rotation lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RotationStatus {
    #[default]
    None,
    InProgress,
    Completed,
    Failed,
}

/// One entry of a credential's append-only rotation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationEvent {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub old_key_id: String,
    pub new_key_id: String,
}

/// Rotation status plus history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationState {
    pub status: RotationStatus,
    #[serde(default)]
    pub history: Vec<RotationEvent>,
}

/// A row of the metadata index: the metadata plus the secret's one-way hash
/// used for duplicate detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRecord {
    pub metadata: CredentialMetadata,
    pub key_hash: String,
}

/// Fields the metadata index can be queried by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum IndexField {
    Provider,
    Status,
    KeyType,
    Tag,
    KeyHash,
}

impl IndexField {
    /// Whether `record` matches `value` on this field.
    pub fn matches(&self, record: &IndexRecord, value: &str) -> bool {
        let meta = &record.metadata;
        match self {
            Self::Provider => meta.provider.to_string() == value,
            Self::Status => meta.status.to_string() == value,
            Self::KeyType => meta.key_type.to_string() == value,
            Self::Tag => meta.tags.iter().any(|t| t == value),
            Self::KeyHash => record.key_hash == value,
        }
    }
}

/// Pagination window for index queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Page {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn first(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample_record() -> IndexRecord {
        let now = Utc::now();
        IndexRecord {
            metadata: CredentialMetadata {
                id: "k1".into(),
                provider: Provider::OpenAI,
                key_type: KeyType::ProjectKey,
                status: KeyStatus::Active,
                name: "primary".into(),
                description: None,
                created_at: now,
                updated_at: now,
                last_used: None,
                masked_key: "sk-proj...abcd".into(),
                permissions: vec![],
                tags: vec!["prod".into()],
            },
            key_hash: "deadbeef".into(),
        }
    }

    #[test]
    fn provider_display_and_parse_round_trip() {
        for provider in [
            Provider::OpenAI,
            Provider::Anthropic,
            Provider::Google,
            Provider::Groq,
            Provider::OpenRouter,
            Provider::Mistral,
            Provider::Custom,
        ] {
            let s = provider.to_string();
            assert_eq!(Provider::from_str(&s).unwrap(), provider);
        }
        assert_eq!(Provider::from_str("OpenAI").unwrap(), Provider::OpenAI);
    }

    #[test]
    fn provider_serializes_lowercase() {
        let json = serde_json::to_string(&Provider::OpenRouter).unwrap();
        assert_eq!(json, "\"openrouter\"");
    }

    #[test]
    fn index_field_matching() {
        let record = sample_record();
        assert!(IndexField::Provider.matches(&record, "openai"));
        assert!(IndexField::Status.matches(&record, "active"));
        assert!(IndexField::KeyType.matches(&record, "project_key"));
        assert!(IndexField::Tag.matches(&record, "prod"));
        assert!(!IndexField::Tag.matches(&record, "dev"));
        assert!(IndexField::KeyHash.matches(&record, "deadbeef"));
    }

    #[test]
    fn metadata_uses_camel_case_on_the_wire() {
        let json = serde_json::to_value(&sample_record().metadata).unwrap();
        assert!(json.get("maskedKey").is_some());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("keyType").is_some());
    }
}
