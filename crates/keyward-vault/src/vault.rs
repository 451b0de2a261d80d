// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The credential vault.
//!
//! Secrets are encrypted by the [`EncryptionService`] before they reach
//! storage. Each credential is written twice: the full record (ciphertext,
//! checksum, usage, rotation history) under `record:<id>` in the blob store,
//! and its plaintext-free metadata in the queryable index.
//!
//! Reads that are followed by writes (`update`, `record_usage`) do not hold
//! a lock across the gap, so concurrent writers to the same id can lose an
//! update.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use keyward_config::model::KeywardConfig;
use keyward_core::{
    CredentialConfiguration, CredentialMetadata, IndexField, KeyStatus, KeyValueStore,
    KeywardError, MetadataIndex, Page, Provider, RotationEvent, RotationState, RotationStatus,
    UsageStats,
};
use keyward_crypto::{DataType, EncryptionService, Payload};
use keyward_storage::Backends;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::audit::{AuditEvent, AuditLogEntry, AuditLogger};
use crate::cache::{CacheStats, LruTtlCache};
use crate::migration::{self, MigrationReport};
use crate::probe::ConnectionProbe;
use crate::provider;
use crate::record::{
    ConnectionTestResult, CredentialPatch, CredentialRecord, ExportedCredential, HealthReport,
    ImportReport, ListOptions, ListResult, NewCredential, RotationOutcome, STORAGE_VERSION,
    SortBy, SortOrder, UsageDelta, VaultExport, record_key,
};

const KEYS_GAUGE: &str = "keyward_vault_keys";
const CACHE_HITS: &str = "keyward_cache_hits_total";
const CACHE_MISSES: &str = "keyward_cache_misses_total";
const INTEGRITY_FAILURES: &str = "keyward_integrity_failures_total";

/// Runtime settings for a [`CredentialVault`].
#[derive(Debug, Clone)]
pub struct VaultOptions {
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    /// Hard deadline for [`CredentialVault::test_connection`].
    pub connection_timeout: Duration,
}

impl VaultOptions {
    pub fn from_config(config: &KeywardConfig) -> Self {
        Self {
            cache_capacity: config.cache.capacity,
            cache_ttl: config.cache.ttl(),
            connection_timeout: config.connection.timeout(),
        }
    }
}

impl Default for VaultOptions {
    fn default() -> Self {
        Self::from_config(&KeywardConfig::default())
    }
}

/// Fields a sealed record inherits from its request or predecessor.
struct Template {
    name: String,
    description: Option<String>,
    tags: Vec<String>,
    permissions: Vec<String>,
    configuration: CredentialConfiguration,
}

impl From<&CredentialRecord> for Template {
    fn from(record: &CredentialRecord) -> Self {
        Self {
            name: record.metadata.name.clone(),
            description: record.metadata.description.clone(),
            tags: record.metadata.tags.clone(),
            permissions: record.metadata.permissions.clone(),
            configuration: record.configuration.clone(),
        }
    }
}

/// Encrypted credential store.
pub struct CredentialVault {
    encryption: Arc<EncryptionService>,
    kv: Arc<dyn KeyValueStore>,
    index: Arc<dyn MetadataIndex>,
    cache: Mutex<LruTtlCache<String, CredentialRecord>>,
    audit: AuditLogger,
    probe: Arc<dyn ConnectionProbe>,
    options: VaultOptions,
    key_count: AtomicUsize,
}

impl CredentialVault {
    /// Build a vault over `backends`, counting the credentials already
    /// stored.
    pub async fn open(
        encryption: Arc<EncryptionService>,
        backends: Backends,
        probe: Arc<dyn ConnectionProbe>,
        options: VaultOptions,
    ) -> Result<Self, KeywardError> {
        let existing = backends.index.get_all().await?.len();
        let vault = Self {
            encryption,
            audit: AuditLogger::new(backends.kv.clone()),
            kv: backends.kv,
            index: backends.index,
            cache: Mutex::new(LruTtlCache::new(options.cache_capacity, options.cache_ttl)),
            probe,
            options,
            key_count: AtomicUsize::new(existing),
        };
        vault.publish_key_count();
        debug!(keys = existing, "credential vault opened");
        Ok(vault)
    }

    pub fn encryption(&self) -> &Arc<EncryptionService> {
        &self.encryption
    }

    pub fn options(&self) -> &VaultOptions {
        &self.options
    }

    /// Number of stored credentials, active or not.
    pub fn key_count(&self) -> usize {
        self.key_count.load(Ordering::Relaxed)
    }

    pub(crate) fn kv(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    pub(crate) fn audit_log(&self) -> &AuditLogger {
        &self.audit
    }

    fn cache(&self) -> MutexGuard<'_, LruTtlCache<String, CredentialRecord>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_key_count(&self) {
        metrics::gauge!(KEYS_GAUGE).set(self.key_count() as f64);
    }

    fn add_key_count(&self, n: usize) {
        self.key_count.fetch_add(n, Ordering::Relaxed);
        self.publish_key_count();
    }

    fn remove_key_count(&self, n: usize) {
        let _ = self
            .key_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                Some(c.saturating_sub(n))
            });
        self.publish_key_count();
    }

    // --- record plumbing -------------------------------------------------

    async fn integrity_failure(&self, id: &str, reason: &str) -> KeywardError {
        metrics::counter!(INTEGRITY_FAILURES).increment(1);
        warn!(id = %id, reason, "credential failed integrity check");
        self.audit
            .record(AuditEvent::IntegrityFailure, Some(id), json!({ "reason": reason }))
            .await;
        KeywardError::Integrity {
            subject: format!("credential {id}"),
        }
    }

    /// Load and verify a record, bypassing the cache.
    async fn load_record(&self, id: &str) -> Result<Option<CredentialRecord>, KeywardError> {
        let Some(value) = self.kv.get(&record_key(id)).await? else {
            if self.index.get(id).await?.is_some() {
                return Err(self.integrity_failure(id, "encrypted record missing").await);
            }
            return Ok(None);
        };
        let record: CredentialRecord = serde_json::from_value(value)
            .map_err(|e| KeywardError::InvalidFormat(format!("record {id}: {e}")))?;

        if !self
            .encryption
            .validate_integrity_checksum(&record.encrypted_blob, &record.checksum)?
        {
            return Err(self.integrity_failure(id, "checksum mismatch").await);
        }
        Ok(Some(record))
    }

    /// Persist a new record to both tiers. The blob is removed again if the
    /// index rejects the row.
    async fn insert_record(&self, record: &CredentialRecord) -> Result<(), KeywardError> {
        let key = record_key(&record.id);
        self.kv.set(&key, encode(record)?).await?;
        if let Err(e) = self.index.add(&record.index_record()).await {
            if let Err(undo) = self.kv.remove(&key).await {
                warn!(id = %record.id, error = %undo, "failed to remove orphaned record");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Overwrite an existing record in both tiers.
    async fn write_record(&self, record: &CredentialRecord) -> Result<(), KeywardError> {
        self.kv.set(&record_key(&record.id), encode(record)?).await?;
        self.index.update(&record.index_record()).await
    }

    /// Blob first: a failure part way leaves the index row, which counts
    /// toward `key_count` and lets a retried delete finish the job.
    async fn remove_record(&self, id: &str) -> Result<bool, KeywardError> {
        self.cache().invalidate(&id.to_string());
        let in_store = self.kv.remove(&record_key(id)).await?;
        let in_index = self.index.delete(id).await?;
        Ok(in_index || in_store)
    }

    async fn ensure_unique(&self, key_hash: &str) -> Result<(), KeywardError> {
        let existing = self
            .index
            .query(IndexField::KeyHash, key_hash, Page::first(1))
            .await?;
        match existing.into_iter().next() {
            Some(row) => Err(KeywardError::DuplicateKey {
                existing_id: row.metadata.id,
            }),
            None => Ok(()),
        }
    }

    /// Encrypt `secret` into a fresh record.
    fn seal_record(
        &self,
        id: String,
        secret: &str,
        provider: Provider,
        key_hash: String,
        template: Template,
    ) -> Result<CredentialRecord, KeywardError> {
        let blob = self
            .encryption
            .encrypt_data(&Payload::Text(secret.to_string()))?;
        let checksum = self.encryption.create_integrity_checksum(&blob)?;
        let now = Utc::now();
        Ok(CredentialRecord {
            metadata: CredentialMetadata {
                id: id.clone(),
                provider,
                key_type: provider::key_type_of(secret, provider),
                status: KeyStatus::Active,
                name: template.name,
                description: template.description,
                created_at: now,
                updated_at: now,
                last_used: None,
                masked_key: provider::mask_secret(secret),
                permissions: template.permissions,
                tags: template.tags,
            },
            id,
            encrypted_blob: blob,
            key_hash,
            checksum,
            storage_version: STORAGE_VERSION,
            configuration: template.configuration,
            usage_stats: UsageStats::default(),
            rotation: RotationState::default(),
        })
    }

    async fn audit_failure(&self, operation: &str, subject: Option<&str>, error: &KeywardError) {
        self.audit
            .record(
                AuditEvent::OperationFailed,
                subject,
                json!({ "operation": operation, "error": error.to_string() }),
            )
            .await;
    }

    // --- operations ------------------------------------------------------

    /// Store a new credential.
    pub async fn add(&self, input: NewCredential) -> Result<CredentialRecord, KeywardError> {
        self.encryption.ensure_active()?;
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(KeywardError::Validation(
                "credential name must not be empty".into(),
            ));
        }
        let secret = input.key.expose_secret();
        let provider = provider::resolve_provider(secret, input.provider)?;
        let key_hash = self.encryption.hash(secret.as_bytes());
        self.ensure_unique(&key_hash).await?;

        let template = Template {
            name,
            description: input.description,
            tags: input.tags,
            permissions: input.permissions,
            configuration: input.configuration,
        };
        let id = uuid::Uuid::new_v4().to_string();
        let record = match self.seal_record(id, secret, provider, key_hash, template) {
            Ok(record) => record,
            Err(e) => {
                self.audit_failure("add", None, &e).await;
                return Err(e);
            }
        };
        if let Err(e) = self.insert_record(&record).await {
            self.audit_failure("add", Some(&record.id), &e).await;
            return Err(e);
        }

        self.add_key_count(1);
        self.audit
            .record(
                AuditEvent::Create,
                Some(&record.id),
                json!({ "provider": provider, "keyType": record.metadata.key_type }),
            )
            .await;
        self.cache().insert(record.id.clone(), record.clone());
        info!(id = %record.id, %provider, "credential added");
        Ok(record)
    }

    /// Fetch a credential record. Absent ids yield `None`.
    pub async fn get(&self, id: &str) -> Result<Option<CredentialRecord>, KeywardError> {
        self.encryption.ensure_active()?;
        let cached = self.cache().get(&id.to_string());
        if let Some(record) = cached {
            metrics::counter!(CACHE_HITS).increment(1);
            return Ok(Some(record));
        }
        metrics::counter!(CACHE_MISSES).increment(1);

        let Some(mut record) = self.load_record(id).await? else {
            return Ok(None);
        };
        record.metadata.last_used = Some(Utc::now());
        self.write_record(&record).await?;
        self.cache().insert(id.to_string(), record.clone());
        self.audit.record(AuditEvent::Access, Some(id), json!({})).await;
        Ok(Some(record))
    }

    /// Fetch and decrypt a credential's secret.
    pub async fn get_secret(&self, id: &str) -> Result<Option<SecretString>, KeywardError> {
        let Some(record) = self.get(id).await? else {
            return Ok(None);
        };
        self.decrypt_secret(&record).map(Some)
    }

    fn decrypt_secret(&self, record: &CredentialRecord) -> Result<SecretString, KeywardError> {
        let payload = self
            .encryption
            .decrypt_data(&record.encrypted_blob, DataType::Text)?;
        payload
            .into_text()
            .map(SecretString::from)
            .ok_or_else(|| KeywardError::InvalidFormat(format!("record {} is not text", record.id)))
    }

    /// Apply `patch` to a credential.
    pub async fn update(
        &self,
        id: &str,
        patch: CredentialPatch,
    ) -> Result<CredentialRecord, KeywardError> {
        self.encryption.ensure_active()?;
        let Some(mut record) = self.load_record(id).await? else {
            return Err(KeywardError::NotFound(format!("credential {id}")));
        };

        let meta = &mut record.metadata;
        let mut changed = Vec::new();
        if let Some(name) = patch.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(KeywardError::Validation(
                    "credential name must not be empty".into(),
                ));
            }
            meta.name = name;
            changed.push("name");
        }
        if let Some(description) = patch.description {
            meta.description = description;
            changed.push("description");
        }
        if let Some(status) = patch.status {
            meta.status = status;
            changed.push("status");
        }
        if let Some(tags) = patch.tags {
            meta.tags = tags;
            changed.push("tags");
        }
        if let Some(permissions) = patch.permissions {
            meta.permissions = permissions;
            changed.push("permissions");
        }
        if let Some(configuration) = patch.configuration {
            record.configuration = configuration;
            changed.push("configuration");
        }
        record.metadata.updated_at = Utc::now();

        self.write_record(&record).await?;
        self.cache().invalidate(&id.to_string());
        self.audit
            .record(AuditEvent::Update, Some(id), json!({ "fields": changed }))
            .await;
        Ok(record)
    }

    /// Permanently remove a credential. Returns `false` if it did not exist.
    pub async fn delete(&self, id: &str) -> Result<bool, KeywardError> {
        self.encryption.ensure_active()?;
        if !self.remove_record(id).await? {
            return Ok(false);
        }
        self.remove_key_count(1);
        self.audit.record(AuditEvent::Delete, Some(id), json!({})).await;
        info!(id = %id, "credential deleted");
        Ok(true)
    }

    /// Filter, sort and page credential metadata.
    pub async fn list(&self, options: &ListOptions) -> Result<ListResult, KeywardError> {
        self.encryption.ensure_active()?;

        // Narrow with one indexed field; refine the rest in memory.
        let rows = if let Some(provider) = options.provider {
            self.index
                .query(IndexField::Provider, &provider.to_string(), Page::all())
                .await?
        } else if let Some(status) = options.status {
            self.index
                .query(IndexField::Status, &status.to_string(), Page::all())
                .await?
        } else if let Some(key_type) = options.key_type {
            self.index
                .query(IndexField::KeyType, &key_type.to_string(), Page::all())
                .await?
        } else if let Some(tag) = options.tags.first() {
            self.index.query(IndexField::Tag, tag, Page::all()).await?
        } else {
            self.index.get_all().await?
        };

        let needle = options.search.as_deref().map(str::to_lowercase);
        let mut keys: Vec<CredentialMetadata> = rows
            .into_iter()
            .map(|row| row.metadata)
            .filter(|meta| matches_filters(meta, options, needle.as_deref()))
            .collect();

        keys.sort_by(|a, b| {
            let order = compare(a, b, options.sort_by);
            match options.sort_order {
                SortOrder::Asc => order,
                SortOrder::Desc => order.reverse(),
            }
        });

        let total = keys.len();
        let keys: Vec<_> = keys
            .into_iter()
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();
        let has_more = options.offset.saturating_add(keys.len()) < total;
        Ok(ListResult {
            keys,
            total,
            has_more,
        })
    }

    /// Replace a credential with a new secret. The old record is kept,
    /// marked inactive. Never returns an error: failures are reported in
    /// the outcome.
    pub async fn rotate(&self, id: &str, new_key: SecretString) -> RotationOutcome {
        match self.try_rotate(id, &new_key).await {
            Ok(new_id) => {
                info!(old = %id, new = %new_id, "credential rotated");
                RotationOutcome {
                    success: true,
                    new_key_id: Some(new_id),
                    rollback_available: true,
                    error: None,
                }
            }
            Err(e) => {
                warn!(id = %id, error = %e, "credential rotation failed");
                self.audit_failure("rotate", Some(id), &e).await;
                RotationOutcome::failed(e)
            }
        }
    }

    async fn try_rotate(&self, id: &str, new_key: &SecretString) -> Result<String, KeywardError> {
        self.encryption.ensure_active()?;
        let Some(mut old) = self.load_record(id).await? else {
            return Err(KeywardError::NotFound(format!("credential {id}")));
        };
        if old.metadata.status != KeyStatus::Active {
            return Err(KeywardError::Validation(format!(
                "credential {id} is {} and cannot be rotated",
                old.metadata.status
            )));
        }

        let secret = new_key.expose_secret();
        let provider = old.metadata.provider;
        provider::validate_key(secret, provider)?;
        let key_hash = self.encryption.hash(secret.as_bytes());
        self.ensure_unique(&key_hash).await?;

        let new_id = uuid::Uuid::new_v4().to_string();
        let mut new = self.seal_record(
            new_id.clone(),
            secret,
            provider,
            key_hash,
            Template::from(&old),
        )?;
        let mut history = old.rotation.history.clone();
        history.push(RotationEvent {
            timestamp: Utc::now(),
            success: true,
            old_key_id: id.to_string(),
            new_key_id: new_id.clone(),
        });
        new.rotation = RotationState {
            status: RotationStatus::Completed,
            history,
        };
        self.insert_record(&new).await?;

        old.metadata.status = KeyStatus::Inactive;
        old.metadata.updated_at = Utc::now();
        old.rotation.status = RotationStatus::Completed;
        if let Err(e) = self.write_record(&old).await {
            if let Err(undo) = self.remove_record(&new_id).await {
                warn!(id = %new_id, error = %undo, "failed to undo partial rotation");
            }
            return Err(e);
        }

        self.cache().invalidate(&id.to_string());
        self.add_key_count(1);
        self.audit
            .record(AuditEvent::Rotate, Some(id), json!({ "newKeyId": new_id }))
            .await;
        Ok(new_id)
    }

    /// Undo the rotation that produced `new_id`: the predecessor becomes
    /// active again and `new_id` is deleted. Returns the restored record.
    pub async fn rollback_rotation(&self, new_id: &str) -> Result<CredentialRecord, KeywardError> {
        self.encryption.ensure_active()?;
        let Some(new) = self.load_record(new_id).await? else {
            return Err(KeywardError::NotFound(format!("credential {new_id}")));
        };
        let Some(event) = new
            .rotation
            .history
            .last()
            .filter(|event| event.new_key_id == new_id)
        else {
            return Err(KeywardError::Validation(format!(
                "credential {new_id} was not produced by a rotation"
            )));
        };
        let old_id = event.old_key_id.clone();
        let Some(mut old) = self.load_record(&old_id).await? else {
            return Err(KeywardError::NotFound(format!("credential {old_id}")));
        };

        old.metadata.status = KeyStatus::Active;
        old.metadata.updated_at = Utc::now();
        old.rotation.status = RotationStatus::None;
        self.write_record(&old).await?;
        self.remove_record(new_id).await?;
        self.cache().invalidate(&old_id);
        self.remove_key_count(1);

        self.audit
            .record(
                AuditEvent::RotationRollback,
                Some(&old_id),
                json!({ "removedKeyId": new_id }),
            )
            .await;
        info!(restored = %old_id, removed = %new_id, "rotation rolled back");
        Ok(old)
    }

    /// Accumulate usage counters and fold the latency into the
    /// request-weighted average.
    pub async fn record_usage(
        &self,
        id: &str,
        delta: UsageDelta,
    ) -> Result<UsageStats, KeywardError> {
        self.encryption.ensure_active()?;
        if !(delta.cost.is_finite() && delta.cost >= 0.0)
            || !(delta.response_time_ms.is_finite() && delta.response_time_ms >= 0.0)
        {
            return Err(KeywardError::Validation(
                "usage cost and response time must be non-negative".into(),
            ));
        }
        let Some(mut record) = self.load_record(id).await? else {
            return Err(KeywardError::NotFound(format!("credential {id}")));
        };

        let stats = &mut record.usage_stats;
        let old_count = stats.total_requests;
        let combined = old_count.saturating_add(delta.requests);
        if delta.requests > 0 {
            stats.average_response_time_ms = (stats.average_response_time_ms * old_count as f64
                + delta.response_time_ms * delta.requests as f64)
                / combined as f64;
        }
        stats.total_requests = combined;
        stats.total_tokens = stats.total_tokens.saturating_add(delta.tokens);
        stats.total_cost += delta.cost;
        record.metadata.last_used = Some(Utc::now());

        self.write_record(&record).await?;
        self.cache().invalidate(&id.to_string());
        self.audit
            .record(
                AuditEvent::UsageRecorded,
                Some(id),
                json!({ "requests": delta.requests, "tokens": delta.tokens }),
            )
            .await;
        Ok(record.usage_stats)
    }

    /// Export every credential. Metadata only unless `include_secrets`, in
    /// which case full encrypted records are exported. Plaintext is never
    /// exported.
    pub async fn export_all(&self, include_secrets: bool) -> Result<VaultExport, KeywardError> {
        self.encryption.ensure_active()?;
        let rows = self.index.get_all().await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            if !include_secrets {
                items.push(ExportedCredential::Metadata(row.metadata));
                continue;
            }
            match self.load_record(&row.metadata.id).await? {
                Some(record) => items.push(ExportedCredential::Record(Box::new(record))),
                None => warn!(id = %row.metadata.id, "index row without record; skipped"),
            }
        }

        self.audit
            .record(
                AuditEvent::Export,
                None,
                json!({ "count": items.len(), "includeSecrets": include_secrets }),
            )
            .await;
        Ok(VaultExport {
            version: STORAGE_VERSION,
            exported_at: Utc::now(),
            include_secrets,
            items,
        })
    }

    /// Import records produced by [`export_all`](Self::export_all) with
    /// secrets. Each item is handled independently.
    pub async fn import_all(&self, data: Value) -> Result<ImportReport, KeywardError> {
        self.encryption.ensure_active()?;
        let items = match data {
            Value::Array(items) => items,
            Value::Object(mut object) => match object.remove("items") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(KeywardError::Validation(
                        "import data has no `items` array".into(),
                    ));
                }
            },
            _ => {
                return Err(KeywardError::Validation(
                    "import data must be an export object or an array".into(),
                ));
            }
        };

        let mut report = ImportReport::default();
        for (position, item) in items.into_iter().enumerate() {
            match self.import_one(item).await {
                Ok(id) => {
                    debug!(id = %id, "credential imported");
                    report.success += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(format!("item {position}: {e}"));
                }
            }
        }
        self.add_key_count(report.success);

        self.audit
            .record(
                AuditEvent::Import,
                None,
                json!({ "success": report.success, "failed": report.failed }),
            )
            .await;
        info!(success = report.success, failed = report.failed, "import finished");
        Ok(report)
    }

    async fn import_one(&self, item: Value) -> Result<String, KeywardError> {
        let record = match serde_json::from_value::<ExportedCredential>(item) {
            Ok(ExportedCredential::Record(record)) => *record,
            Ok(ExportedCredential::Metadata(_)) => {
                return Err(KeywardError::Validation(
                    "metadata-only item carries no encrypted secret".into(),
                ));
            }
            Err(e) => return Err(KeywardError::InvalidFormat(e.to_string())),
        };
        let id = record.id.clone();
        if record.metadata.id != id {
            return Err(KeywardError::Validation(format!(
                "record id {id} does not match its metadata"
            )));
        }
        record.encrypted_blob.validate()?;
        if !self
            .encryption
            .validate_integrity_checksum(&record.encrypted_blob, &record.checksum)?
        {
            return Err(KeywardError::Integrity {
                subject: format!("imported credential {id}"),
            });
        }

        // The record must have been sealed by this vault's master key.
        let secret = Zeroizing::new(
            self.decrypt_secret(&record)?
                .expose_secret()
                .to_string(),
        );
        if self.encryption.hash(secret.as_bytes()) != record.key_hash {
            return Err(KeywardError::Integrity {
                subject: format!("imported credential {id}"),
            });
        }

        if self.kv.get(&record_key(&id)).await?.is_some() || self.index.get(&id).await?.is_some()
        {
            return Err(KeywardError::Validation(format!("credential {id} already exists")));
        }
        self.ensure_unique(&record.key_hash).await?;
        self.insert_record(&record).await?;
        Ok(id)
    }

    /// Check that the provider accepts a stored credential. The secret is
    /// decrypted only for the duration of the request.
    pub async fn test_connection(&self, id: &str) -> Result<ConnectionTestResult, KeywardError> {
        let Some(record) = self.get(id).await? else {
            return Err(KeywardError::NotFound(format!("credential {id}")));
        };
        let secret = self.decrypt_secret(&record)?;
        let deadline = self.options.connection_timeout;

        let started = tokio::time::Instant::now();
        let outcome = tokio::time::timeout(
            deadline,
            self.probe.check(
                record.metadata.provider,
                record.configuration.endpoint.as_deref(),
                &secret,
            ),
        )
        .await;
        drop(secret);
        let response_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(KeywardError::Timeout { duration: deadline }.to_string()),
        };
        let success = error.is_none();
        self.audit
            .record(
                AuditEvent::ConnectionTest,
                Some(id),
                json!({ "success": success, "responseTimeMs": response_time_ms }),
            )
            .await;
        debug!(id = %id, success, response_time_ms, "connection test finished");
        Ok(ConnectionTestResult {
            success,
            response_time_ms,
            error,
        })
    }

    /// Encrypt legacy plaintext entries. See [`migration`].
    pub async fn migrate_legacy(&self) -> Result<MigrationReport, KeywardError> {
        migration::migrate_legacy(self).await
    }

    /// Readiness of the encryption session and both storage tiers.
    pub async fn health_check(&self) -> HealthReport {
        let session_active = self.encryption.is_session_active();
        let encryption_ready = session_active && self.encryption_round_trip();
        let metadata_store = self
            .index
            .health_check()
            .await
            .is_ok_and(|status| status.is_healthy());
        let blob_store = self
            .kv
            .health_check()
            .await
            .is_ok_and(|status| status.is_healthy());
        HealthReport {
            encryption_ready,
            session_active,
            metadata_store,
            blob_store,
            healthy: encryption_ready && session_active && metadata_store && blob_store,
        }
    }

    fn encryption_round_trip(&self) -> bool {
        const PROBE: &str = "keyward-health";
        self.encryption
            .encrypt_data(&Payload::Text(PROBE.into()))
            .and_then(|blob| self.encryption.decrypt_data(&blob, DataType::Text))
            .is_ok_and(|payload| payload.as_text() == Some(PROBE))
    }

    /// Newest audit entries first.
    pub async fn recent_audit(&self, limit: usize) -> Result<Vec<AuditLogEntry>, KeywardError> {
        self.audit.recent(limit).await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache().stats()
    }
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("keys", &self.key_count())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn encode(record: &CredentialRecord) -> Result<Value, KeywardError> {
    serde_json::to_value(record).map_err(|e| KeywardError::storage("encode record", e))
}

fn matches_filters(meta: &CredentialMetadata, options: &ListOptions, needle: Option<&str>) -> bool {
    if options.provider.is_some_and(|p| p != meta.provider)
        || options.status.is_some_and(|s| s != meta.status)
        || options.key_type.is_some_and(|k| k != meta.key_type)
    {
        return false;
    }
    if !options.tags.iter().all(|tag| meta.tags.contains(tag)) {
        return false;
    }
    needle.is_none_or(|needle| {
        meta.name.to_lowercase().contains(needle)
            || meta
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(needle))
            || meta.tags.iter().any(|t| t.to_lowercase().contains(needle))
    })
}

fn compare(a: &CredentialMetadata, b: &CredentialMetadata, by: SortBy) -> CmpOrdering {
    let primary = match by {
        SortBy::CreatedAt => a.created_at.cmp(&b.created_at),
        SortBy::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortBy::LastUsed => a.last_used.cmp(&b.last_used),
        SortBy::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortBy::Provider => a.provider.to_string().cmp(&b.provider.to_string()),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}
