// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests of the credential vault over the in-memory and SQLite
//! backends.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use keyward_config::model::{KdfAlgorithm, KeywardConfig, StorageBackend};
use keyward_core::{
    HealthStatus, KeyStatus, KeyType, KeyValueStore, KeywardError, MetadataIndex,
    PersistenceAdapter, Provider,
};
use keyward_crypto::{EncryptionService, KdfParams, ServiceOptions};
use keyward_storage::{Backends, MemoryStore};
use keyward_vault::{
    AuditEvent, ConnectionProbe, CredentialPatch, CredentialRecord, CredentialVault,
    ExportedCredential, ListOptions, NewCredential, SortBy, SortOrder, UsageDelta, VaultOptions,
    open_vault, open_vault_with,
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

const PASSPHRASE: &str = "correct-horse-battery";

/// OpenAI-shaped key: `sk-` plus 48 characters.
fn openai_key(seed: char) -> String {
    format!("sk-{}", std::iter::repeat_n(seed, 40).collect::<String>() + "0123ABCD")
}

fn fast_service_options() -> ServiceOptions {
    ServiceOptions {
        kdf: KdfParams::Argon2id {
            memory_cost: 8,
            iterations: 1,
            parallelism: 1,
        },
        idle_timeout: Duration::from_secs(1800),
        key_rotation_interval: None,
        memory_cleanup_interval: None,
        batch_size: 10,
    }
}

/// Probe that answers after `delay` with a fixed verdict.
struct StubProbe {
    delay: Duration,
    accept: bool,
}

#[async_trait]
impl ConnectionProbe for StubProbe {
    async fn check(
        &self,
        _provider: Provider,
        _endpoint: Option<&str>,
        _secret: &SecretString,
    ) -> Result<(), KeywardError> {
        tokio::time::sleep(self.delay).await;
        if self.accept {
            Ok(())
        } else {
            Err(KeywardError::Provider {
                message: "rejected".into(),
                source: None,
            })
        }
    }
}

fn accepting_probe() -> Arc<dyn ConnectionProbe> {
    Arc::new(StubProbe {
        delay: Duration::from_millis(5),
        accept: true,
    })
}

async fn open_over(backends: Backends, probe: Arc<dyn ConnectionProbe>) -> Arc<CredentialVault> {
    let encryption = EncryptionService::new(backends.kv.clone(), fast_service_options());
    open_vault_with(
        encryption,
        backends,
        probe,
        VaultOptions::default(),
        &SecretString::from(PASSPHRASE.to_string()),
    )
    .await
    .unwrap()
}

async fn memory_vault() -> (Arc<CredentialVault>, Backends) {
    let backends = Backends::shared(Arc::new(MemoryStore::new()));
    let vault = open_over(backends.clone(), accepting_probe()).await;
    (vault, backends)
}

/// A second vault over the same storage and session, with a cold cache.
async fn cold_vault(vault: &CredentialVault, backends: &Backends) -> CredentialVault {
    CredentialVault::open(
        vault.encryption().clone(),
        backends.clone(),
        accepting_probe(),
        VaultOptions::default(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn added_key_is_masked_and_readable() {
    let (vault, _) = memory_vault().await;
    let key = openai_key('x');
    assert_eq!(key.len(), 51);

    let record = vault.add(NewCredential::new(key.clone(), "primary")).await.unwrap();
    let masked = &record.metadata.masked_key;
    assert!(masked.starts_with("sk-"));
    assert!(masked.contains("..."));
    assert!(!masked.contains(&key[9..47]));
    assert_eq!(masked, &format!("{}...{}", &key[..7], &key[key.len() - 4..]));
    assert_eq!(record.metadata.provider, Provider::OpenAI);
    assert_eq!(record.metadata.key_type, KeyType::ApiKey);

    let secret = vault.get_secret(&record.id).await.unwrap().unwrap();
    assert_eq!(secret.expose_secret(), key);
}

#[tokio::test]
async fn stored_record_holds_no_plaintext() {
    let (vault, backends) = memory_vault().await;
    let key = openai_key('p');
    let record = vault.add(NewCredential::new(key.clone(), "primary")).await.unwrap();

    let raw = backends.kv.get(&format!("record:{}", record.id)).await.unwrap().unwrap();
    assert!(!raw.to_string().contains(&key));
    let index_row = backends.index.get(&record.id).await.unwrap().unwrap();
    assert!(!serde_json::to_string(&index_row).unwrap().contains(&key));
}

#[tokio::test]
async fn duplicate_add_is_rejected_and_counted_once() {
    let (vault, _) = memory_vault().await;
    let key = openai_key('d');
    let first = vault.add(NewCredential::new(key.clone(), "one")).await.unwrap();

    let err = vault.add(NewCredential::new(key, "two")).await.unwrap_err();
    match err {
        KeywardError::DuplicateKey { existing_id } => assert_eq!(existing_id, first.id),
        other => panic!("expected duplicate, got {other:?}"),
    }
    assert_eq!(vault.key_count(), 1);
}

#[tokio::test]
async fn unrecognized_key_and_blank_name_are_rejected() {
    let (vault, _) = memory_vault().await;
    assert!(matches!(
        vault.add(NewCredential::new("not-a-key", "x")).await.unwrap_err(),
        KeywardError::InvalidFormat(_)
    ));
    assert!(matches!(
        vault.add(NewCredential::new(openai_key('n'), "   ")).await.unwrap_err(),
        KeywardError::Validation(_)
    ));
    // Explicit provider accepts keys without a known prefix.
    let custom = NewCredential::new("internal-token-123", "internal").with_provider(Provider::Custom);
    assert!(vault.add(custom).await.is_ok());
}

#[tokio::test]
async fn rotation_replaces_key_and_retires_old_record() {
    let (vault, _) = memory_vault().await;
    let old = vault.add(NewCredential::new(openai_key('o'), "primary")).await.unwrap();
    // Warm the cache with the active record.
    vault.get(&old.id).await.unwrap().unwrap();

    let new_key = openai_key('n');
    let outcome = vault
        .rotate(&old.id, SecretString::from(new_key.clone()))
        .await;
    assert!(outcome.success, "{:?}", outcome.error);
    assert!(outcome.rollback_available);
    let new_id = outcome.new_key_id.unwrap();

    // The stale cache entry must not be served.
    let old_now = vault.get(&old.id).await.unwrap().unwrap();
    assert_eq!(old_now.metadata.status, KeyStatus::Inactive);

    let secret = vault.get_secret(&new_id).await.unwrap().unwrap();
    assert_eq!(secret.expose_secret(), new_key);

    let new_record = vault.get(&new_id).await.unwrap().unwrap();
    assert_eq!(new_record.metadata.name, "primary");
    assert_eq!(new_record.rotation.history.len(), 1);
    assert_eq!(new_record.rotation.history[0].old_key_id, old.id);
    assert_eq!(vault.key_count(), 2);
}

#[tokio::test]
async fn failed_rotation_is_reported_not_raised() {
    let (vault, _) = memory_vault().await;
    let old = vault.add(NewCredential::new(openai_key('o'), "primary")).await.unwrap();

    let wrong_provider = vault
        .rotate(&old.id, SecretString::from("gsk_abcdefghijklmnopqrstuvwxyz".to_string()))
        .await;
    assert!(!wrong_provider.success);
    assert!(!wrong_provider.rollback_available);
    assert!(wrong_provider.error.is_some());

    let missing = vault
        .rotate("nope", SecretString::from(openai_key('z')))
        .await;
    assert!(!missing.success);

    // Nothing changed.
    assert_eq!(vault.key_count(), 1);
    let still = vault.get(&old.id).await.unwrap().unwrap();
    assert_eq!(still.metadata.status, KeyStatus::Active);
}

#[tokio::test]
async fn rollback_restores_the_previous_key() {
    let (vault, _) = memory_vault().await;
    let old = vault.add(NewCredential::new(openai_key('o'), "primary")).await.unwrap();
    let outcome = vault.rotate(&old.id, SecretString::from(openai_key('n'))).await;
    let new_id = outcome.new_key_id.unwrap();

    let restored = vault.rollback_rotation(&new_id).await.unwrap();
    assert_eq!(restored.id, old.id);
    assert_eq!(restored.metadata.status, KeyStatus::Active);
    assert!(vault.get(&new_id).await.unwrap().is_none());
    assert_eq!(vault.key_count(), 1);

    // A record that was never rotated cannot be rolled back.
    assert!(matches!(
        vault.rollback_rotation(&old.id).await.unwrap_err(),
        KeywardError::Validation(_)
    ));
}

#[tokio::test]
async fn update_is_visible_through_the_cache() {
    let (vault, _) = memory_vault().await;
    let record = vault.add(NewCredential::new(openai_key('u'), "before")).await.unwrap();
    vault.get(&record.id).await.unwrap();

    let patch = CredentialPatch {
        name: Some("after".into()),
        tags: Some(vec!["prod".into()]),
        ..Default::default()
    };
    vault.update(&record.id, patch).await.unwrap();

    let fetched = vault.get(&record.id).await.unwrap().unwrap();
    assert_eq!(fetched.metadata.name, "after");
    assert_eq!(fetched.metadata.tags, vec!["prod"]);
    assert_eq!(fetched.metadata.provider, Provider::OpenAI);
    assert!(fetched.metadata.updated_at >= record.metadata.updated_at);

    assert!(matches!(
        vault.update("missing", CredentialPatch::default()).await.unwrap_err(),
        KeywardError::NotFound(_)
    ));
}

#[tokio::test]
async fn tampered_record_fails_integrity() {
    let (vault, backends) = memory_vault().await;
    let record = vault.add(NewCredential::new(openai_key('t'), "primary")).await.unwrap();

    let key = format!("record:{}", record.id);
    let raw = backends.kv.get(&key).await.unwrap().unwrap();
    let mut stored: CredentialRecord = serde_json::from_value(raw).unwrap();
    stored.encrypted_blob.data[0] ^= 0x01;
    backends
        .kv
        .set(&key, serde_json::to_value(&stored).unwrap())
        .await
        .unwrap();

    let cold = cold_vault(&vault, &backends).await;
    assert!(matches!(
        cold.get(&record.id).await.unwrap_err(),
        KeywardError::Integrity { .. }
    ));
    assert!(matches!(
        cold.get_secret(&record.id).await.unwrap_err(),
        KeywardError::Integrity { .. }
    ));

    let audit = cold.recent_audit(5).await.unwrap();
    assert!(audit.iter().any(|e| e.event == AuditEvent::IntegrityFailure));
}

#[tokio::test]
async fn missing_blob_for_indexed_record_is_an_integrity_error() {
    let (vault, backends) = memory_vault().await;
    let record = vault.add(NewCredential::new(openai_key('m'), "primary")).await.unwrap();
    backends.kv.remove(&format!("record:{}", record.id)).await.unwrap();

    let cold = cold_vault(&vault, &backends).await;
    assert!(matches!(
        cold.get(&record.id).await.unwrap_err(),
        KeywardError::Integrity { .. }
    ));
}

#[tokio::test]
async fn delete_removes_everything_once() {
    let (vault, _) = memory_vault().await;
    let record = vault.add(NewCredential::new(openai_key('r'), "primary")).await.unwrap();

    assert!(vault.delete(&record.id).await.unwrap());
    assert!(!vault.delete(&record.id).await.unwrap());
    assert!(vault.get(&record.id).await.unwrap().is_none());
    assert_eq!(vault.key_count(), 0);
}

/// Blob store whose record removals can be made to fail.
struct StuckRemovals {
    inner: Arc<MemoryStore>,
    fail: AtomicBool,
}

#[async_trait]
impl PersistenceAdapter for StuckRemovals {
    fn name(&self) -> &str {
        "stuck-removals"
    }

    async fn health_check(&self) -> Result<HealthStatus, KeywardError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl KeyValueStore for StuckRemovals {
    async fn get(&self, key: &str) -> Result<Option<Value>, KeywardError> {
        KeyValueStore::get(self.inner.as_ref(), key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), KeywardError> {
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<bool, KeywardError> {
        if key.starts_with("record:") && self.fail.load(Ordering::SeqCst) {
            return Err(KeywardError::storage("remove", "device busy"));
        }
        self.inner.remove(key).await
    }

    async fn get_batch(&self, keys: &[String]) -> Result<HashMap<String, Value>, KeywardError> {
        self.inner.get_batch(keys).await
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, KeywardError> {
        self.inner.list_keys(prefix).await
    }
}

#[tokio::test]
async fn failed_blob_removal_keeps_the_record_deletable() {
    let memory = Arc::new(MemoryStore::new());
    let kv = Arc::new(StuckRemovals {
        inner: memory.clone(),
        fail: AtomicBool::new(false),
    });
    let backends = Backends {
        kv: kv.clone(),
        index: memory,
    };
    let vault = open_over(backends.clone(), accepting_probe()).await;
    let key = openai_key('d');
    let record = vault.add(NewCredential::new(key.clone(), "primary")).await.unwrap();

    kv.fail.store(true, Ordering::SeqCst);
    assert!(matches!(
        vault.delete(&record.id).await.unwrap_err(),
        KeywardError::Storage { .. }
    ));
    assert_eq!(vault.key_count(), 1);
    assert!(backends.index.get(&record.id).await.unwrap().is_some());
    let secret = vault.get_secret(&record.id).await.unwrap().unwrap();
    assert_eq!(secret.expose_secret(), key);

    kv.fail.store(false, Ordering::SeqCst);
    assert!(vault.delete(&record.id).await.unwrap());
    assert_eq!(vault.key_count(), 0);
    assert!(backends.index.get(&record.id).await.unwrap().is_none());
    assert!(backends.kv.get(&format!("record:{}", record.id)).await.unwrap().is_none());
}

#[tokio::test]
async fn list_filters_sorts_and_pages() {
    let (vault, _) = memory_vault().await;
    vault
        .add(NewCredential::new(openai_key('a'), "Alpha").with_tags(["prod", "team"]))
        .await
        .unwrap();
    vault
        .add(NewCredential::new(openai_key('b'), "Bravo").with_tags(["staging"]))
        .await
        .unwrap();
    vault
        .add(
            NewCredential::new("sk-ant-REDACTED", "Charlie")
                .with_description("Claude billing")
                .with_tags(["prod"]),
        )
        .await
        .unwrap();

    let openai = vault
        .list(&ListOptions {
            provider: Some(Provider::OpenAI),
            sort_by: SortBy::Name,
            sort_order: SortOrder::Asc,
            ..Default::default()
        })
        .await
        .unwrap();
    let names: Vec<_> = openai.keys.iter().map(|k| k.name.as_str()).collect();
    assert_eq!(names, ["Alpha", "Bravo"]);

    let prod = vault
        .list(&ListOptions {
            tags: vec!["prod".into()],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(prod.total, 2);

    let searched = vault
        .list(&ListOptions {
            search: Some("BILLING".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(searched.keys.len(), 1);
    assert_eq!(searched.keys[0].provider, Provider::Anthropic);

    let page = vault
        .list(&ListOptions {
            sort_by: SortBy::Name,
            sort_order: SortOrder::Desc,
            limit: Some(2),
            offset: 0,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert!(page.has_more);
    assert_eq!(page.keys[0].name, "Charlie");

    let last = vault
        .list(&ListOptions {
            sort_by: SortBy::Name,
            limit: Some(2),
            offset: 2,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(last.keys.len(), 1);
    assert!(!last.has_more);
}

#[tokio::test]
async fn usage_uses_request_weighted_average() {
    let (vault, _) = memory_vault().await;
    let record = vault.add(NewCredential::new(openai_key('s'), "primary")).await.unwrap();

    vault
        .record_usage(
            &record.id,
            UsageDelta {
                requests: 3,
                tokens: 300,
                cost: 0.03,
                response_time_ms: 100.0,
            },
        )
        .await
        .unwrap();
    let stats = vault
        .record_usage(
            &record.id,
            UsageDelta {
                requests: 1,
                tokens: 50,
                cost: 0.01,
                response_time_ms: 500.0,
            },
        )
        .await
        .unwrap();

    assert_eq!(stats.total_requests, 4);
    assert_eq!(stats.total_tokens, 350);
    assert!((stats.average_response_time_ms - 200.0).abs() < 1e-9);
    assert!((stats.total_cost - 0.04).abs() < 1e-9);

    let fetched = vault.get(&record.id).await.unwrap().unwrap();
    assert_eq!(fetched.usage_stats, stats);
    assert!(fetched.metadata.last_used.is_some());

    let negative = UsageDelta {
        cost: -1.0,
        ..Default::default()
    };
    assert!(vault.record_usage(&record.id, negative).await.is_err());
}

#[tokio::test]
async fn export_and_import_round_trip() {
    let (vault, _) = memory_vault().await;
    vault.add(NewCredential::new(openai_key('e'), "one")).await.unwrap();
    vault.add(NewCredential::new(openai_key('f'), "two")).await.unwrap();

    let metadata_only = vault.export_all(false).await.unwrap();
    assert_eq!(metadata_only.items.len(), 2);
    assert!(
        metadata_only
            .items
            .iter()
            .all(|item| matches!(item, ExportedCredential::Metadata(_)))
    );

    let full = serde_json::to_value(vault.export_all(true).await.unwrap()).unwrap();
    assert!(!full.to_string().contains(&openai_key('e')));

    // Same session, empty storage.
    let target_backends = Backends::shared(Arc::new(MemoryStore::new()));
    let target = CredentialVault::open(
        vault.encryption().clone(),
        target_backends,
        accepting_probe(),
        VaultOptions::default(),
    )
    .await
    .unwrap();

    let report = target.import_all(full.clone()).await.unwrap();
    assert_eq!((report.success, report.failed), (2, 0));
    assert_eq!(target.key_count(), 2);

    // Re-importing the same records fails per item.
    let again = target.import_all(full).await.unwrap();
    assert_eq!((again.success, again.failed), (0, 2));
    assert_eq!(again.errors.len(), 2);

    // Metadata-only items carry nothing to import.
    let meta = serde_json::to_value(metadata_only).unwrap();
    let report = target.import_all(meta).await.unwrap();
    assert_eq!(report.failed, 2);

    assert!(target.import_all(json!("garbage")).await.is_err());
}

#[tokio::test]
async fn connection_test_reports_success_and_failure() {
    let backends = Backends::shared(Arc::new(MemoryStore::new()));
    let vault = open_over(backends, accepting_probe()).await;
    let record = vault.add(NewCredential::new(openai_key('c'), "primary")).await.unwrap();

    let result = vault.test_connection(&record.id).await.unwrap();
    assert!(result.success);
    assert!(result.error.is_none());

    let backends = Backends::shared(Arc::new(MemoryStore::new()));
    let rejecting = open_over(
        backends,
        Arc::new(StubProbe {
            delay: Duration::ZERO,
            accept: false,
        }),
    )
    .await;
    let record = rejecting
        .add(NewCredential::new(openai_key('c'), "primary"))
        .await
        .unwrap();
    let result = rejecting.test_connection(&record.id).await.unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("rejected"));

    assert!(matches!(
        rejecting.test_connection("missing").await.unwrap_err(),
        KeywardError::NotFound(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn connection_test_has_a_hard_deadline() {
    let backends = Backends::shared(Arc::new(MemoryStore::new()));
    let vault = open_over(
        backends,
        Arc::new(StubProbe {
            delay: Duration::from_secs(60),
            accept: true,
        }),
    )
    .await;
    let record = vault.add(NewCredential::new(openai_key('h'), "primary")).await.unwrap();

    let result = vault.test_connection(&record.id).await.unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("timed out"));
    assert!(result.response_time_ms >= 10_000);
    assert!(result.response_time_ms < 60_000);
}

#[tokio::test]
async fn legacy_entries_are_migrated_once() {
    let store = Arc::new(MemoryStore::new());
    let backends = Backends::shared(store);
    let legacy = openai_key('l');
    backends.kv.set("apikey:work", json!(legacy)).await.unwrap();
    backends
        .kv
        .set(
            "apikey:claude",
            json!({
                "key": "sk-ant-REDACTED",
                "name": "Claude",
                "tags": ["legacy"]
            }),
        )
        .await
        .unwrap();
    backends.kv.set("apikey:broken", json!("nope")).await.unwrap();

    let vault = open_over(backends.clone(), accepting_probe()).await;
    assert_eq!(vault.key_count(), 2);
    assert!(backends.kv.get("apikey:work").await.unwrap().is_none());
    assert!(backends.kv.get("apikey:claude").await.unwrap().is_none());
    // Unmigratable entries stay where they were.
    assert!(backends.kv.get("apikey:broken").await.unwrap().is_some());
    assert_eq!(
        backends.kv.get("migration:version").await.unwrap(),
        Some(json!(keyward_vault::STORAGE_VERSION))
    );

    let listed = vault.list(&ListOptions::default()).await.unwrap();
    let work = listed.keys.iter().find(|k| k.name == "work").unwrap();
    let secret = vault.get_secret(&work.id).await.unwrap().unwrap();
    assert_eq!(secret.expose_secret(), legacy);

    // Second run is a no-op.
    let report = vault.migrate_legacy().await.unwrap();
    assert!(report.migrated.is_empty());
    assert!(report.skipped.is_empty());
}

#[tokio::test]
async fn health_tracks_the_session() {
    let (vault, _) = memory_vault().await;
    let report = vault.health_check().await;
    assert!(report.healthy);
    assert!(report.encryption_ready && report.session_active);
    assert!(report.metadata_store && report.blob_store);

    vault.encryption().terminate_session();
    let report = vault.health_check().await;
    assert!(!report.session_active);
    assert!(!report.encryption_ready);
    assert!(!report.healthy);
}

#[tokio::test]
async fn operations_require_a_live_session() {
    let (vault, _) = memory_vault().await;
    let record = vault.add(NewCredential::new(openai_key('g'), "primary")).await.unwrap();

    vault.encryption().terminate_session();
    assert!(matches!(
        vault.get(&record.id).await.unwrap_err(),
        KeywardError::SessionExpired
    ));

    vault.encryption().shutdown().await;
    assert!(matches!(
        vault.add(NewCredential::new(openai_key('q'), "x")).await.unwrap_err(),
        KeywardError::NotInitialized
    ));
}

#[tokio::test]
async fn audit_and_cache_stats_are_recorded() {
    let (vault, _) = memory_vault().await;
    let record = vault.add(NewCredential::new(openai_key('k'), "primary")).await.unwrap();
    vault.get(&record.id).await.unwrap();
    vault.get(&record.id).await.unwrap();
    vault.delete(&record.id).await.unwrap();

    let entries = vault.recent_audit(10).await.unwrap();
    assert_eq!(entries[0].event, AuditEvent::Delete);
    assert!(entries.iter().any(|e| e.event == AuditEvent::Create));
    // Audit entries never carry the secret.
    let dump = serde_json::to_string(&entries).unwrap();
    assert!(!dump.contains(&openai_key('k')));

    let stats = vault.cache_stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.size, 0);
}

#[tokio::test]
async fn sqlite_vault_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = KeywardConfig::default();
    config.storage.backend = StorageBackend::Sqlite;
    config.storage.database_path = dir.path().join("keyward.db").to_string_lossy().into_owned();
    config.kdf.algorithm = KdfAlgorithm::Argon2id;
    config.kdf.memory_cost = 32768;
    config.kdf.iterations = 2;
    config.kdf.parallelism = 1;

    let passphrase = SecretString::from(PASSPHRASE.to_string());
    let key = openai_key('w');
    let id = {
        let vault = open_vault(&config, &passphrase).await.unwrap();
        let record = vault.add(NewCredential::new(key.clone(), "persisted")).await.unwrap();
        vault.encryption().shutdown().await;
        record.id
    };

    let vault = open_vault(&config, &passphrase).await.unwrap();
    assert_eq!(vault.key_count(), 1);
    let secret = vault.get_secret(&id).await.unwrap().unwrap();
    assert_eq!(secret.expose_secret(), key);
    vault.encryption().shutdown().await;

    let wrong = open_vault(&config, &SecretString::from("wrong-passphrase".to_string())).await;
    assert!(matches!(wrong, Err(KeywardError::InvalidPassphrase)));
}

#[tokio::test]
async fn wrong_passphrase_never_opens_the_vault() {
    let (vault, backends) = memory_vault().await;
    let first = vault.add(NewCredential::new(openai_key('p'), "first")).await.unwrap();
    vault.encryption().shutdown().await;

    let encryption = EncryptionService::new(backends.kv.clone(), fast_service_options());
    let refused = open_vault_with(
        encryption.clone(),
        backends.clone(),
        accepting_probe(),
        VaultOptions::default(),
        &SecretString::from("wrong-horse-battery".to_string()),
    )
    .await;
    assert!(matches!(refused, Err(KeywardError::InvalidPassphrase)));
    assert!(matches!(
        encryption.ensure_active().unwrap_err(),
        KeywardError::NotInitialized
    ));

    let reopened = open_over(backends, accepting_probe()).await;
    let second = reopened.add(NewCredential::new(openai_key('q'), "second")).await.unwrap();
    for (id, seed) in [(&first.id, 'p'), (&second.id, 'q')] {
        let secret = reopened.get_secret(id).await.unwrap().unwrap();
        assert_eq!(secret.expose_secret(), openai_key(seed));
    }
}
