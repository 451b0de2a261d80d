// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session-scoped encryption service.
//!
//! The service owns the master secret (through [`KeyDerivationManager`]),
//! caches purpose keys for the session, and gates every operation on the
//! session state. Idle sessions expire: the master secret and key cache are
//! wiped, the persisted salt is kept so the session can be restored.
//!
//! Next to the salt the service keeps a verifier: a known plaintext sealed
//! under a key derived from the master secret. Restoring a session opens it
//! first, so a wrong passphrase is refused before any data is touched.
//!
//! Session state lives behind a `std::sync::Mutex` that is never held across
//! an `.await`. Password hashing runs on the blocking pool, outside the lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use keyward_config::KeywardConfig;
use keyward_core::{KeyValueStore, KeywardError};
use serde_json::Value;
use strum::Display;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::bulk::{self, BulkOptions, BulkResult};
use crate::fields::{self, FieldMap};
use crate::integrity::{self, IntegrityCheck};
use crate::kdf::{self, DerivedKey, KdfParams, KeyDerivationManager, MasterSecret};
use crate::payload::{DataType, Payload};
use crate::primitives::{self, EncryptedBlob};
use crate::tasks;

/// Purpose of the key that protects vault payloads.
pub const DATA_PURPOSE: &str = "encryption";

/// Store key holding the base64 KDF salt.
pub const SALT_KEY: &str = "salt";

/// Store key holding the per-purpose key generations.
pub const KEYGEN_KEY: &str = "keygen";

/// Store key holding the sealed passphrase verifier.
pub const VERIFIER_KEY: &str = "verifier";

const VERIFIER_PURPOSE: &str = "verifier";
const VERIFIER_PLAINTEXT: &[u8] = b"keyward-passphrase-verifier";

/// Lifecycle of an [`EncryptionService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    SessionActive,
    SessionExpired,
    Shutdown,
}

/// Runtime settings for an [`EncryptionService`].
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub kdf: KdfParams,
    pub idle_timeout: Duration,
    /// Interval of the scheduled key rotation; `None` disables it.
    pub key_rotation_interval: Option<Duration>,
    /// Interval of the key-cache cleanup; `None` disables it.
    pub memory_cleanup_interval: Option<Duration>,
    /// Default batch size for bulk calls.
    pub batch_size: usize,
}

impl ServiceOptions {
    pub fn from_config(config: &KeywardConfig) -> Self {
        let session = &config.session;
        Self {
            kdf: KdfParams::from_config(&config.kdf),
            idle_timeout: session.idle_timeout(),
            key_rotation_interval: session
                .key_rotation_enabled
                .then(|| session.key_rotation_interval()),
            memory_cleanup_interval: session.memory_cleanup_interval(),
            batch_size: config.bulk.batch_size,
        }
    }

    /// Bulk options using the configured batch size.
    pub fn bulk(&self, fail_fast: bool) -> BulkOptions {
        BulkOptions {
            batch_size: self.batch_size,
            fail_fast,
        }
    }
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self::from_config(&KeywardConfig::default())
    }
}

struct Inner {
    state: SessionState,
    kdm: KeyDerivationManager,
    /// Cached purpose keys by (purpose, generation).
    keys: HashMap<(String, u32), DerivedKey>,
    generations: BTreeMap<String, u32>,
    last_activity: Instant,
    session_token: Option<CancellationToken>,
}

impl Inner {
    fn generation(&self, purpose: &str) -> u32 {
        self.generations.get(purpose).copied().unwrap_or(1)
    }

    fn key(&mut self, purpose: &str, generation: u32) -> Result<DerivedKey, KeywardError> {
        let slot = (purpose.to_string(), generation);
        if let Some(key) = self.keys.get(&slot) {
            return Ok(key.clone());
        }
        let key = self.kdm.derive_key(purpose, generation)?;
        self.keys.insert(slot, key.clone());
        Ok(key)
    }

    fn wipe(&mut self) {
        self.kdm.clear_master_key();
        self.keys.clear();
        if let Some(token) = self.session_token.take() {
            token.cancel();
        }
    }

    fn expire(&mut self, reason: &str) {
        self.wipe();
        self.state = SessionState::SessionExpired;
        info!(reason, "encryption session expired");
    }
}

/// Session-gated encrypt/decrypt over a single master secret.
pub struct EncryptionService {
    store: Arc<dyn KeyValueStore>,
    options: ServiceOptions,
    inner: Mutex<Inner>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EncryptionService {
    pub fn new(store: Arc<dyn KeyValueStore>, options: ServiceOptions) -> Arc<Self> {
        Arc::new(Self {
            store,
            inner: Mutex::new(Inner {
                state: SessionState::Uninitialized,
                kdm: KeyDerivationManager::new(options.kdf),
                keys: HashMap::new(),
                generations: BTreeMap::new(),
                last_activity: Instant::now(),
                session_token: None,
            }),
            options,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state. An idle session past its deadline is expired here.
    pub fn state(&self) -> SessionState {
        let mut inner = self.lock();
        if inner.state == SessionState::SessionActive
            && inner.last_activity.elapsed() >= self.options.idle_timeout
        {
            inner.expire("idle timeout");
        }
        inner.state
    }

    pub fn is_session_active(&self) -> bool {
        self.state() == SessionState::SessionActive
    }

    /// Fail unless the session is active. Counts as activity.
    pub fn ensure_active(&self) -> Result<(), KeywardError> {
        self.ensure_session(true)
    }

    fn ensure_session(&self, touch: bool) -> Result<(), KeywardError> {
        self.session(touch).map(|_| ())
    }

    /// Lock the session for an operation. `touch` resets the idle timer.
    fn session(&self, touch: bool) -> Result<MutexGuard<'_, Inner>, KeywardError> {
        let mut inner = self.lock();
        match inner.state {
            SessionState::SessionActive => {
                let now = Instant::now();
                if now.duration_since(inner.last_activity) >= self.options.idle_timeout {
                    inner.expire("idle timeout");
                    return Err(KeywardError::SessionExpired);
                }
                if touch {
                    inner.last_activity = now;
                }
                Ok(inner)
            }
            SessionState::SessionExpired => Err(KeywardError::SessionExpired),
            SessionState::Uninitialized | SessionState::Initializing | SessionState::Shutdown => {
                Err(KeywardError::NotInitialized)
            }
        }
    }

    // --- lifecycle -------------------------------------------------------

    /// Create a new master key from `password` and persist its salt.
    ///
    /// Refused once a salt is persisted: a new salt would orphan every
    /// existing blob. Use [`unlock`](Self::unlock) for an existing vault.
    pub async fn initialize(self: &Arc<Self>, password: &str) -> Result<(), KeywardError> {
        kdf::check_password(password)?;
        let previous = self.begin_initializing()?;

        let result = async {
            if self.persisted_salt().await?.is_some() {
                return Err(KeywardError::Validation(
                    "vault already initialized; use unlock".into(),
                ));
            }
            let salt = kdf::generate_salt()?;
            let kdm = self.derive_manager(password, salt.to_vec()).await?;
            // Verifier before salt: a salt is never persisted without one.
            self.store_verifier(&kdm).await?;
            self.store
                .set(SALT_KEY, Value::String(STANDARD.encode(salt)))
                .await?;
            let generations = self.load_generations().await?;
            Ok::<_, KeywardError>((kdm, generations))
        }
        .await;

        self.finish_initializing(previous, result, "initialized")
    }

    /// Re-derive the master key from a previously persisted salt.
    ///
    /// Fails with [`KeywardError::InvalidPassphrase`] when the derived key
    /// does not open the persisted verifier; the state is left as it was.
    pub async fn restore_from_salt(
        self: &Arc<Self>,
        password: &str,
        salt: &[u8],
    ) -> Result<(), KeywardError> {
        kdf::check_password(password)?;
        kdf::check_salt(salt)?;
        let previous = self.begin_initializing()?;

        let result = async {
            let kdm = self.derive_manager(password, salt.to_vec()).await?;
            match self.store.get(VERIFIER_KEY).await? {
                Some(value) => check_verifier(&kdm, &EncryptedBlob::from_value(&value)?)?,
                None => {
                    // Vault written before verifiers existed.
                    self.store_verifier(&kdm).await?;
                    info!("passphrase verifier added to existing vault");
                }
            }
            let generations = self.load_generations().await?;
            Ok::<_, KeywardError>((kdm, generations))
        }
        .await;

        self.finish_initializing(previous, result, "restored")
    }

    /// Restore from the persisted salt when there is one, else initialize.
    pub async fn unlock(self: &Arc<Self>, password: &str) -> Result<(), KeywardError> {
        match self.persisted_salt().await? {
            Some(salt) => self.restore_from_salt(password, &salt).await,
            None => self.initialize(password).await,
        }
    }

    /// Salt written by a previous `initialize`, if any.
    pub async fn persisted_salt(&self) -> Result<Option<Vec<u8>>, KeywardError> {
        match self.store.get(SALT_KEY).await? {
            None => Ok(None),
            Some(Value::String(encoded)) => STANDARD
                .decode(encoded)
                .map(Some)
                .map_err(|e| KeywardError::InvalidFormat(format!("persisted salt: {e}"))),
            Some(_) => Err(KeywardError::InvalidFormat(
                "persisted salt is not a string".into(),
            )),
        }
    }

    fn begin_initializing(&self) -> Result<SessionState, KeywardError> {
        let mut inner = self.lock();
        match inner.state {
            SessionState::Uninitialized | SessionState::SessionExpired => {
                let previous = inner.state;
                inner.state = SessionState::Initializing;
                Ok(previous)
            }
            SessionState::Initializing => Err(KeywardError::Validation(
                "session initialization already in progress".into(),
            )),
            SessionState::SessionActive => Err(KeywardError::Validation(
                "session is already active".into(),
            )),
            SessionState::Shutdown => Err(KeywardError::NotInitialized),
        }
    }

    fn finish_initializing(
        self: &Arc<Self>,
        previous: SessionState,
        result: Result<(KeyDerivationManager, BTreeMap<String, u32>), KeywardError>,
        how: &str,
    ) -> Result<(), KeywardError> {
        let token = {
            let mut inner = self.lock();
            if inner.state != SessionState::Initializing {
                // Shut down while the KDF ran.
                return Err(KeywardError::NotInitialized);
            }
            let (kdm, generations) = match result {
                Ok(parts) => parts,
                Err(e) => {
                    inner.state = previous;
                    warn!(error = %e, "encryption session setup failed");
                    return Err(e);
                }
            };
            inner.kdm = kdm;
            inner.keys.clear();
            inner.generations = generations;
            inner.last_activity = Instant::now();
            inner.state = SessionState::SessionActive;
            let token = self.shutdown.child_token();
            inner.session_token = Some(token.clone());
            token
        };

        info!(
            idle_timeout_secs = self.options.idle_timeout.as_secs(),
            "encryption session {how}"
        );
        self.spawn_session_tasks(token);
        Ok(())
    }

    async fn derive_master(
        &self,
        password: &str,
        salt: Vec<u8>,
    ) -> Result<MasterSecret, KeywardError> {
        let params = self.options.kdf;
        let password = Zeroizing::new(password.as_bytes().to_vec());
        tokio::task::spawn_blocking(move || params.derive(&password, &salt))
            .await
            .map_err(|e| KeywardError::Internal(format!("key derivation task failed: {e}")))?
    }

    async fn derive_manager(
        &self,
        password: &str,
        salt: Vec<u8>,
    ) -> Result<KeyDerivationManager, KeywardError> {
        let mut kdm = KeyDerivationManager::new(self.options.kdf);
        kdm.set_master(self.derive_master(password, salt).await?);
        Ok(kdm)
    }

    async fn store_verifier(&self, kdm: &KeyDerivationManager) -> Result<(), KeywardError> {
        let key = kdm.derive_key(VERIFIER_PURPOSE, 1)?;
        let sealed = primitives::encrypt(VERIFIER_PLAINTEXT, key.as_bytes(), key.generation())?;
        self.store
            .set(VERIFIER_KEY, serde_json::to_value(&sealed).map_err(internal)?)
            .await
    }

    fn spawn_session_tasks(self: &Arc<Self>, token: CancellationToken) {
        let handles = tasks::spawn_session_tasks(self, token);
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|handle| !handle.is_finished());
        tasks.extend(handles);
    }

    /// End the session now: wipe keys and the master secret, keep the salt.
    pub fn terminate_session(&self) {
        let mut inner = self.lock();
        if inner.state == SessionState::SessionActive {
            inner.expire("terminated");
        }
    }

    /// Terminal shutdown: cancel background tasks and wipe all key material.
    pub async fn shutdown(&self) {
        {
            let mut inner = self.lock();
            if inner.state == SessionState::Shutdown {
                return;
            }
            inner.wipe();
            inner.state = SessionState::Shutdown;
        }
        self.shutdown.cancel();

        let handles: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "session task ended abnormally");
            }
        }
        info!("encryption service shut down");
    }

    /// Deadline of the idle timer, or `None` once the session is no longer
    /// active. Expires the session when the deadline has passed.
    pub(crate) fn idle_deadline(&self) -> Option<Instant> {
        let mut inner = self.lock();
        if inner.state != SessionState::SessionActive {
            return None;
        }
        let deadline = inner.last_activity + self.options.idle_timeout;
        if Instant::now() >= deadline {
            inner.expire("idle timeout");
            return None;
        }
        Some(deadline)
    }

    // --- keys ------------------------------------------------------------

    /// Cached or freshly derived key for `purpose` at its current generation.
    pub fn get_encryption_key(&self, purpose: &str) -> Result<DerivedKey, KeywardError> {
        let mut inner = self.session(true)?;
        let generation = inner.generation(purpose);
        inner.key(purpose, generation)
    }

    /// Current generation of `purpose`.
    pub fn key_generation(&self, purpose: &str) -> Result<u32, KeywardError> {
        Ok(self.session(false)?.generation(purpose))
    }

    /// Move `purpose` to its next generation. Existing blobs are not
    /// re-encrypted; they stay readable under their recorded generation.
    pub async fn rotate_key(&self, purpose: &str) -> Result<u32, KeywardError> {
        self.rotate(purpose, true).await
    }

    /// Persists the bumped generation before the session sees it, so a
    /// failed write leaves the current key in place.
    async fn rotate(&self, purpose: &str, touch: bool) -> Result<u32, KeywardError> {
        let (generation, snapshot) = {
            let inner = self.session(touch)?;
            let next = inner.generation(purpose) + 1;
            let mut snapshot = inner.generations.clone();
            snapshot.insert(purpose.to_string(), next);
            (next, snapshot)
        };
        self.store
            .set(KEYGEN_KEY, serde_json::to_value(&snapshot).map_err(internal)?)
            .await?;
        {
            let mut inner = self.session(false)?;
            if inner.generation(purpose) < generation {
                inner.keys.retain(|(p, _), _| p != purpose);
                inner.generations.insert(purpose.to_string(), generation);
            }
            inner.key(purpose, generation)?;
        }
        info!(purpose, generation, "encryption key rotated");
        Ok(generation)
    }

    /// Rotate every purpose with a cached key. Used by the scheduler, so it
    /// does not count as session activity. Per-purpose failures are logged.
    pub async fn rotate_cached_keys(&self) -> Result<Vec<String>, KeywardError> {
        let purposes: Vec<String> = {
            let inner = self.session(false)?;
            let mut purposes: Vec<String> = inner.keys.keys().map(|(p, _)| p.clone()).collect();
            purposes.sort();
            purposes.dedup();
            purposes
        };

        let mut rotated = Vec::with_capacity(purposes.len());
        for purpose in purposes {
            match self.rotate(&purpose, false).await {
                Ok(_) => rotated.push(purpose),
                Err(e) => warn!(purpose = %purpose, error = %e, "scheduled key rotation failed"),
            }
        }
        Ok(rotated)
    }

    /// Drop cached purpose keys without ending the session.
    pub fn clear_memory(&self) {
        let mut inner = self.lock();
        let dropped = inner.keys.len();
        inner.keys.clear();
        debug!(dropped, "key cache cleared");
    }

    /// Number of purpose keys currently cached.
    pub fn cached_key_count(&self) -> usize {
        self.lock().keys.len()
    }

    async fn load_generations(&self) -> Result<BTreeMap<String, u32>, KeywardError> {
        match self.store.get(KEYGEN_KEY).await? {
            None => Ok(BTreeMap::new()),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| KeywardError::InvalidFormat(format!("persisted key generations: {e}"))),
        }
    }

    // --- encryption ------------------------------------------------------

    fn seal(&self, purpose: &str, plaintext: &[u8]) -> Result<EncryptedBlob, KeywardError> {
        let key = {
            let mut inner = self.session(true)?;
            let generation = inner.generation(purpose);
            inner.key(purpose, generation)?
        };
        primitives::encrypt(plaintext, key.as_bytes(), key.generation())
    }

    fn open(&self, purpose: &str, blob: &EncryptedBlob) -> Result<Vec<u8>, KeywardError> {
        let mut inner = self.session(true)?;
        blob.validate()?;
        let key = inner.key(purpose, blob.version)?;
        drop(inner);
        primitives::decrypt(blob, key.as_bytes())
    }

    /// Encrypt a typed payload under the data key.
    pub fn encrypt_data(&self, payload: &Payload) -> Result<EncryptedBlob, KeywardError> {
        self.ensure_session(false)?;
        let plaintext = payload.to_bytes()?;
        self.seal(DATA_PURPOSE, &plaintext)
    }

    /// Decrypt `blob` back into a payload of `data_type`.
    pub fn decrypt_data(
        &self,
        blob: &EncryptedBlob,
        data_type: DataType,
    ) -> Result<Payload, KeywardError> {
        let plaintext = self.open(DATA_PURPOSE, blob)?;
        Payload::from_bytes(plaintext, data_type)
    }

    /// Encrypt the fields of `object` marked for encryption.
    pub fn encrypt_fields(&self, object: &Value, fields: &FieldMap) -> Result<Value, KeywardError> {
        self.ensure_session(false)?;
        fields::transform(object, fields, |_, value| {
            let plaintext = Zeroizing::new(serde_json::to_vec(value).map_err(internal)?);
            let blob = self.seal(DATA_PURPOSE, &plaintext)?;
            serde_json::to_value(blob).map_err(internal)
        })
    }

    /// Reverse of [`encrypt_fields`](Self::encrypt_fields).
    pub fn decrypt_fields(&self, object: &Value, fields: &FieldMap) -> Result<Value, KeywardError> {
        self.ensure_session(false)?;
        fields::transform(object, fields, |name, value| {
            let blob = EncryptedBlob::from_value(value).map_err(|_| {
                KeywardError::InvalidFormat(format!("field `{name}` is not an encrypted blob"))
            })?;
            let plaintext = Zeroizing::new(self.open(DATA_PURPOSE, &blob)?);
            serde_json::from_slice(&plaintext).map_err(|_| {
                KeywardError::InvalidFormat(format!("field `{name}` did not decrypt to JSON"))
            })
        })
    }

    /// Encrypt many payloads, collecting per-item failures.
    pub async fn encrypt_bulk(
        &self,
        items: Vec<Payload>,
        options: BulkOptions,
    ) -> Result<BulkResult<EncryptedBlob>, KeywardError> {
        self.ensure_session(true)?;
        bulk::run_batched(items, options, |payload| self.encrypt_data(&payload)).await
    }

    /// Decrypt many blobs of one data type, collecting per-item failures.
    pub async fn decrypt_bulk(
        &self,
        blobs: Vec<EncryptedBlob>,
        data_type: DataType,
        options: BulkOptions,
    ) -> Result<BulkResult<Payload>, KeywardError> {
        self.ensure_session(true)?;
        bulk::run_batched(blobs, options, |blob| self.decrypt_data(&blob, data_type)).await
    }

    // --- integrity -------------------------------------------------------

    /// Hash `data`, comparing against `expected` when given.
    pub fn verify_integrity(
        &self,
        data: &[u8],
        expected: Option<&str>,
    ) -> Result<IntegrityCheck, KeywardError> {
        self.ensure_session(true)?;
        Ok(integrity::verify(data, expected))
    }

    pub fn create_integrity_checksum(&self, blob: &EncryptedBlob) -> Result<String, KeywardError> {
        self.ensure_session(true)?;
        Ok(integrity::checksum(blob))
    }

    pub fn validate_integrity_checksum(
        &self,
        blob: &EncryptedBlob,
        checksum: &str,
    ) -> Result<bool, KeywardError> {
        self.ensure_session(true)?;
        Ok(integrity::validate(blob, checksum))
    }

    /// SHA-256 hex of `data`. Needs no session.
    pub fn hash(&self, data: &[u8]) -> String {
        primitives::hash(data)
    }
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Open the persisted verifier with the key `kdm` derives. A tag mismatch means
/// the passphrase does not belong to this vault.
fn check_verifier(kdm: &KeyDerivationManager, sealed: &EncryptedBlob) -> Result<(), KeywardError> {
    let key = kdm.derive_key(VERIFIER_PURPOSE, sealed.version)?;
    match primitives::decrypt(sealed, key.as_bytes()) {
        Ok(plaintext) if plaintext == VERIFIER_PLAINTEXT => Ok(()),
        Ok(_) | Err(KeywardError::DecryptionFailed) => Err(KeywardError::InvalidPassphrase),
        Err(e) => Err(e),
    }
}

fn internal(e: serde_json::Error) -> KeywardError {
    KeywardError::Internal(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_storage::MemoryStore;
    use serde_json::json;
    use tracing_test::traced_test;

    fn fast_options() -> ServiceOptions {
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

    async fn active() -> (Arc<EncryptionService>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = EncryptionService::new(store.clone(), fast_options());
        service.initialize("correct-horse-battery").await.unwrap();
        (service, store)
    }

    #[tokio::test]
    async fn operations_before_initialize_fail() {
        let service = EncryptionService::new(Arc::new(MemoryStore::new()), fast_options());
        assert_eq!(service.state(), SessionState::Uninitialized);
        assert!(matches!(
            service.encrypt_data(&Payload::from("x")).unwrap_err(),
            KeywardError::NotInitialized
        ));
    }

    #[tokio::test]
    async fn initialize_persists_salt() {
        let (service, store) = active().await;
        assert!(service.is_session_active());
        let kv: Arc<dyn KeyValueStore> = store;
        let salt = kv.get(SALT_KEY).await.unwrap().unwrap();
        let decoded = STANDARD.decode(salt.as_str().unwrap()).unwrap();
        assert_eq!(decoded.len(), kdf::SALT_LEN);
    }

    #[tokio::test]
    async fn weak_password_leaves_state_untouched() {
        let service = EncryptionService::new(Arc::new(MemoryStore::new()), fast_options());
        assert!(matches!(
            service.initialize("short").await.unwrap_err(),
            KeywardError::WeakPassword { .. }
        ));
        assert_eq!(service.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn double_initialize_is_rejected() {
        let (service, _) = active().await;
        assert!(matches!(
            service.initialize("correct-horse-battery").await.unwrap_err(),
            KeywardError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn initialize_seals_a_verifier_next_to_the_salt() {
        let (_, store) = active().await;
        let kv: Arc<dyn KeyValueStore> = store;
        let sealed = EncryptedBlob::from_value(&kv.get(VERIFIER_KEY).await.unwrap().unwrap())
            .unwrap();
        assert!(!sealed.data.windows(VERIFIER_PLAINTEXT.len()).any(|w| w == VERIFIER_PLAINTEXT));
    }

    #[tokio::test]
    async fn wrong_passphrase_keeps_session_expired() {
        let (service, _) = active().await;
        service.terminate_session();

        assert!(matches!(
            service.unlock("battery-horse-wrong").await.unwrap_err(),
            KeywardError::InvalidPassphrase
        ));
        assert_eq!(service.state(), SessionState::SessionExpired);
        assert_eq!(service.cached_key_count(), 0);

        service.unlock("correct-horse-battery").await.unwrap();
        assert!(service.is_session_active());
    }

    #[tokio::test]
    async fn restore_without_verifier_adopts_the_passphrase() {
        let (service, store) = active().await;
        let blob = service.encrypt_data(&Payload::from("older vault")).unwrap();
        service.terminate_session();
        let kv: Arc<dyn KeyValueStore> = store;
        kv.remove(VERIFIER_KEY).await.unwrap();

        service.unlock("correct-horse-battery").await.unwrap();
        assert!(kv.get(VERIFIER_KEY).await.unwrap().is_some());
        assert!(service.decrypt_data(&blob, DataType::Text).is_ok());

        service.terminate_session();
        assert!(matches!(
            service.unlock("battery-horse-wrong").await.unwrap_err(),
            KeywardError::InvalidPassphrase
        ));
    }

    #[tokio::test]
    async fn text_object_binary_round_trip() {
        let (service, _) = active().await;
        for payload in [
            Payload::Text("hello vault".into()),
            Payload::Object(json!({ "nested": { "n": 1 }, "list": [true] })),
            Payload::Binary(vec![0, 1, 2, 255]),
        ] {
            let blob = service.encrypt_data(&payload).unwrap();
            let back = service.decrypt_data(&blob, payload.data_type()).unwrap();
            assert_eq!(back, payload);
        }
    }

    #[tokio::test]
    async fn key_cache_is_reused_until_rotation() {
        let (service, _) = active().await;
        let a = service.get_encryption_key(DATA_PURPOSE).unwrap();
        let b = service.get_encryption_key(DATA_PURPOSE).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_eq!(a.created_at(), b.created_at());

        service.rotate_key(DATA_PURPOSE).await.unwrap();
        let c = service.get_encryption_key(DATA_PURPOSE).unwrap();
        assert_ne!(a.as_bytes(), c.as_bytes());
        assert_eq!(c.generation(), 2);
    }

    #[tokio::test]
    async fn clear_memory_keeps_session() {
        let (service, _) = active().await;
        service.get_encryption_key(DATA_PURPOSE).unwrap();
        assert_eq!(service.cached_key_count(), 1);
        service.clear_memory();
        assert_eq!(service.cached_key_count(), 0);
        assert!(service.is_session_active());
        assert!(service.get_encryption_key(DATA_PURPOSE).is_ok());
    }

    #[tokio::test]
    async fn terminate_then_unlock_restores_data_access() {
        let (service, _) = active().await;
        let blob = service.encrypt_data(&Payload::from("persisted")).unwrap();

        service.terminate_session();
        assert_eq!(service.state(), SessionState::SessionExpired);
        assert!(matches!(
            service.decrypt_data(&blob, DataType::Text).unwrap_err(),
            KeywardError::SessionExpired
        ));

        service.unlock("correct-horse-battery").await.unwrap();
        let back = service.decrypt_data(&blob, DataType::Text).unwrap();
        assert_eq!(back.as_text(), Some("persisted"));
    }

    #[tokio::test]
    async fn shutdown_is_terminal() {
        let (service, _) = active().await;
        service.shutdown().await;
        assert_eq!(service.state(), SessionState::Shutdown);
        assert!(matches!(
            service.get_encryption_key(DATA_PURPOSE).unwrap_err(),
            KeywardError::NotInitialized
        ));
        assert!(matches!(
            service.unlock("correct-horse-battery").await.unwrap_err(),
            KeywardError::NotInitialized
        ));
    }

    #[tokio::test]
    async fn integrity_helpers_are_session_gated() {
        let (service, _) = active().await;
        let blob = service.encrypt_data(&Payload::from("sum me")).unwrap();
        let sum = service.create_integrity_checksum(&blob).unwrap();
        assert!(service.validate_integrity_checksum(&blob, &sum).unwrap());

        service.terminate_session();
        assert!(matches!(
            service.create_integrity_checksum(&blob).unwrap_err(),
            KeywardError::SessionExpired
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn session_logs_never_contain_the_password() {
        let (service, _) = active().await;
        service.terminate_session();
        assert!(logs_contain("encryption session initialized"));
        assert!(logs_contain("encryption session expired"));
        assert!(!logs_contain("correct-horse-battery"));
    }
}
