// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Master-secret derivation and purpose-scoped subkeys.
//!
//! The master secret is derived from a passphrase with Argon2id
//! (Algorithm::Argon2id, Version::V0x13) or PBKDF2-HMAC-SHA256, then every
//! working key is expanded from it with HKDF-SHA256 using an info string of
//! the form `keyward:<purpose>:v<generation>`.

use std::fmt;
use std::num::NonZeroU32;

use chrono::{DateTime, Utc};
use keyward_config::model::{KdfAlgorithm, KdfConfig};
use keyward_core::KeywardError;
use ring::{hkdf, pbkdf2};
use zeroize::Zeroizing;

use crate::primitives::{self, KEY_LEN};

/// Salt length generated for new master keys.
pub const SALT_LEN: usize = 16;

/// Shortest passphrase accepted when creating or restoring a master key.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Password KDF and its cost parameters.
///
/// Built from [`KdfConfig`] in production. Tests construct it directly with
/// low costs, since the floors are enforced by config validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfParams {
    Argon2id {
        memory_cost: u32,
        iterations: u32,
        parallelism: u32,
    },
    Pbkdf2 {
        iterations: u32,
    },
}

impl KdfParams {
    pub fn from_config(config: &KdfConfig) -> Self {
        match config.algorithm {
            KdfAlgorithm::Argon2id => Self::Argon2id {
                memory_cost: config.memory_cost,
                iterations: config.iterations,
                parallelism: config.parallelism,
            },
            KdfAlgorithm::Pbkdf2 => Self::Pbkdf2 {
                iterations: config.pbkdf2_iterations,
            },
        }
    }

    /// Run the password KDF. CPU and memory heavy; call off the async
    /// executor.
    pub fn derive(&self, password: &[u8], salt: &[u8]) -> Result<MasterSecret, KeywardError> {
        let mut output = Zeroizing::new([0u8; KEY_LEN]);
        match *self {
            Self::Argon2id {
                memory_cost,
                iterations,
                parallelism,
            } => {
                let params =
                    argon2::Params::new(memory_cost, iterations, parallelism, Some(KEY_LEN))
                        .map_err(|e| {
                            KeywardError::Config(format!("invalid Argon2id parameters: {e}"))
                        })?;
                argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params)
                    .hash_password_into(password, salt, output.as_mut())
                    .map_err(|e| {
                        KeywardError::Internal(format!("Argon2id key derivation failed: {e}"))
                    })?;
            }
            Self::Pbkdf2 { iterations } => {
                let rounds = NonZeroU32::new(iterations).ok_or_else(|| {
                    KeywardError::Config("pbkdf2 iterations must be non-zero".into())
                })?;
                pbkdf2::derive(
                    pbkdf2::PBKDF2_HMAC_SHA256,
                    rounds,
                    salt,
                    password,
                    output.as_mut(),
                );
            }
        }
        Ok(MasterSecret(output))
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Argon2id { .. } => "argon2id",
            Self::Pbkdf2 { .. } => "pbkdf2",
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::from_config(&KdfConfig::default())
    }
}

/// The session's root secret. Zeroized on drop.
pub struct MasterSecret(Zeroizing<[u8; KEY_LEN]>);

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret([REDACTED])")
    }
}

/// A purpose-scoped working key. Zeroized on drop.
#[derive(Clone)]
pub struct DerivedKey {
    purpose: String,
    generation: u32,
    key: Zeroizing<[u8; KEY_LEN]>,
    created_at: DateTime<Utc>,
}

impl DerivedKey {
    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    /// Rotation counter the key was derived for. Written into
    /// `EncryptedBlob::version`.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("purpose", &self.purpose)
            .field("generation", &self.generation)
            .field("key", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Owns the master secret for one session and expands subkeys from it.
pub struct KeyDerivationManager {
    params: KdfParams,
    master: Option<MasterSecret>,
}

impl KeyDerivationManager {
    pub fn new(params: KdfParams) -> Self {
        Self {
            params,
            master: None,
        }
    }

    pub fn params(&self) -> KdfParams {
        self.params
    }

    /// Derive a master key under a fresh random salt and keep it.
    /// Returns the salt, which the caller must persist.
    pub fn create_master_key(&mut self, password: &str) -> Result<[u8; SALT_LEN], KeywardError> {
        check_password(password)?;
        let salt = generate_salt()?;
        self.master = Some(self.params.derive(password.as_bytes(), &salt)?);
        tracing::debug!(kdf = self.params.name(), "master key created");
        Ok(salt)
    }

    /// Re-derive the master key from a persisted salt.
    pub fn restore_master_key(&mut self, password: &str, salt: &[u8]) -> Result<(), KeywardError> {
        check_password(password)?;
        check_salt(salt)?;
        self.master = Some(self.params.derive(password.as_bytes(), salt)?);
        tracing::debug!(kdf = self.params.name(), "master key restored");
        Ok(())
    }

    /// Install a master secret derived elsewhere (e.g. on a blocking thread).
    pub fn set_master(&mut self, master: MasterSecret) {
        self.master = Some(master);
    }

    pub fn has_master_key(&self) -> bool {
        self.master.is_some()
    }

    /// HKDF-SHA256 subkey for `purpose` at `generation`.
    pub fn derive_key(&self, purpose: &str, generation: u32) -> Result<DerivedKey, KeywardError> {
        let master = self.master.as_ref().ok_or(KeywardError::NotInitialized)?;
        let info = hkdf_info(purpose, generation);

        let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, &[]).extract(&master.0[..]);
        let info_slices = [info.as_bytes()];
        let okm = prk
            .expand(&info_slices, hkdf::HKDF_SHA256)
            .map_err(|_| KeywardError::Internal("HKDF expand failed".into()))?;

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        okm.fill(&mut key[..])
            .map_err(|_| KeywardError::Internal("HKDF fill failed".into()))?;

        Ok(DerivedKey {
            purpose: purpose.to_string(),
            generation,
            key,
            created_at: Utc::now(),
        })
    }

    /// Zeroize and drop the master secret.
    pub fn clear_master_key(&mut self) {
        if self.master.take().is_some() {
            tracing::debug!("master key cleared");
        }
    }
}

impl fmt::Debug for KeyDerivationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDerivationManager")
            .field("params", &self.params)
            .field("master", &self.master.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn hkdf_info(purpose: &str, generation: u32) -> String {
    format!("keyward:{purpose}:v{generation}")
}

/// Reject passphrases shorter than [`MIN_PASSWORD_LEN`] characters.
pub fn check_password(password: &str) -> Result<(), KeywardError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(KeywardError::WeakPassword {
            min_len: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

/// Reject salts shorter than [`SALT_LEN`] bytes.
pub fn check_salt(salt: &[u8]) -> Result<(), KeywardError> {
    if salt.len() < SALT_LEN {
        return Err(KeywardError::Validation(format!(
            "salt must be at least {SALT_LEN} bytes, got {}",
            salt.len()
        )));
    }
    Ok(())
}

/// Generate a random salt for a new master key.
pub fn generate_salt() -> Result<[u8; SALT_LEN], KeywardError> {
    primitives::random_bytes()
}
