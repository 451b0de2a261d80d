// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as KDF cost floors and non-zero timeouts.

use crate::diagnostic::ConfigError;
use crate::model::{KdfAlgorithm, KeywardConfig, StorageBackend};

/// Lowest Argon2id memory cost accepted from configuration, in KiB.
pub const MIN_ARGON2_MEMORY_COST: u32 = 32768;

/// Lowest PBKDF2 round count accepted from configuration.
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &KeywardConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    match config.kdf.algorithm {
        KdfAlgorithm::Argon2id => {
            if config.kdf.memory_cost < MIN_ARGON2_MEMORY_COST {
                fail(format!(
                    "kdf.memory_cost must be at least {MIN_ARGON2_MEMORY_COST} (32 MiB), got {}",
                    config.kdf.memory_cost
                ));
            }
            if config.kdf.iterations < 2 {
                fail(format!(
                    "kdf.iterations must be at least 2, got {}",
                    config.kdf.iterations
                ));
            }
            if config.kdf.parallelism < 1 {
                fail(format!(
                    "kdf.parallelism must be at least 1, got {}",
                    config.kdf.parallelism
                ));
            }
        }
        KdfAlgorithm::Pbkdf2 => {
            if config.kdf.pbkdf2_iterations < MIN_PBKDF2_ITERATIONS {
                fail(format!(
                    "kdf.pbkdf2_iterations must be at least {MIN_PBKDF2_ITERATIONS}, got {}",
                    config.kdf.pbkdf2_iterations
                ));
            }
        }
    }

    if config.session.idle_timeout_secs == 0 {
        fail("session.idle_timeout_secs must be greater than 0".to_string());
    }

    if config.session.key_rotation_enabled && config.session.key_rotation_interval_secs == 0 {
        fail("session.key_rotation_interval_secs must be greater than 0 when rotation is enabled"
            .to_string());
    }

    if config.cache.capacity == 0 {
        fail("cache.capacity must be greater than 0".to_string());
    }

    if config.bulk.batch_size == 0 {
        fail("bulk.batch_size must be greater than 0".to_string());
    }

    if config.storage.backend == StorageBackend::Sqlite
        && config.storage.database_path.trim().is_empty()
    {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.connection.timeout_secs == 0 {
        fail("connection.timeout_secs must be greater than 0".to_string());
    }

    for (provider, endpoint) in &config.connection.endpoints {
        if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
            fail(format!(
                "connection.endpoints.{provider} must be an http(s) URL, got `{endpoint}`"
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
