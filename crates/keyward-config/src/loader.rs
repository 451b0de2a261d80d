// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./keyward.toml` > `~/.config/keyward/keyward.toml` > `/etc/keyward/keyward.toml`
//! with environment variable overrides via `KEYWARD_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::KeywardConfig;

/// Config sections that environment variables may target.
const ENV_SECTIONS: &[&str] = &[
    "kdf",
    "session",
    "cache",
    "bulk",
    "storage",
    "connection",
    "logging",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/keyward/keyward.toml` (system-wide)
/// 3. `~/.config/keyward/keyward.toml` (user XDG config)
/// 4. `./keyward.toml` (local directory)
/// 5. `KEYWARD_*` environment variables
pub fn load_config() -> Result<KeywardConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<KeywardConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KeywardConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<KeywardConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KeywardConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(KeywardConfig::default()))
        .merge(Toml::file("/etc/keyward/keyward.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("keyward/keyward.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("keyward.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider.
///
/// Uses `Env::map()` rather than `Env::split("_")` because field names contain
/// underscores: `KEYWARD_SESSION_IDLE_TIMEOUT_SECS` must map to
/// `session.idle_timeout_secs`. Variables outside the known sections (such as
/// `KEYWARD_PASSPHRASE`) are ignored so they never trip `deny_unknown_fields`.
fn env_provider() -> Env {
    Env::prefixed("KEYWARD_")
        .filter(|key| {
            let key = key.as_str();
            ENV_SECTIONS
                .iter()
                .any(|section| key.starts_with(&format!("{section}_")))
        })
        .map(|key| {
            let key_str = key.as_str();
            let mapped = ENV_SECTIONS
                .iter()
                .find(|section| key_str.starts_with(&format!("{section}_")))
                .map(|section| key_str.replacen(&format!("{section}_"), &format!("{section}."), 1))
                .unwrap_or_else(|| key_str.to_string());
            mapped.into()
        })
}
