// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider detection, key format validation, and masking.

use std::sync::LazyLock;

use keyward_core::{KeyType, KeywardError, Provider};
use regex::Regex;

/// Known key formats, in detection order. More specific prefixes come
/// first so `sk-ant-` is never mistaken for an OpenAI key.
static KEY_PATTERNS: LazyLock<Vec<(Provider, Regex)>> = LazyLock::new(|| {
    vec![
        // sk-ant-api03-...
        (
            Provider::Anthropic,
            Regex::new(r"^sk-ant-(api\d{2}-)?[A-Za-z0-9_\-]{20,}$").unwrap(),
        ),
        // sk-or-v1-...
        (
            Provider::OpenRouter,
            Regex::new(r"^sk-or-(v1-)?[A-Za-z0-9]{20,}$").unwrap(),
        ),
        // sk-..., sk-proj-..., sk-svcacct-..., sk-admin-...
        (
            Provider::OpenAI,
            Regex::new(r"^sk-(proj-|svcacct-|admin-)?[A-Za-z0-9_\-]{20,}$").unwrap(),
        ),
        (
            Provider::Google,
            Regex::new(r"^AIza[0-9A-Za-z_\-]{35}$").unwrap(),
        ),
        (
            Provider::Groq,
            Regex::new(r"^gsk_[A-Za-z0-9]{20,}$").unwrap(),
        ),
    ]
});

/// Mistral keys carry no prefix, so they are validated but never detected.
static MISTRAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{32}$").unwrap());

/// Shortest secret accepted for a custom provider.
pub const CUSTOM_MIN_LEN: usize = 8;

/// Identify the provider from the key's shape.
pub fn detect_provider(key: &str) -> Option<Provider> {
    KEY_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(key))
        .map(|(provider, _)| *provider)
}

/// Check that `key` is a well-formed key for `provider`.
pub fn validate_key(key: &str, provider: Provider) -> Result<(), KeywardError> {
    let well_formed = match provider {
        Provider::Custom => {
            key.chars().count() >= CUSTOM_MIN_LEN && !key.chars().any(char::is_whitespace)
        }
        Provider::Mistral => MISTRAL_PATTERN.is_match(key),
        other => KEY_PATTERNS
            .iter()
            .any(|(p, pattern)| *p == other && pattern.is_match(key)),
    };
    if !well_formed {
        return Err(KeywardError::InvalidFormat(format!(
            "key does not match the {provider} key format"
        )));
    }

    // An explicit provider must not contradict an unambiguous prefix.
    if provider != Provider::Custom
        && let Some(detected) = detect_provider(key)
        && detected != provider
    {
        return Err(KeywardError::InvalidFormat(format!(
            "key looks like a {detected} key, not {provider}"
        )));
    }
    Ok(())
}

/// Resolve the provider for a new credential: validate against the given
/// one, or detect it when absent.
pub fn resolve_provider(key: &str, provider: Option<Provider>) -> Result<Provider, KeywardError> {
    match provider {
        Some(provider) => {
            validate_key(key, provider)?;
            Ok(provider)
        }
        None => detect_provider(key).ok_or_else(|| {
            KeywardError::InvalidFormat("unrecognized key format; specify a provider".into())
        }),
    }
}

/// Key type implied by the key's prefix.
pub fn key_type_of(key: &str, provider: Provider) -> KeyType {
    if provider != Provider::OpenAI {
        return KeyType::ApiKey;
    }
    if key.starts_with("sk-proj-") {
        KeyType::ProjectKey
    } else if key.starts_with("sk-svcacct-") {
        KeyType::ServiceAccount
    } else if key.starts_with("sk-admin-") {
        KeyType::AdminKey
    } else {
        KeyType::ApiKey
    }
}

/// Mask a secret for display: a short prefix, `...`, and the last four
/// characters. Values under 20 characters keep only the last four, and
/// values under 10 are fully hidden.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let prefix_len = match chars.len() {
        0..10 => return "****".to_string(),
        10..20 => 0,
        _ => 7,
    };
    let prefix: String = chars[..prefix_len].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{prefix}...{suffix}")
}
