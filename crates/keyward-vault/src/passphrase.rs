// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Passphrase acquisition via TTY prompt or the KEYWARD_PASSPHRASE
//! environment variable.

use keyward_core::KeywardError;
use secrecy::SecretString;

/// The environment variable name for providing the vault passphrase.
pub const PASSPHRASE_ENV_VAR: &str = "KEYWARD_PASSPHRASE";

fn from_env() -> Option<SecretString> {
    std::env::var(PASSPHRASE_ENV_VAR)
        .ok()
        .filter(|value| !value.is_empty())
        .map(SecretString::from)
}

fn prompt(label: &str) -> Result<String, KeywardError> {
    eprint!("{label}: ");
    rpassword::read_password()
        .map_err(|e| KeywardError::Validation(format!("failed to read passphrase: {e}")))
}

fn missing() -> KeywardError {
    KeywardError::Validation(format!(
        "no passphrase provided; set {PASSPHRASE_ENV_VAR} or run interactively"
    ))
}

/// Get the vault passphrase from the environment or an interactive prompt.
///
/// `KEYWARD_PASSPHRASE` wins so headless deployments never block on a TTY.
pub fn read_passphrase() -> Result<SecretString, KeywardError> {
    if let Some(passphrase) = from_env() {
        return Ok(passphrase);
    }

    if std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        let passphrase = prompt("Vault passphrase")?;
        if passphrase.is_empty() {
            return Err(KeywardError::Validation("empty passphrase not allowed".into()));
        }
        return Ok(SecretString::from(passphrase));
    }

    Err(missing())
}

/// Like [`read_passphrase`], but prompts twice when creating a new vault.
pub fn read_new_passphrase() -> Result<SecretString, KeywardError> {
    if let Some(passphrase) = from_env() {
        return Ok(passphrase);
    }

    if std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        let first = zeroize::Zeroizing::new(prompt("New vault passphrase")?);
        let second = zeroize::Zeroizing::new(prompt("Confirm vault passphrase")?);
        if *first != *second {
            return Err(KeywardError::Validation("passphrases do not match".into()));
        }
        if first.is_empty() {
            return Err(KeywardError::Validation("empty passphrase not allowed".into()));
        }
        return Ok(SecretString::from(first.to_string()));
    }

    Err(missing())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    #[test]
    #[serial]
    fn passphrase_from_env_var() {
        // SAFETY: test-only env mutation, serialized with #[serial].
        unsafe { std::env::set_var(PASSPHRASE_ENV_VAR, "correct-horse-battery") };
        let result = read_passphrase();
        unsafe { std::env::remove_var(PASSPHRASE_ENV_VAR) };

        assert_eq!(result.unwrap().expose_secret(), "correct-horse-battery");
    }

    #[test]
    #[serial]
    fn new_passphrase_from_env_var_skips_confirmation() {
        unsafe { std::env::set_var(PASSPHRASE_ENV_VAR, "correct-horse-battery") };
        let result = read_new_passphrase();
        unsafe { std::env::remove_var(PASSPHRASE_ENV_VAR) };

        assert!(result.is_ok());
    }

    #[test]
    #[serial]
    fn empty_env_var_is_ignored() {
        unsafe { std::env::set_var(PASSPHRASE_ENV_VAR, "") };
        // stdin is not a terminal under the test harness.
        let result = read_passphrase();
        unsafe { std::env::remove_var(PASSPHRASE_ENV_VAR) };

        assert!(result.is_err());
    }
}
