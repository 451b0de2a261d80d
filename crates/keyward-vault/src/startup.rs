// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vault startup: open storage, unlock the encryption session, build the
//! vault, and migrate legacy entries.

use std::sync::Arc;

use keyward_config::model::KeywardConfig;
use keyward_core::KeywardError;
use keyward_crypto::{EncryptionService, ServiceOptions};
use keyward_storage::Backends;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::passphrase;
use crate::probe::{ConnectionProbe, HttpProbe};
use crate::vault::{CredentialVault, VaultOptions};

/// Open the vault described by `config`, unlocking it with `passphrase`.
pub async fn open_vault(
    config: &KeywardConfig,
    passphrase: &SecretString,
) -> Result<Arc<CredentialVault>, KeywardError> {
    let backends = keyward_storage::open(&config.storage).await?;
    let encryption =
        EncryptionService::new(backends.kv.clone(), ServiceOptions::from_config(config));
    let probe = Arc::new(HttpProbe::new(&config.connection.endpoints)?);
    open_vault_with(
        encryption,
        backends,
        probe,
        VaultOptions::from_config(config),
        passphrase,
    )
    .await
}

/// Open the vault described by `config`, reading the passphrase from
/// `KEYWARD_PASSPHRASE` or the terminal. A brand-new vault asks for
/// confirmation.
pub async fn open_vault_interactive(
    config: &KeywardConfig,
) -> Result<Arc<CredentialVault>, KeywardError> {
    let backends = keyward_storage::open(&config.storage).await?;
    let encryption =
        EncryptionService::new(backends.kv.clone(), ServiceOptions::from_config(config));
    let passphrase = if encryption.persisted_salt().await?.is_some() {
        passphrase::read_passphrase()?
    } else {
        info!("no vault found; creating a new one");
        passphrase::read_new_passphrase()?
    };
    let probe = Arc::new(HttpProbe::new(&config.connection.endpoints)?);
    open_vault_with(
        encryption,
        backends,
        probe,
        VaultOptions::from_config(config),
        &passphrase,
    )
    .await
}

/// Unlock `encryption`, build the vault over `backends`, and run the legacy
/// migration.
pub async fn open_vault_with(
    encryption: Arc<EncryptionService>,
    backends: Backends,
    probe: Arc<dyn ConnectionProbe>,
    options: VaultOptions,
    passphrase: &SecretString,
) -> Result<Arc<CredentialVault>, KeywardError> {
    encryption.unlock(passphrase.expose_secret()).await?;
    let vault = CredentialVault::open(encryption, backends, probe, options).await?;

    let report = vault.migrate_legacy().await?;
    for warning in &report.warnings {
        warn!("{warning}");
    }
    info!(
        keys = vault.key_count(),
        migrated = report.migrated.len(),
        "vault unlocked"
    );
    Ok(Arc::new(vault))
}
