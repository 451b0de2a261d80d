// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted credential vault for AI provider API keys.
//!
//! Secrets are sealed by the session-scoped
//! [`EncryptionService`](keyward_crypto::EncryptionService) and stored as
//! checksummed records next to a plaintext-free metadata index. The vault
//! adds provider detection, a TTL/LRU record cache, an audit trail, key
//! rotation with rollback, usage accounting, export/import, connection
//! tests, and migration of legacy plaintext entries.

pub mod audit;
pub mod cache;
pub mod migration;
pub mod passphrase;
pub mod probe;
pub mod provider;
pub mod record;
pub mod startup;
pub mod vault;

pub use audit::{AuditEvent, AuditLogEntry};
pub use cache::CacheStats;
pub use migration::MigrationReport;
pub use passphrase::{read_new_passphrase, read_passphrase};
pub use probe::{ConnectionProbe, HttpProbe};
pub use provider::{detect_provider, mask_secret};
pub use record::{
    ConnectionTestResult, CredentialPatch, CredentialRecord, ExportedCredential, HealthReport,
    ImportReport, ListOptions, ListResult, NewCredential, RotationOutcome, SortBy, SortOrder,
    UsageDelta, VaultExport, STORAGE_VERSION,
};
pub use startup::{open_vault, open_vault_interactive, open_vault_with};
pub use vault::{CredentialVault, VaultOptions};
