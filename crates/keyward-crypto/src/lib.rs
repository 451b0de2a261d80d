// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encryption layer for Keyward.
//!
//! Provides:
//! - AES-256-GCM sealing and SHA-256 hashing ([`primitives`])
//! - Argon2id / PBKDF2 master-key derivation and HKDF purpose keys ([`kdf`])
//! - The session-scoped [`EncryptionService`] with idle expiry, key
//!   rotation, bulk and field-level encryption, and integrity checksums
//!
//! # Security invariants
//!
//! - Every encryption uses a fresh random IV.
//! - Master secrets and derived keys are zeroized on drop and redacted in
//!   `Debug` output.
//! - Decryption failures never distinguish a wrong key from tampering.

pub mod bulk;
pub mod fields;
pub mod integrity;
pub mod kdf;
pub mod payload;
pub mod primitives;
pub mod service;
mod tasks;

pub use bulk::{BulkError, BulkOptions, BulkResult};
pub use fields::{FieldAction, FieldMap};
pub use integrity::IntegrityCheck;
pub use kdf::{DerivedKey, KdfParams, KeyDerivationManager};
pub use payload::{DataType, Payload};
pub use primitives::EncryptedBlob;
pub use service::{
    EncryptionService, ServiceOptions, SessionState, DATA_PURPOSE, KEYGEN_KEY, SALT_KEY,
    VERIFIER_KEY,
};
