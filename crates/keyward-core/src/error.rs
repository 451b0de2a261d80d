// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared by every Keyward crate.

use thiserror::Error;

/// The primary error type used across the encryption service, the vault, and
/// the persistence backends.
#[derive(Debug, Error)]
pub enum KeywardError {
    /// Bad input shape (empty name, payload/type mismatch, bad options).
    #[error("validation error: {0}")]
    Validation(String),

    /// Structurally invalid data: unknown key format, malformed blob.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Passphrase shorter than the enforced minimum.
    #[error("password must be at least {min_len} characters")]
    WeakPassword { min_len: usize },

    /// The same plaintext secret is already stored under another id.
    #[error("duplicate key: secret already stored as {existing_id}")]
    DuplicateKey { existing_id: String },

    /// The passphrase does not open the persisted vault verifier.
    #[error("invalid passphrase")]
    InvalidPassphrase,

    /// The encryption service has no session (never initialized or shut down).
    #[error("encryption service is not initialized")]
    NotInitialized,

    /// The session idled out or was terminated; unlock again to continue.
    #[error("encryption session has expired")]
    SessionExpired,

    /// Encryption could not be performed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed. Deliberately carries no detail: a wrong key and a
    /// tampered ciphertext are indistinguishable to the caller.
    #[error("decryption failed")]
    DecryptionFailed,

    /// Stored data no longer matches its checksum.
    #[error("integrity check failed for {subject}")]
    Integrity { subject: String },

    /// Persistence backend failure, wrapped with the operation that hit it.
    #[error("storage error during {context}: {source}")]
    Storage {
        context: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Requested entity does not exist where absence is exceptional.
    #[error("not found: {0}")]
    NotFound(String),

    /// Configuration errors (bad values, unreadable files).
    #[error("configuration error: {0}")]
    Config(String),

    /// Outbound provider call failed.
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl KeywardError {
    /// Wrap any error as a storage failure for the named operation.
    pub fn storage(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Storage {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Errors describing lifecycle misuse rather than bad data.
    pub fn is_session_error(&self) -> bool {
        matches!(self, Self::NotInitialized | Self::SessionExpired)
    }
}
