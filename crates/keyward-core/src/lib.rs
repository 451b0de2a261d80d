// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for Keyward.
//!
//! This crate provides the shared error type, the persistence collaborator
//! traits, and the credential types used by the encryption service, the
//! vault, and the storage backends.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::KeywardError;
pub use traits::{KeyValueStore, MetadataIndex, PersistenceAdapter};
pub use types::{
    CredentialConfiguration, CredentialMetadata, HealthStatus, IndexField, IndexRecord,
    KeyStatus, KeyType, Page, Provider, RotationEvent, RotationState, RotationStatus, UsageStats,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_persistence_traits_are_exported() {
        fn _assert_kv<T: KeyValueStore>() {}
        fn _assert_index<T: MetadataIndex>() {}
        fn _assert_adapter<T: PersistenceAdapter>() {}
    }

    #[test]
    fn health_status_variants() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(!HealthStatus::Degraded("slow".into()).is_healthy());
        assert!(!HealthStatus::Unhealthy("down".into()).is_healthy());
    }
}
