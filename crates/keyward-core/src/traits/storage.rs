// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blob store and metadata index contracts.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::KeywardError;
use crate::traits::adapter::PersistenceAdapter;
use crate::types::{IndexField, IndexRecord, Page};

/// Namespaced key-value store holding encrypted records, the KDF salt, the
/// migration marker, and audit entries.
///
/// `set` must be durable before it returns.
#[async_trait]
pub trait KeyValueStore: PersistenceAdapter {
    async fn get(&self, key: &str) -> Result<Option<Value>, KeywardError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), KeywardError>;

    /// Removes `key`. Returns whether it existed.
    async fn remove(&self, key: &str) -> Result<bool, KeywardError>;

    /// Fetches several keys at once. Missing keys are absent from the map.
    async fn get_batch(&self, keys: &[String]) -> Result<HashMap<String, Value>, KeywardError>;

    /// Lists all keys starting with `prefix`, in ascending order.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, KeywardError>;
}

/// Queryable index of credential metadata.
#[async_trait]
pub trait MetadataIndex: PersistenceAdapter {
    /// Inserts a new row. Fails if the id already exists.
    async fn add(&self, record: &IndexRecord) -> Result<(), KeywardError>;

    async fn get(&self, id: &str) -> Result<Option<IndexRecord>, KeywardError>;

    /// Replaces an existing row. Fails with `NotFound` if absent.
    async fn update(&self, record: &IndexRecord) -> Result<(), KeywardError>;

    /// Removes a row. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool, KeywardError>;

    async fn get_all(&self) -> Result<Vec<IndexRecord>, KeywardError>;

    /// Rows whose `field` equals `value`, ordered by creation time.
    async fn query(
        &self,
        field: IndexField,
        value: &str,
        page: Page,
    ) -> Result<Vec<IndexRecord>, KeywardError>;
}
