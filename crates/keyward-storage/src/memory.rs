// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-local backend. Nothing survives a restart.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use keyward_core::{
    HealthStatus, IndexField, IndexRecord, KeyValueStore, KeywardError, MetadataIndex, Page,
    PersistenceAdapter,
};
use serde_json::Value;
use tokio::sync::RwLock;

/// Key-value store and metadata index held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
    index: RwLock<BTreeMap<String, IndexRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Sort rows by creation time, then id, and cut out `page`.
pub(crate) fn paginate(mut rows: Vec<IndexRecord>, page: Page) -> Vec<IndexRecord> {
    rows.sort_by(|a, b| {
        a.metadata
            .created_at
            .cmp(&b.metadata.created_at)
            .then_with(|| a.metadata.id.cmp(&b.metadata.id))
    });
    rows.into_iter()
        .skip(page.offset)
        .take(page.limit.unwrap_or(usize::MAX))
        .collect()
}

#[async_trait]
impl PersistenceAdapter for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn health_check(&self) -> Result<HealthStatus, KeywardError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, KeywardError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), KeywardError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, KeywardError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn get_batch(&self, keys: &[String]) -> Result<HashMap<String, Value>, KeywardError> {
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .filter_map(|k| entries.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, KeywardError> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[async_trait]
impl MetadataIndex for MemoryStore {
    async fn add(&self, record: &IndexRecord) -> Result<(), KeywardError> {
        let mut index = self.index.write().await;
        let id = &record.metadata.id;
        if index.contains_key(id) {
            return Err(KeywardError::storage(
                "index add",
                format!("id {id} already indexed"),
            ));
        }
        index.insert(id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<IndexRecord>, KeywardError> {
        Ok(self.index.read().await.get(id).cloned())
    }

    async fn update(&self, record: &IndexRecord) -> Result<(), KeywardError> {
        let mut index = self.index.write().await;
        match index.get_mut(&record.metadata.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(KeywardError::NotFound(format!(
                "index row {}",
                record.metadata.id
            ))),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, KeywardError> {
        Ok(self.index.write().await.remove(id).is_some())
    }

    async fn get_all(&self) -> Result<Vec<IndexRecord>, KeywardError> {
        let rows = self.index.read().await.values().cloned().collect();
        Ok(paginate(rows, Page::all()))
    }

    async fn query(
        &self,
        field: IndexField,
        value: &str,
        page: Page,
    ) -> Result<Vec<IndexRecord>, KeywardError> {
        let rows = self
            .index
            .read()
            .await
            .values()
            .filter(|r| field.matches(r, value))
            .cloned()
            .collect();
        Ok(paginate(rows, page))
    }
}
