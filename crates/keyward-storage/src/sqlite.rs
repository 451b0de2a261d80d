// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the blob store and metadata index.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::SecondsFormat;
use keyward_core::{
    HealthStatus, IndexField, IndexRecord, KeyValueStore, KeywardError, MetadataIndex, Page,
    PersistenceAdapter,
};
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use tracing::debug;

use crate::database::{map_tr_err, Database};

/// SQLite-backed store. Implements both persistence tiers over one
/// [`Database`].
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

/// Columns written alongside the JSON row.
struct IndexRow {
    id: String,
    provider: String,
    status: String,
    key_type: String,
    key_hash: String,
    created_at: String,
    tags: Vec<String>,
    data: String,
}

impl IndexRow {
    fn from_record(record: &IndexRecord) -> Result<Self, KeywardError> {
        let meta = &record.metadata;
        Ok(Self {
            id: meta.id.clone(),
            provider: meta.provider.to_string(),
            status: meta.status.to_string(),
            key_type: meta.key_type.to_string(),
            key_hash: record.key_hash.clone(),
            created_at: meta.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            tags: meta.tags.clone(),
            data: serde_json::to_string(record)
                .map_err(|e| KeywardError::storage("encode index row", e))?,
        })
    }
}

fn replace_tags(
    tx: &rusqlite::Transaction<'_>,
    id: &str,
    tags: &[String],
) -> Result<(), rusqlite::Error> {
    tx.execute("DELETE FROM credential_tags WHERE credential_id = ?1", params![id])?;
    let mut stmt =
        tx.prepare("INSERT OR IGNORE INTO credential_tags (credential_id, tag) VALUES (?1, ?2)")?;
    for tag in tags {
        stmt.execute(params![id, tag])?;
    }
    Ok(())
}

fn decode_rows(rows: Vec<String>) -> Result<Vec<IndexRecord>, KeywardError> {
    rows.iter()
        .map(|data| {
            serde_json::from_str(data).map_err(|e| KeywardError::storage("decode index row", e))
        })
        .collect()
}

/// SQLite uses -1 for "no limit".
fn sql_limit(page: Page) -> i64 {
    page.limit
        .map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX))
}

fn sql_offset(page: Page) -> i64 {
    i64::try_from(page.offset).unwrap_or(i64::MAX)
}

#[async_trait]
impl PersistenceAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn health_check(&self) -> Result<HealthStatus, KeywardError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err("health check"))?;
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, KeywardError> {
        let key = key.to_string();
        let raw: Option<String> = self
            .db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    "SELECT value FROM kv_entries WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err("kv get"))?;

        raw.map(|s| serde_json::from_str(&s).map_err(|e| KeywardError::storage("kv decode", e)))
            .transpose()
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), KeywardError> {
        let key = key.to_string();
        let encoded =
            serde_json::to_string(&value).map_err(|e| KeywardError::storage("kv encode", e))?;
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO kv_entries (key, value) VALUES (?1, ?2) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    params![key, encoded],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err("kv set"))
    }

    async fn remove(&self, key: &str) -> Result<bool, KeywardError> {
        let key = key.to_string();
        let removed = self
            .db
            .connection()
            .call(move |conn| conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key]))
            .await
            .map_err(map_tr_err("kv remove"))?;
        Ok(removed > 0)
    }

    async fn get_batch(&self, keys: &[String]) -> Result<HashMap<String, Value>, KeywardError> {
        let keys = keys.to_vec();
        let rows: Vec<(String, String)> = self
            .db
            .connection()
            .call(move |conn| -> Result<_, rusqlite::Error> {
                let mut stmt = conn.prepare("SELECT value FROM kv_entries WHERE key = ?1")?;
                let mut found = Vec::with_capacity(keys.len());
                for key in keys {
                    let value: Option<String> =
                        stmt.query_row(params![key], |row| row.get(0)).optional()?;
                    if let Some(value) = value {
                        found.push((key, value));
                    }
                }
                Ok(found)
            })
            .await
            .map_err(map_tr_err("kv get batch"))?;

        rows.into_iter()
            .map(|(k, v)| {
                serde_json::from_str(&v)
                    .map(|value| (k, value))
                    .map_err(|e| KeywardError::storage("kv decode", e))
            })
            .collect()
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, KeywardError> {
        let prefix = prefix.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT key FROM kv_entries \
                     WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
                )?;
                let keys = stmt
                    .query_map(params![prefix], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(map_tr_err("kv list keys"))
    }
}

#[async_trait]
impl MetadataIndex for SqliteStore {
    async fn add(&self, record: &IndexRecord) -> Result<(), KeywardError> {
        let row = IndexRow::from_record(record)?;
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO credential_index \
                     (id, provider, status, key_type, key_hash, created_at, data) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        row.id,
                        row.provider,
                        row.status,
                        row.key_type,
                        row.key_hash,
                        row.created_at,
                        row.data,
                    ],
                )?;
                replace_tags(&tx, &row.id, &row.tags)?;
                tx.commit()
            })
            .await
            .map_err(map_tr_err("index add"))?;
        debug!(id = %record.metadata.id, "index row added");
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<IndexRecord>, KeywardError> {
        let id = id.to_string();
        let raw: Option<String> = self
            .db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    "SELECT data FROM credential_index WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err("index get"))?;

        Ok(decode_rows(raw.into_iter().collect())?.pop())
    }

    async fn update(&self, record: &IndexRecord) -> Result<(), KeywardError> {
        let row = IndexRow::from_record(record)?;
        let changed = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                let tx = conn.transaction()?;
                let changed = tx.execute(
                    "UPDATE credential_index SET provider = ?2, status = ?3, key_type = ?4, \
                     key_hash = ?5, created_at = ?6, data = ?7 WHERE id = ?1",
                    params![
                        row.id,
                        row.provider,
                        row.status,
                        row.key_type,
                        row.key_hash,
                        row.created_at,
                        row.data,
                    ],
                )?;
                if changed > 0 {
                    replace_tags(&tx, &row.id, &row.tags)?;
                }
                tx.commit()?;
                Ok(changed)
            })
            .await
            .map_err(map_tr_err("index update"))?;

        if changed == 0 {
            return Err(KeywardError::NotFound(format!(
                "index row {}",
                record.metadata.id
            )));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, KeywardError> {
        let id = id.to_string();
        let removed = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM credential_tags WHERE credential_id = ?1",
                    params![id],
                )?;
                let removed = tx.execute("DELETE FROM credential_index WHERE id = ?1", params![id])?;
                tx.commit()?;
                Ok(removed)
            })
            .await
            .map_err(map_tr_err("index delete"))?;
        Ok(removed > 0)
    }

    async fn get_all(&self) -> Result<Vec<IndexRecord>, KeywardError> {
        let rows = self
            .db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt =
                    conn.prepare("SELECT data FROM credential_index ORDER BY created_at, id")?;
                let rows = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err("index get all"))?;
        decode_rows(rows)
    }

    async fn query(
        &self,
        field: IndexField,
        value: &str,
        page: Page,
    ) -> Result<Vec<IndexRecord>, KeywardError> {
        let sql = match field {
            IndexField::Tag => {
                "SELECT i.data FROM credential_index i \
                 JOIN credential_tags t ON t.credential_id = i.id \
                 WHERE t.tag = ?1 ORDER BY i.created_at, i.id LIMIT ?2 OFFSET ?3"
            }
            IndexField::Provider => {
                "SELECT data FROM credential_index WHERE provider = ?1 \
                 ORDER BY created_at, id LIMIT ?2 OFFSET ?3"
            }
            IndexField::Status => {
                "SELECT data FROM credential_index WHERE status = ?1 \
                 ORDER BY created_at, id LIMIT ?2 OFFSET ?3"
            }
            IndexField::KeyType => {
                "SELECT data FROM credential_index WHERE key_type = ?1 \
                 ORDER BY created_at, id LIMIT ?2 OFFSET ?3"
            }
            IndexField::KeyHash => {
                "SELECT data FROM credential_index WHERE key_hash = ?1 \
                 ORDER BY created_at, id LIMIT ?2 OFFSET ?3"
            }
        };
        let value = value.to_string();
        let limit = sql_limit(page);
        let offset = sql_offset(page);

        let rows = self
            .db
            .connection()
            .call(move |conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(sql)?;
                let rows = stmt
                    .query_map(params![value, limit, offset], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err("index query"))?;
        decode_rows(rows)
    }
}
