// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence backends for Keyward.
//!
//! [`MemoryStore`] keeps everything in process memory. [`SqliteStore`] is a
//! WAL-mode SQLite database with embedded migrations and a single-writer
//! connection via `tokio-rusqlite`. Both implement the blob store and the
//! metadata index.

pub mod database;
pub mod memory;
pub mod migrations;
pub mod sqlite;

use std::sync::Arc;

use keyward_config::model::{StorageBackend, StorageConfig};
use keyward_core::{KeyValueStore, KeywardError, MetadataIndex};

pub use database::Database;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Both persistence tiers, ready to hand to the vault.
#[derive(Clone)]
pub struct Backends {
    pub kv: Arc<dyn KeyValueStore>,
    pub index: Arc<dyn MetadataIndex>,
}

impl Backends {
    /// Use one store for both tiers.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: KeyValueStore + MetadataIndex,
    {
        Self {
            kv: store.clone(),
            index: store,
        }
    }
}

/// Open the backend selected by `config`.
pub async fn open(config: &StorageConfig) -> Result<Backends, KeywardError> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::info!("using in-memory storage; nothing will persist");
            Ok(Backends::shared(Arc::new(MemoryStore::new())))
        }
        StorageBackend::Sqlite => {
            let db = Database::open(config).await?;
            Ok(Backends::shared(Arc::new(SqliteStore::new(db))))
        }
    }
}
