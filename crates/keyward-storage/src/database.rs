// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite connection management: PRAGMA setup, migrations, WAL checkpoint.
//!
//! All statements run on tokio-rusqlite's single background thread, which
//! serializes writes. Do not open additional connections for writes.

use std::path::Path;

use keyward_config::model::StorageConfig;
use keyward_core::KeywardError;
use tracing::debug;

use crate::migrations;

/// Handle to the Keyward SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database named by `config` and bring
    /// its schema up to date.
    pub async fn open(config: &StorageConfig) -> Result<Self, KeywardError> {
        let path = Path::new(&config.database_path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| KeywardError::storage("create database directory", e))?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| KeywardError::storage("open database", e))?;
        let db = Self { conn };
        db.prepare(config.wal_mode).await?;
        debug!(path = %config.database_path, wal = config.wal_mode, "database opened");
        Ok(db)
    }

    /// Private in-memory database, for tests.
    pub async fn open_in_memory() -> Result<Self, KeywardError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| KeywardError::storage("open in-memory database", e))?;
        let db = Self { conn };
        db.prepare(false).await?;
        Ok(db)
    }

    async fn prepare(&self, wal_mode: bool) -> Result<(), KeywardError> {
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                if wal_mode {
                    let mode: String =
                        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
                    debug!(journal_mode = %mode, "journal mode set");
                }
                conn.pragma_update(None, "synchronous", "NORMAL")?;
                conn.pragma_update(None, "foreign_keys", "ON")?;
                conn.busy_timeout(std::time::Duration::from_secs(5))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err("configure connection"))?;

        self.conn
            .call(migrations::run_migrations)
            .await
            .map_err(map_tr_err("run migrations"))
    }

    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint and truncate the WAL.
    pub async fn checkpoint(&self) -> Result<(), KeywardError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err("wal checkpoint"))?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Map a tokio-rusqlite failure to a storage error tagged with `context`.
pub(crate) fn map_tr_err<E>(
    context: &'static str,
) -> impl FnOnce(tokio_rusqlite::Error<E>) -> KeywardError
where
    E: std::error::Error + Send + Sync + 'static,
{
    move |e| KeywardError::storage(context, e)
}
