//! SQLite-backed [`KeyValueStore`] for the persisted session cache.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};

use crate::backend::KeyValueStore;
use crate::error::{Result, StoreError};
use crate::migrations;

pub struct SqliteKeyValue {
    conn: Mutex<Connection>,
}

impl SqliteKeyValue {
    /// Open (or create) the cache in the platform data directory, or under
    /// `data_dir` when one is configured.
    pub fn open_default(data_dir: Option<&Path>) -> Result<Self> {
        let dir: PathBuf = match data_dir {
            Some(dir) => dir.to_path_buf(),
            None => ProjectDirs::from("app", "stridopt", "stridopt")
                .ok_or(StoreError::NoDataDir)?
                .data_dir()
                .to_path_buf(),
        };
        std::fs::create_dir_all(&dir)?;

        let path = dir.join("cache.db");
        tracing::info!(path = %path.display(), "opening local cache");
        Self::open_at(&path)
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValue {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}
