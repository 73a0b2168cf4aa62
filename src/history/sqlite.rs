//! `SQLite` key-value backend.

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;
use tracing::info;

use crate::history::error::HistoryResult;
use crate::history::store::{KeyValueBackend, StoreFuture};

/// Default table holding history entries.
pub const DEFAULT_TABLE: &str = "chat_history";

/// `SQLite` implementation of key-value storage.
pub struct SqliteBackend {
    conn: Connection,
    table: String,
}

impl SqliteBackend {
    /// Open (or create) a database file.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or initialized.
    pub async fn open(path: impl AsRef<Path> + Send) -> HistoryResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).await?;
        info!(path = %path.display(), "Opened chat history database");
        Self::init(conn, DEFAULT_TABLE).await
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub async fn open_in_memory() -> HistoryResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn, DEFAULT_TABLE).await
    }

    async fn init(conn: Connection, table: &str) -> HistoryResult<Self> {
        let table = table.to_string();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

impl KeyValueBackend for SqliteBackend {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, HistoryResult<Option<String>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let key = key.to_string();
            let value = self
                .conn
                .call(move |conn| {
                    let value = conn
                        .query_row(
                            &format!("SELECT value FROM {table} WHERE key = ?1"),
                            rusqlite::params![key],
                            |row| row.get::<_, String>(0),
                        )
                        .optional()?;
                    Ok(value)
                })
                .await?;
            Ok(value)
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, HistoryResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            let key = key.to_string();
            let updated_at = Utc::now().timestamp_millis();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT INTO {table} (key, value, updated_at) VALUES (?1, ?2, ?3)
                            ON CONFLICT(key) DO UPDATE SET
                                value = excluded.value,
                                updated_at = excluded.updated_at"
                        ),
                        rusqlite::params![key, value, updated_at],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, HistoryResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            let key = key.to_string();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!("DELETE FROM {table} WHERE key = ?1"),
                        rusqlite::params![key],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }
}
