//! SQLite Metadata Index
//!
//! Durable metadata storage that survives service restarts. Uses
//! connection pooling via r2d2 for concurrent access. The entry row and
//! the tree-size singleton are written in one transaction so the pair
//! (entry recorded, size behind) is never observable.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

use super::traits::{EntryMetadata, IndexError, IndexResult, MetadataIndex};

/// SQLite-backed metadata index with connection pooling
pub struct SqliteMetadataIndex {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteMetadataIndex {
    /// Create a new index at the given database path
    ///
    /// Creates the database file and runs migrations if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, IndexError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| IndexError::Connection(e.to_string()))?;

        let index = Self { pool };
        index.run_migrations()?;
        Ok(index)
    }

    /// Create an in-memory index (for testing)
    pub fn in_memory() -> Result<Self, IndexError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| IndexError::Connection(e.to_string()))?;

        let index = Self { pool };
        index.run_migrations()?;
        Ok(index)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, IndexError> {
        self.pool
            .get()
            .map_err(|e| IndexError::Connection(e.to_string()))
    }

    fn run_migrations(&self) -> Result<(), IndexError> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                entry_index INTEGER PRIMARY KEY,
                statement_hash TEXT NOT NULL,
                iss TEXT NOT NULL,
                sub TEXT NOT NULL,
                cty TEXT,
                payload_hash_alg INTEGER,
                payload_hash TEXT,
                tree_size_at_registration INTEGER NOT NULL,
                entry_tile_key TEXT NOT NULL,
                entry_tile_offset INTEGER NOT NULL,
                registered_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS log_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                tree_size INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entries_iss ON entries(iss);
            CREATE INDEX IF NOT EXISTS idx_entries_sub ON entries(sub);
            CREATE INDEX IF NOT EXISTS idx_entries_statement_hash ON entries(statement_hash);
            "#,
        )
        .map_err(|e| IndexError::Database(e.to_string()))?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<EntryMetadata> {
        Ok(EntryMetadata {
            entry_index: row.get::<_, i64>("entry_index")? as u64,
            statement_hash: row.get("statement_hash")?,
            iss: row.get("iss")?,
            sub: row.get("sub")?,
            cty: row.get("cty")?,
            payload_hash_alg: row.get("payload_hash_alg")?,
            payload_hash: row.get("payload_hash")?,
            tree_size_at_registration: row.get::<_, i64>("tree_size_at_registration")? as u64,
            entry_tile_key: row.get("entry_tile_key")?,
            entry_tile_offset: row.get::<_, i64>("entry_tile_offset")? as u64,
            registered_at: row.get::<_, i64>("registered_at")? as u64,
        })
    }

    fn record_sync(&self, meta: &EntryMetadata) -> Result<(), IndexError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| IndexError::Database(e.to_string()))?;

        tx.execute(
            r#"
            INSERT INTO entries (
                entry_index, statement_hash, iss, sub, cty,
                payload_hash_alg, payload_hash, tree_size_at_registration,
                entry_tile_key, entry_tile_offset, registered_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                meta.entry_index as i64,
                meta.statement_hash,
                meta.iss,
                meta.sub,
                meta.cty,
                meta.payload_hash_alg,
                meta.payload_hash,
                meta.tree_size_at_registration as i64,
                meta.entry_tile_key,
                meta.entry_tile_offset as i64,
                meta.registered_at as i64,
            ],
        )
        .map_err(|e| {
            if let rusqlite::Error::SqliteFailure(ref err, _) = e {
                if err.extended_code == 1555 || err.extended_code == 2067 {
                    return IndexError::Duplicate(meta.entry_index);
                }
            }
            IndexError::Database(e.to_string())
        })?;

        tx.execute(
            r#"
            INSERT INTO log_state (id, tree_size) VALUES (1, ?1)
            ON CONFLICT(id) DO UPDATE SET
                tree_size = MAX(tree_size, excluded.tree_size)
            "#,
            params![meta.tree_size_at_registration as i64],
        )
        .map_err(|e| IndexError::Database(e.to_string()))?;

        tx.commit().map_err(|e| IndexError::Database(e.to_string()))
    }

    fn get_sync(&self, entry_index: u64) -> Result<Option<EntryMetadata>, IndexError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM entries WHERE entry_index = ?1",
            params![entry_index as i64],
            Self::row_to_record,
        )
        .optional()
        .map_err(|e| IndexError::Database(e.to_string()))
    }

    fn tree_size_sync(&self) -> Result<u64, IndexError> {
        let conn = self.conn()?;
        let size: Option<i64> = conn
            .query_row("SELECT tree_size FROM log_state WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| IndexError::Database(e.to_string()))?;
        Ok(size.unwrap_or(0) as u64)
    }

    fn count_sync(&self) -> Result<u64, IndexError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .map_err(|e| IndexError::Database(e.to_string()))?;
        Ok(count as u64)
    }
}

#[async_trait]
impl MetadataIndex for SqliteMetadataIndex {
    async fn record(&self, meta: &EntryMetadata) -> IndexResult<()> {
        self.record_sync(meta)
    }

    async fn get(&self, entry_index: u64) -> IndexResult<Option<EntryMetadata>> {
        self.get_sync(entry_index)
    }

    async fn tree_size(&self) -> IndexResult<u64> {
        self.tree_size_sync()
    }

    async fn count(&self) -> IndexResult<u64> {
        self.count_sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(index: u64) -> EntryMetadata {
        EntryMetadata {
            entry_index: index,
            statement_hash: format!("{:064x}", index),
            iss: "https://issuer.example".to_string(),
            sub: "pkg:example/widget".to_string(),
            cty: Some("application/json".to_string()),
            payload_hash_alg: Some(-16),
            payload_hash: Some(format!("{:064x}", index + 1000)),
            tree_size_at_registration: index + 1,
            entry_tile_key: "tile/entries/000".to_string(),
            entry_tile_offset: index,
            registered_at: 1_722_500_000,
        }
    }

    #[tokio::test]
    async fn test_record_and_get_round_trip() {
        let index = SqliteMetadataIndex::in_memory().unwrap();
        index.record(&meta(0)).await.unwrap();
        index.record(&meta(1)).await.unwrap();

        assert_eq!(index.get(0).await.unwrap().unwrap(), meta(0));
        assert_eq!(index.get(1).await.unwrap().unwrap(), meta(1));
        assert!(index.get(2).await.unwrap().is_none());
        assert_eq!(index.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_entry_rejected() {
        let index = SqliteMetadataIndex::in_memory().unwrap();
        index.record(&meta(0)).await.unwrap();
        assert!(matches!(
            index.record(&meta(0)).await,
            Err(IndexError::Duplicate(0))
        ));
        // The failed insert must not bump the tree size.
        assert_eq!(index.tree_size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_tree_size_advances_with_registrations() {
        let index = SqliteMetadataIndex::in_memory().unwrap();
        assert_eq!(index.tree_size().await.unwrap(), 0);

        index.record(&meta(0)).await.unwrap();
        assert_eq!(index.tree_size().await.unwrap(), 1);
        index.record(&meta(1)).await.unwrap();
        assert_eq!(index.tree_size().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");

        {
            let index = SqliteMetadataIndex::new(&path).unwrap();
            index.record(&meta(0)).await.unwrap();
        }

        let reopened = SqliteMetadataIndex::new(&path).unwrap();
        assert_eq!(reopened.get(0).await.unwrap().unwrap(), meta(0));
        assert_eq!(reopened.tree_size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_nullable_fields() {
        let index = SqliteMetadataIndex::in_memory().unwrap();
        let mut m = meta(0);
        m.cty = None;
        m.payload_hash_alg = None;
        m.payload_hash = None;
        index.record(&m).await.unwrap();
        assert_eq!(index.get(0).await.unwrap().unwrap(), m);
    }
}
