//! Durable per-table cursors.
//!
//! A checkpoint holds the last fully written ordering key of a table. Saving is
//! an overwrite; callers only ever save non-decreasing cursors. There is no
//! locking, so a single sync process per table is assumed.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, warn};

use civicgraph_common::{Cursor, SourceTable, SyncError};

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Last saved cursor, or the table's start sentinel when none exists.
    async fn load(&self, table: SourceTable) -> Result<Cursor, SyncError>;

    /// Overwrite the table's cursor.
    async fn save(&self, table: SourceTable, cursor: &Cursor) -> Result<(), SyncError>;

    /// Forget the table's cursor so the next backlog run starts over.
    async fn reset(&self, table: SourceTable) -> Result<(), SyncError>;
}

/// A stored value that no longer parses is treated as "start over". Mutations
/// are idempotent, so reprocessing is slower but safe.
fn parse_or_start(table: SourceTable, raw: &str) -> Cursor {
    let kind = table.cursor_kind();
    match Cursor::parse(kind, raw) {
        Ok(cursor) => cursor,
        Err(e) => {
            warn!(table = %table, error = %e, "Unreadable checkpoint, starting from the beginning");
            Cursor::start(kind)
        }
    }
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

/// Checkpoints in a `sync_checkpoints` table next to the source data.
#[derive(Clone)]
pub struct PgCheckpointStore {
    pool: PgPool,
}

impl PgCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the checkpoint table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_checkpoints (
                table_name  TEXT         PRIMARY KEY,
                cursor      TEXT         NOT NULL,
                updated_at  TIMESTAMPTZ  NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn load(&self, table: SourceTable) -> Result<Cursor, SyncError> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT cursor FROM sync_checkpoints WHERE table_name = $1",
        )
        .bind(table.checkpoint_name())
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((raw,)) => parse_or_start(table, &raw),
            None => Cursor::start(table.cursor_kind()),
        })
    }

    async fn save(&self, table: SourceTable, cursor: &Cursor) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            INSERT INTO sync_checkpoints (table_name, cursor, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (table_name)
            DO UPDATE SET cursor = EXCLUDED.cursor, updated_at = now()
            "#,
        )
        .bind(table.checkpoint_name())
        .bind(cursor.to_string())
        .execute(&self.pool)
        .await?;

        debug!(table = %table, cursor = %cursor, "Checkpoint saved");
        Ok(())
    }

    async fn reset(&self, table: SourceTable) -> Result<(), SyncError> {
        sqlx::query("DELETE FROM sync_checkpoints WHERE table_name = $1")
            .bind(table.checkpoint_name())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// One `<table>_checkpoint.txt` file per table, compatible with checkpoint
/// files left behind by earlier sync scripts.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, table: SourceTable) -> PathBuf {
        self.dir.join(format!("{}_checkpoint.txt", table.checkpoint_name()))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, table: SourceTable) -> Result<Cursor, SyncError> {
        let path = self.path_for(table);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(parse_or_start(table, &raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Cursor::start(table.cursor_kind())),
            Err(e) => Err(SyncError::Checkpoint(format!("read {}: {e}", path.display()))),
        }
    }

    async fn save(&self, table: SourceTable, cursor: &Cursor) -> Result<(), SyncError> {
        let path = self.path_for(table);
        let tmp = path.with_extension("txt.tmp");

        // Write-then-rename so a crash never leaves a truncated checkpoint.
        tokio::fs::write(&tmp, cursor.to_string())
            .await
            .map_err(|e| SyncError::Checkpoint(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| SyncError::Checkpoint(format!("rename to {}: {e}", path.display())))?;

        debug!(table = %table, cursor = %cursor, path = %path.display(), "Checkpoint saved");
        Ok(())
    }

    async fn reset(&self, table: SourceTable) -> Result<(), SyncError> {
        let path = self.path_for(table);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::Checkpoint(format!("remove {}: {e}", path.display()))),
        }
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// Process-local checkpoints. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    cursors: Mutex<HashMap<SourceTable, Cursor>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<SourceTable, Cursor>>, SyncError> {
        self.cursors
            .lock()
            .map_err(|_| SyncError::Checkpoint("checkpoint map poisoned".into()))
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, table: SourceTable) -> Result<Cursor, SyncError> {
        Ok(self
            .lock()?
            .get(&table)
            .cloned()
            .unwrap_or_else(|| Cursor::start(table.cursor_kind())))
    }

    async fn save(&self, table: SourceTable, cursor: &Cursor) -> Result<(), SyncError> {
        self.lock()?.insert(table, cursor.clone());
        Ok(())
    }

    async fn reset(&self, table: SourceTable) -> Result<(), SyncError> {
        self.lock()?.remove(&table);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_start_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        assert_eq!(store.load(SourceTable::NewsArticles).await.unwrap(), Cursor::Seq(0));
        assert_eq!(
            store.load(SourceTable::CouncilVideos).await.unwrap(),
            Cursor::Key(String::new())
        );
    }

    #[tokio::test]
    async fn file_store_overwrites_and_resets() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        store.save(SourceTable::NewsArticles, &Cursor::Seq(50)).await.unwrap();
        store.save(SourceTable::NewsArticles, &Cursor::Seq(120)).await.unwrap();
        assert_eq!(store.load(SourceTable::NewsArticles).await.unwrap(), Cursor::Seq(120));

        let raw = std::fs::read_to_string(store.path_for(SourceTable::NewsArticles)).unwrap();
        assert_eq!(raw, "120");

        store.reset(SourceTable::NewsArticles).await.unwrap();
        assert_eq!(store.load(SourceTable::NewsArticles).await.unwrap(), Cursor::Seq(0));
        // Resetting twice is fine.
        store.reset(SourceTable::NewsArticles).await.unwrap();
    }

    #[tokio::test]
    async fn reads_legacy_checkpoint_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("council_insights_checkpoint.txt"), "7f3a-uuid\n").unwrap();
        std::fs::write(dir.path().join("articles_checkpoint.txt"), "not a number").unwrap();

        let store = FileCheckpointStore::new(dir.path());
        assert_eq!(
            store.load(SourceTable::CouncilInsights).await.unwrap(),
            Cursor::Key("7f3a-uuid".into())
        );
        assert_eq!(store.load(SourceTable::Articles).await.unwrap(), Cursor::Seq(0));
    }

    #[tokio::test]
    async fn memory_store_keeps_tables_apart() {
        let store = MemoryCheckpointStore::new();
        store.save(SourceTable::NewsArticles, &Cursor::Seq(9)).await.unwrap();
        store
            .save(SourceTable::CouncilArticles, &Cursor::Key("b".into()))
            .await
            .unwrap();

        assert_eq!(store.load(SourceTable::NewsArticles).await.unwrap(), Cursor::Seq(9));
        assert_eq!(store.load(SourceTable::Articles).await.unwrap(), Cursor::Seq(0));
        assert_eq!(
            store.load(SourceTable::CouncilArticles).await.unwrap(),
            Cursor::Key("b".into())
        );
    }
}
