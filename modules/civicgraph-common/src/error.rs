use std::time::Duration;

use thiserror::Error;

use crate::types::{Cursor, SourceTable};

#[derive(Error, Debug)]
pub enum SyncError {
    /// Relational source unreachable, rejected the query, or returned an undecodable row.
    #[error("Source error: {0}")]
    Source(#[from] sqlx::Error),

    /// Graph store unreachable or rejected a statement.
    #[error("Graph error: {0}")]
    Graph(#[from] neo4rs::Error),

    /// A row the engine cannot place, such as one without an ordering key.
    #[error("Invalid row in {table}: {reason}")]
    InvalidRow { table: SourceTable, reason: String },

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid trend period: {0}")]
    Period(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// A row failed to write. `last_good` is the cursor of the last fully written row.
    #[error("Write failed for {table} at cursor {cursor} (last good: {last_good}): {source}")]
    Write {
        table: SourceTable,
        cursor: Cursor,
        last_good: Cursor,
        #[source]
        source: Box<SyncError>,
    },

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl SyncError {
    /// Timeouts are extraction-layer failures, safe to retry on the next run.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Timeout { .. } => true,
            SyncError::Write { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_error_reports_positions() {
        let err = SyncError::Write {
            table: SourceTable::NewsArticles,
            cursor: Cursor::Seq(31),
            last_good: Cursor::Seq(30),
            source: Box::new(SyncError::Timeout {
                operation: "graph write",
                after: Duration::from_secs(30),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("news_articles"));
        assert!(msg.contains("cursor 31"));
        assert!(msg.contains("last good: 30"));
        assert!(err.is_retryable());
        assert!(!SyncError::Config("x".into()).is_retryable());
    }
}
