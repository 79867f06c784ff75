use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use civicgraph_common::{Cursor, SourceRow, SourceTable, SyncError, Window};

use crate::deadline::within;
use crate::source::{BatchRequest, Position, RowSource};

/// A source row together with its ordering key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedRow {
    pub cursor: Cursor,
    pub row: SourceRow,
}

/// Batch extractor: bounded, ordered reads from a `RowSource`.
///
/// Every row must carry its ordering key and batches must ascend strictly past
/// the requested cursor. Anything else would let the checkpoint skip rows, so
/// it is reported as `SyncError::InvalidRow` instead of being written.
pub struct Extractor {
    source: Arc<dyn RowSource>,
    timeout: Duration,
}

impl Extractor {
    pub fn new(source: Arc<dyn RowSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    pub async fn count(&self, table: SourceTable, window: &Window) -> Result<i64, SyncError> {
        within("source count", self.timeout, self.source.count(table, window)).await
    }

    pub async fn next_batch(
        &self,
        table: SourceTable,
        position: &Position,
        window: &Window,
        limit: usize,
    ) -> Result<Vec<KeyedRow>, SyncError> {
        let request = BatchRequest {
            table,
            position: position.clone(),
            window: *window,
            limit,
        };
        let rows = within("source fetch", self.timeout, self.source.fetch(&request)).await?;

        let kind = table.cursor_kind();
        let mut previous = match position {
            Position::After(cursor) => Some(cursor.clone()),
            Position::Offset(_) => None,
        };

        let mut batch = Vec::with_capacity(rows.len());
        for row in rows {
            let cursor = Cursor::from_row(&row, table.key_column(), kind).ok_or_else(|| {
                SyncError::InvalidRow {
                    table,
                    reason: format!("missing ordering key column {:?}", table.key_column()),
                }
            })?;

            if let Some(prev) = &previous {
                if cursor.partial_cmp(prev) != Some(Ordering::Greater) {
                    return Err(SyncError::InvalidRow {
                        table,
                        reason: format!("row {cursor} is not after {prev}"),
                    });
                }
            }
            previous = Some(cursor.clone());
            batch.push(KeyedRow { cursor, row });
        }

        debug!(table = %table, rows = batch.len(), "Extracted batch");
        Ok(batch)
    }
}
