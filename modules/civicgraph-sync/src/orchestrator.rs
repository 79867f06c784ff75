//! Sync orchestrator: drains tables from the relational source into the graph.
//!
//! Per table the loop is
//! `Idle -> LoadingCursor -> Extracting -> MappingRow -> Writing -> AdvancingCursor -> Extracting ...`
//! until the source runs dry. Rows are written one at a time in key order and
//! the cursor only advances past a row once its intents are applied, so the
//! checkpoint never runs ahead of the graph.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use civicgraph_common::{Cursor, Paging, Selection, SourceTable, SyncConfig, SyncError, WriteUnit};
use civicgraph_graph::{GraphSink, Mutation};

use crate::checkpoint::CheckpointStore;
use crate::deadline::within;
use crate::extractor::{Extractor, KeyedRow};
use crate::mapper::map_row;
use crate::source::{Position, RowSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    LoadingCursor,
    Extracting,
    MappingRow,
    Writing,
    AdvancingCursor,
}

/// Outcome of one table's run.
#[derive(Debug, Clone, PartialEq)]
pub struct TableReport {
    pub table: SourceTable,
    /// Rows in scope when the run started.
    pub total: i64,
    pub batches: u64,
    pub rows_read: u64,
    /// Rows that mapped to no intents, such as enrichment rows without an article.
    pub rows_skipped: u64,
    pub mutations: u64,
    pub resumed_from: Cursor,
    pub last_cursor: Cursor,
    pub checkpoint_failures: u64,
}

impl TableReport {
    fn new(table: SourceTable, total: i64, start: Cursor) -> Self {
        Self {
            table,
            total,
            batches: 0,
            rows_read: 0,
            rows_skipped: 0,
            mutations: 0,
            resumed_from: start.clone(),
            last_cursor: start,
            checkpoint_failures: 0,
        }
    }

    fn record_row(&mut self, mutations: usize) {
        self.rows_read += 1;
        self.mutations += mutations as u64;
        if mutations == 0 {
            self.rows_skipped += 1;
        }
    }
}

impl fmt::Display for TableReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} rows ({} skipped), {} mutations in {} batches, cursor {} -> {}",
            self.table,
            self.rows_read,
            self.total,
            self.rows_skipped,
            self.mutations,
            self.batches,
            display_cursor(&self.resumed_from),
            display_cursor(&self.last_cursor),
        )?;
        if self.checkpoint_failures > 0 {
            write!(f, ", {} checkpoint saves failed", self.checkpoint_failures)?;
        }
        Ok(())
    }
}

fn display_cursor(cursor: &Cursor) -> String {
    if cursor.is_start() {
        "start".to_string()
    } else {
        cursor.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub tables: Vec<TableReport>,
}

impl SyncReport {
    pub fn rows_read(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_read).sum()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Sync Report ===")?;
        for table in &self.tables {
            writeln!(f, "{table}")?;
        }
        write!(f, "Total rows: {}", self.rows_read())
    }
}

/// Mutable state of one table run.
struct TableRun {
    table: SourceTable,
    persist: bool,
    phase: SyncPhase,
    /// Last row whose intents were fully applied.
    cursor: Cursor,
    /// Last cursor known to be durable.
    saved: Cursor,
    report: TableReport,
}

impl TableRun {
    fn enter(&mut self, next: SyncPhase) {
        if self.phase != next {
            debug!(table = %self.table, from = ?self.phase, to = ?next, "Sync phase");
            self.phase = next;
        }
    }
}

pub struct SyncOrchestrator {
    extractor: Extractor,
    sink: Arc<dyn GraphSink>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: SyncConfig,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn RowSource>,
        sink: Arc<dyn GraphSink>,
        checkpoints: Arc<dyn CheckpointStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            extractor: Extractor::new(source, config.store_timeout),
            sink,
            checkpoints,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Sync every configured table, in order. The first failing table ends the run.
    pub async fn run(&self, selection: &Selection) -> Result<SyncReport, SyncError> {
        self.run_at(selection, Utc::now()).await
    }

    /// Like [`run`](Self::run), with rolling windows measured from `now`.
    pub async fn run_at(
        &self,
        selection: &Selection,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        for &table in &self.config.tables {
            let table_report = self.sync_table(table, selection, now).await?;
            info!("{table_report}");
            report.tables.push(table_report);
        }
        Ok(report)
    }

    pub async fn sync_table(
        &self,
        table: SourceTable,
        selection: &Selection,
        now: DateTime<Utc>,
    ) -> Result<TableReport, SyncError> {
        let persist = selection.persists_checkpoint();
        let window = selection.window(now);
        let paging = selection.paging();
        let limit = match paging {
            Paging::Cursor => self.config.batch_size,
            Paging::Offset => self.config.recent_batch_size,
        }
        .max(1);

        let mut run = TableRun {
            table,
            persist,
            phase: SyncPhase::Idle,
            cursor: Cursor::start(table.cursor_kind()),
            saved: Cursor::start(table.cursor_kind()),
            report: TableReport::new(table, 0, Cursor::start(table.cursor_kind())),
        };

        run.enter(SyncPhase::LoadingCursor);
        if persist {
            let start = within(
                "checkpoint load",
                self.config.store_timeout,
                self.checkpoints.load(table),
            )
            .await?;
            run.cursor = start.clone();
            run.saved = start;
        }
        let total = self.extractor.count(table, &window).await?;
        run.report = TableReport::new(table, total, run.cursor.clone());

        info!(
            table = %table,
            selection = %selection,
            total,
            cursor = %display_cursor(&run.cursor),
            "Syncing table"
        );

        let mut offset: u64 = 0;
        loop {
            run.enter(SyncPhase::Extracting);
            let position = match paging {
                Paging::Cursor => Position::After(run.cursor.clone()),
                Paging::Offset => Position::Offset(offset),
            };
            let batch = self
                .extractor
                .next_batch(table, &position, &window, limit)
                .await?;
            run.report.batches += 1;
            if batch.is_empty() {
                break;
            }

            let fetched = batch.len();
            match self.config.write_unit {
                WriteUnit::Row => self.write_rows(&mut run, batch).await?,
                WriteUnit::Batch => self.write_batch(&mut run, batch).await?,
            }
            offset += fetched as u64;

            info!(
                table = %table,
                cursor = %run.cursor,
                processed = run.report.rows_read,
                total,
                "Completed batch"
            );
            self.checkpoint(&mut run).await;

            // A short batch means the source is drained.
            if fetched < limit {
                break;
            }
        }

        run.enter(SyncPhase::Idle);
        run.report.last_cursor = run.cursor.clone();
        Ok(run.report)
    }

    async fn write_rows(&self, run: &mut TableRun, batch: Vec<KeyedRow>) -> Result<(), SyncError> {
        for KeyedRow { cursor, row } in batch {
            run.enter(SyncPhase::MappingRow);
            let mutations = map_row(run.table, &row);

            run.enter(SyncPhase::Writing);
            self.apply(run, &cursor, &mutations).await?;

            run.enter(SyncPhase::AdvancingCursor);
            run.report.record_row(mutations.len());
            run.cursor = cursor;

            let every = self.config.progress_every as u64;
            if every > 0 && run.report.rows_read % every == 0 {
                info!(
                    table = %run.table,
                    processed = run.report.rows_read,
                    total = run.report.total,
                    cursor = %run.cursor,
                    "Progress"
                );
                self.checkpoint(run).await;
            }
        }
        Ok(())
    }

    /// One unit of work for the whole batch. A failure leaves the cursor before the batch.
    async fn write_batch(&self, run: &mut TableRun, batch: Vec<KeyedRow>) -> Result<(), SyncError> {
        let (Some(first), Some(last)) = (batch.first(), batch.last()) else {
            return Ok(());
        };
        let (first, last) = (first.cursor.clone(), last.cursor.clone());

        run.enter(SyncPhase::MappingRow);
        let mut mutations = Vec::new();
        let mut per_row = Vec::with_capacity(batch.len());
        for keyed in &batch {
            let mapped = map_row(run.table, &keyed.row);
            per_row.push(mapped.len());
            mutations.extend(mapped);
        }

        run.enter(SyncPhase::Writing);
        self.apply(run, &first, &mutations).await?;

        run.enter(SyncPhase::AdvancingCursor);
        for n in per_row {
            run.report.record_row(n);
        }
        run.cursor = last;
        Ok(())
    }

    /// Apply intents for the row at `at`. On failure, persist the last good cursor and halt.
    async fn apply(
        &self,
        run: &mut TableRun,
        at: &Cursor,
        mutations: &[Mutation],
    ) -> Result<(), SyncError> {
        if mutations.is_empty() {
            debug!(table = %run.table, cursor = %at, "Row maps to nothing, skipped");
            return Ok(());
        }

        let result = within(
            "graph write",
            self.config.store_timeout,
            self.sink.apply(mutations),
        )
        .await;

        if let Err(source) = result {
            warn!(
                table = %run.table,
                cursor = %at,
                last_good = %run.cursor,
                error = %source,
                "Write failed, halting table"
            );
            self.checkpoint(run).await;
            return Err(SyncError::Write {
                table: run.table,
                cursor: at.clone(),
                last_good: run.cursor.clone(),
                source: Box::new(source),
            });
        }
        Ok(())
    }

    /// Persist the current cursor if it moved. Failures are logged, never fatal:
    /// the graph keeps what was written and the next run reprocesses a little more.
    async fn checkpoint(&self, run: &mut TableRun) {
        if !run.persist || run.cursor.partial_cmp(&run.saved) != Some(Ordering::Greater) {
            return;
        }
        let saved = within(
            "checkpoint save",
            self.config.store_timeout,
            self.checkpoints.save(run.table, &run.cursor),
        )
        .await;
        match saved {
            Ok(()) => run.saved = run.cursor.clone(),
            Err(e) => {
                run.report.checkpoint_failures += 1;
                warn!(table = %run.table, cursor = %run.cursor, error = %e, "Checkpoint save failed");
            }
        }
    }
}
