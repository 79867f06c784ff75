//! Relational source access.
//!
//! `RowSource` is the query capability the extractor consumes: ordered rows
//! after a cursor (or at an offset), optionally filtered by a timestamp window,
//! and a matching row count for progress reporting.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Postgres, QueryBuilder, Row, TypeInfo};
use tracing::debug;
use uuid::Uuid;

use civicgraph_common::{ColumnValue, Cursor, CursorKind, SourceRow, SourceTable, SyncError, Window};

/// Where a batch starts.
#[derive(Debug, Clone, PartialEq)]
pub enum Position {
    /// Rows strictly after this ordering key.
    After(Cursor),
    /// Rows after skipping this many matches of the window.
    Offset(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub table: SourceTable,
    pub position: Position,
    pub window: Window,
    pub limit: usize,
}

#[async_trait]
pub trait RowSource: Send + Sync {
    /// Up to `limit` rows in ascending ordering-key order.
    async fn fetch(&self, request: &BatchRequest) -> Result<Vec<SourceRow>, SyncError>;

    /// Rows of `table` inside `window`.
    async fn count(&self, table: SourceTable, window: &Window) -> Result<i64, SyncError>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgRowSource {
    pool: PgPool,
}

impl PgRowSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, SyncError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RowSource for PgRowSource {
    async fn fetch(&self, request: &BatchRequest) -> Result<Vec<SourceRow>, SyncError> {
        let mut qb = select_batch(request);
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn count(&self, table: SourceTable, window: &Window) -> Result<i64, SyncError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT COUNT(*) FROM {} WHERE TRUE",
            table.name()
        ));
        push_window(&mut qb, table, window);
        let (n,): (i64,) = qb.build_query_as().fetch_one(&self.pool).await?;
        Ok(n)
    }
}

/// Ordering expression. Identifier keys compare by their text form in byte
/// order, which is also how `Cursor::Key` compares.
fn key_expr(table: SourceTable) -> String {
    match table.cursor_kind() {
        CursorKind::Sequence => table.key_column().to_string(),
        CursorKind::Lexicographic => format!("({}::text COLLATE \"C\")", table.key_column()),
    }
}

fn select_batch(request: &BatchRequest) -> QueryBuilder<'static, Postgres> {
    let table = request.table;
    let key = key_expr(table);
    let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT * FROM {} WHERE TRUE", table.name()));

    if let Position::After(cursor) = &request.position {
        qb.push(format!(" AND {key} > "));
        match cursor {
            Cursor::Seq(n) => qb.push_bind(*n),
            Cursor::Key(k) => qb.push_bind(k.clone()),
        };
    }

    push_window(&mut qb, table, &request.window);

    qb.push(format!(" ORDER BY {key} ASC LIMIT "));
    qb.push_bind(request.limit as i64);

    if let Position::Offset(offset) = request.position {
        qb.push(" OFFSET ");
        qb.push_bind(offset as i64);
    }
    qb
}

fn push_window(qb: &mut QueryBuilder<'static, Postgres>, table: SourceTable, window: &Window) {
    let column = format!("\"{}\"", table.timestamp_column());
    match window {
        Window::Unbounded => {}
        Window::Since(start) => {
            qb.push(format!(" AND {column} >= "));
            qb.push_bind(*start);
        }
        Window::Between(start, end) => {
            qb.push(format!(" AND {column} >= "));
            qb.push_bind(*start);
            qb.push(format!(" AND {column} <= "));
            qb.push_bind(*end);
        }
    }
}

/// Convert a Postgres row into an ordered column/value mapping.
pub fn decode_row(row: &PgRow) -> Result<SourceRow, SyncError> {
    let mut out = SourceRow::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, idx, column.name(), column.type_info().name())?;
        out.push(column.name(), value);
    }
    Ok(out)
}

fn decode_column(
    row: &PgRow,
    idx: usize,
    name: &str,
    type_name: &str,
) -> Result<ColumnValue, sqlx::Error> {
    let value = match type_name {
        "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(|v| ColumnValue::Int(v.into())),
        "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(|v| ColumnValue::Int(v.into())),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(ColumnValue::Int),
        "FLOAT4" => row.try_get::<Option<f32>, _>(idx)?.map(|v| ColumnValue::Float(v.into())),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(ColumnValue::Float),
        "NUMERIC" => row.try_get::<Option<Decimal>, _>(idx)?.map(ColumnValue::Decimal),
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(ColumnValue::Bool),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(ColumnValue::Timestamp),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|ts| ColumnValue::Timestamp(ts.and_utc())),
        "DATE" => row.try_get::<Option<NaiveDate>, _>(idx)?.map(ColumnValue::Date),
        "UUID" => row
            .try_get::<Option<Uuid>, _>(idx)?
            .map(|id| ColumnValue::Text(id.to_string())),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(idx)?
            .map(ColumnValue::Json),
        "TEXT[]" | "VARCHAR[]" => row
            .try_get::<Option<Vec<String>>, _>(idx)?
            .map(ColumnValue::TextList),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            row.try_get::<Option<String>, _>(idx)?.map(ColumnValue::Text)
        }
        other => match row.try_get::<Option<String>, _>(idx) {
            Ok(v) => v.map(ColumnValue::Text),
            Err(_) => {
                debug!(column = name, pg_type = other, "Skipping column of unsupported type");
                None
            }
        },
    };
    Ok(value.unwrap_or(ColumnValue::Null))
}
