use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

// ---------------------------------------------------------------------------
// Source tables
// ---------------------------------------------------------------------------

/// A relational table that is synchronized into the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTable {
    NewsArticles,
    Articles,
    #[serde(alias = "council_meeting_articles")]
    CouncilArticles,
    #[serde(alias = "council_meeting_insights")]
    CouncilInsights,
    #[serde(alias = "council_meeting_videos")]
    CouncilVideos,
}

impl SourceTable {
    /// Sync order for a full run. Enrichment rows come after the rows they augment.
    pub const ALL: [SourceTable; 5] = [
        SourceTable::NewsArticles,
        SourceTable::Articles,
        SourceTable::CouncilArticles,
        SourceTable::CouncilInsights,
        SourceTable::CouncilVideos,
    ];

    /// Physical table name in Postgres.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewsArticles => "news_articles",
            Self::Articles => "articles",
            Self::CouncilArticles => "council_meeting_articles",
            Self::CouncilInsights => "council_meeting_insights",
            Self::CouncilVideos => "council_meeting_videos",
        }
    }

    /// Name under which the table's cursor is persisted.
    pub fn checkpoint_name(&self) -> &'static str {
        match self {
            Self::NewsArticles => "news_articles",
            Self::Articles => "articles",
            Self::CouncilArticles => "council_articles",
            Self::CouncilInsights => "council_insights",
            Self::CouncilVideos => "council_videos",
        }
    }

    pub fn key_column(&self) -> &'static str {
        "id"
    }

    pub fn cursor_kind(&self) -> CursorKind {
        match self {
            Self::NewsArticles | Self::Articles => CursorKind::Sequence,
            Self::CouncilArticles | Self::CouncilInsights | Self::CouncilVideos => {
                CursorKind::Lexicographic
            }
        }
    }

    /// Column filtered by the rolling and explicit-range selection modes.
    pub fn timestamp_column(&self) -> &'static str {
        match self {
            Self::NewsArticles => "date",
            Self::Articles => "processed_at",
            Self::CouncilArticles | Self::CouncilInsights | Self::CouncilVideos => "created_at",
        }
    }
}

impl fmt::Display for SourceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceTable {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "news_articles" => Ok(Self::NewsArticles),
            "articles" => Ok(Self::Articles),
            "council_meeting_articles" | "council_articles" => Ok(Self::CouncilArticles),
            "council_meeting_insights" | "council_insights" => Ok(Self::CouncilInsights),
            "council_meeting_videos" | "council_videos" => Ok(Self::CouncilVideos),
            other => Err(SyncError::Config(format!("unknown table: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Cursors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorKind {
    /// Integer primary key.
    Sequence,
    /// Unique identifier ordered by its text form.
    Lexicographic,
}

/// The last processed ordering key of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cursor {
    Seq(i64),
    Key(String),
}

impl Cursor {
    /// The "start of table" sentinel: zero for sequences, empty string for keys.
    pub fn start(kind: CursorKind) -> Self {
        match kind {
            CursorKind::Sequence => Cursor::Seq(0),
            CursorKind::Lexicographic => Cursor::Key(String::new()),
        }
    }

    pub fn kind(&self) -> CursorKind {
        match self {
            Cursor::Seq(_) => CursorKind::Sequence,
            Cursor::Key(_) => CursorKind::Lexicographic,
        }
    }

    pub fn is_start(&self) -> bool {
        match self {
            Cursor::Seq(n) => *n == 0,
            Cursor::Key(k) => k.is_empty(),
        }
    }

    /// Parse a persisted cursor. Blank input yields the start sentinel.
    pub fn parse(kind: CursorKind, raw: &str) -> Result<Self, SyncError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Cursor::start(kind));
        }
        match kind {
            CursorKind::Sequence => raw
                .parse::<i64>()
                .map(Cursor::Seq)
                .map_err(|e| SyncError::Checkpoint(format!("invalid sequence cursor {raw:?}: {e}"))),
            CursorKind::Lexicographic => Ok(Cursor::Key(raw.to_string())),
        }
    }

    /// Extract the ordering key of a row.
    pub fn from_row(row: &SourceRow, column: &str, kind: CursorKind) -> Option<Self> {
        match (kind, row.get(column)?) {
            (CursorKind::Sequence, ColumnValue::Int(n)) => Some(Cursor::Seq(*n)),
            (CursorKind::Sequence, ColumnValue::Text(s)) => s.trim().parse().ok().map(Cursor::Seq),
            (CursorKind::Lexicographic, value) => value.as_text().map(Cursor::Key),
            _ => None,
        }
    }
}

/// Cursors of different kinds are not comparable.
impl PartialOrd for Cursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Cursor::Seq(a), Cursor::Seq(b)) => Some(a.cmp(b)),
            (Cursor::Key(a), Cursor::Key(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::Seq(n) => write!(f, "{n}"),
            Cursor::Key(k) => f.write_str(k),
        }
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// A single column value as delivered by the relational source.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Json(serde_json::Value),
    TextList(Vec<String>),
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    /// Text form of scalar values. Lists, JSON and nulls have none.
    pub fn as_text(&self) -> Option<String> {
        match self {
            ColumnValue::Text(s) => Some(s.clone()),
            ColumnValue::Int(n) => Some(n.to_string()),
            ColumnValue::Float(f) => Some(f.to_string()),
            ColumnValue::Decimal(d) => Some(d.to_string()),
            ColumnValue::Bool(b) => Some(b.to_string()),
            ColumnValue::Timestamp(ts) => Some(ts.to_rfc3339()),
            ColumnValue::Date(d) => Some(d.to_string()),
            ColumnValue::Json(serde_json::Value::String(s)) => Some(s.clone()),
            ColumnValue::Null | ColumnValue::Json(_) | ColumnValue::TextList(_) => None,
        }
    }

    /// Event time of the value, for window checks.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            ColumnValue::Timestamp(ts) => Some(*ts),
            ColumnValue::Date(d) => d.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc()),
            _ => None,
        }
    }
}

/// An ordered column-name/value mapping for one source row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRow {
    columns: Vec<(String, ColumnValue)>,
}

impl SourceRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: ColumnValue) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: ColumnValue) {
        self.columns.push((name.into(), value));
    }

    /// Column value, treating SQL NULL the same as a missing column.
    pub fn get(&self, name: &str) -> Option<&ColumnValue> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .filter(|v| !v.is_null())
    }

    /// Trimmed, non-empty text of a column.
    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(ColumnValue::as_text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &ColumnValue)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Selection modes
// ---------------------------------------------------------------------------

/// Longest rolling window accepted from callers: ten years.
pub const MAX_RECENT_HOURS: i64 = 87_600;

/// Which rows a synchronization run covers. Mutually exclusive per run.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Everything after the persisted checkpoint.
    Backlog,
    /// Rows stamped within the last `hours` of invocation time. Offset paging, no checkpoint.
    Recent { hours: i64 },
    /// Rows stamped inside the closed interval `[start, end]`. Cursor paging, no checkpoint.
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// How successive batches are addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paging {
    Cursor,
    Offset,
}

impl Selection {
    /// Rolling window over the last `hours`, at most [`MAX_RECENT_HOURS`].
    pub fn recent(hours: i64) -> Result<Self, SyncError> {
        if !(1..=MAX_RECENT_HOURS).contains(&hours) {
            return Err(SyncError::Config(format!(
                "recent window must be 1..={MAX_RECENT_HOURS} hours, got {hours}"
            )));
        }
        Ok(Selection::Recent { hours })
    }

    /// Range over whole days: `start` at midnight, `end` widened to 23:59:59.
    pub fn for_days(start: NaiveDate, end: NaiveDate) -> Result<Self, SyncError> {
        if end < start {
            return Err(SyncError::Config(format!(
                "range end {end} is before start {start}"
            )));
        }
        let start = start
            .and_hms_opt(0, 0, 0)
            .map(|ndt| ndt.and_utc())
            .ok_or_else(|| SyncError::Config(format!("invalid start date {start}")))?;
        let end = end
            .and_hms_opt(23, 59, 59)
            .map(|ndt| ndt.and_utc())
            .ok_or_else(|| SyncError::Config(format!("invalid end date {end}")))?;
        Ok(Selection::Range { start, end })
    }

    pub fn window(&self, now: DateTime<Utc>) -> Window {
        match self {
            Selection::Backlog => Window::Unbounded,
            // A lookback reaching past the representable range covers everything.
            Selection::Recent { hours } => Duration::try_hours(*hours)
                .and_then(|lookback| now.checked_sub_signed(lookback))
                .map_or(Window::Unbounded, Window::Since),
            Selection::Range { start, end } => Window::Between(*start, *end),
        }
    }

    pub fn paging(&self) -> Paging {
        match self {
            Selection::Recent { .. } => Paging::Offset,
            Selection::Backlog | Selection::Range { .. } => Paging::Cursor,
        }
    }

    /// Only the full backlog reads and writes the checkpoint store.
    pub fn persists_checkpoint(&self) -> bool {
        matches!(self, Selection::Backlog)
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Backlog => write!(f, "backlog"),
            Selection::Recent { hours } => write!(f, "last {hours}h"),
            Selection::Range { start, end } => {
                write!(f, "{} to {}", start.format("%Y-%m-%d %H:%M:%S"), end.format("%Y-%m-%d %H:%M:%S"))
            }
        }
    }
}

/// A resolved timestamp predicate. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Window {
    Unbounded,
    Since(DateTime<Utc>),
    Between(DateTime<Utc>, DateTime<Utc>),
}

impl Window {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        match self {
            Window::Unbounded => true,
            Window::Since(start) => ts >= *start,
            Window::Between(start, end) => ts >= *start && ts <= *end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn start_sentinels_per_kind() {
        assert_eq!(Cursor::start(CursorKind::Sequence), Cursor::Seq(0));
        assert_eq!(Cursor::start(CursorKind::Lexicographic), Cursor::Key(String::new()));
        assert!(Cursor::Seq(0).is_start());
        assert!(!Cursor::Key("a".into()).is_start());
    }

    #[test]
    fn parse_blank_is_start() {
        assert_eq!(Cursor::parse(CursorKind::Sequence, "  \n").unwrap(), Cursor::Seq(0));
        assert_eq!(Cursor::parse(CursorKind::Sequence, "120\n").unwrap(), Cursor::Seq(120));
        assert!(Cursor::parse(CursorKind::Sequence, "abc").is_err());
        assert_eq!(
            Cursor::parse(CursorKind::Lexicographic, "0b7c").unwrap(),
            Cursor::Key("0b7c".into())
        );
    }

    #[test]
    fn mixed_cursor_kinds_do_not_compare() {
        assert!(Cursor::Seq(1) < Cursor::Seq(2));
        assert!(Cursor::Key("a".into()) < Cursor::Key("b".into()));
        assert_eq!(Cursor::Seq(1).partial_cmp(&Cursor::Key("1".into())), None);
    }

    #[test]
    fn cursor_from_row_reads_key_column() {
        let row = SourceRow::new()
            .with("id", ColumnValue::Int(42))
            .with("title", ColumnValue::Text("x".into()));
        assert_eq!(Cursor::from_row(&row, "id", CursorKind::Sequence), Some(Cursor::Seq(42)));
        assert_eq!(
            Cursor::from_row(&row, "id", CursorKind::Lexicographic),
            Some(Cursor::Key("42".into()))
        );
        assert_eq!(Cursor::from_row(&row, "missing", CursorKind::Sequence), None);
    }

    #[test]
    fn null_columns_read_as_missing() {
        let row = SourceRow::new()
            .with("city_seo", ColumnValue::Null)
            .with("state_seo", ColumnValue::Text("  ".into()));
        assert!(row.get("city_seo").is_none());
        assert!(row.text("state_seo").is_none());
    }

    #[test]
    fn table_names_and_aliases() {
        assert_eq!("council_articles".parse::<SourceTable>().unwrap(), SourceTable::CouncilArticles);
        assert_eq!("news_articles".parse::<SourceTable>().unwrap(), SourceTable::NewsArticles);
        assert!("users".parse::<SourceTable>().is_err());
        assert_eq!(SourceTable::CouncilVideos.cursor_kind(), CursorKind::Lexicographic);
        assert_eq!(SourceTable::Articles.timestamp_column(), "processed_at");
    }

    #[test]
    fn range_boundaries_are_inclusive() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let window = Selection::for_days(start, end).unwrap().window(Utc::now());

        let at_start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let at_end = Utc.with_ymd_and_hms(2024, 3, 7, 23, 59, 59).unwrap();
        let past_end = at_end + Duration::seconds(1);
        let before_start = at_start - Duration::seconds(1);

        assert!(window.contains(at_start));
        assert!(window.contains(at_end));
        assert!(!window.contains(past_end));
        assert!(!window.contains(before_start));
    }

    #[test]
    fn range_rejects_inverted_days() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(Selection::for_days(start, end).is_err());
    }

    #[test]
    fn recent_window_is_relative_to_now() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let window = Selection::Recent { hours: 24 }.window(now);
        assert_eq!(window, Window::Since(Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap()));
        assert_eq!(Selection::Recent { hours: 24 }.paging(), Paging::Offset);
        assert!(!Selection::Recent { hours: 24 }.persists_checkpoint());
        assert!(Selection::Backlog.persists_checkpoint());
    }

    #[test]
    fn oversized_lookback_is_rejected_or_unbounded() {
        assert!(Selection::recent(0).is_err());
        assert!(Selection::recent(i64::MAX).is_err());
        assert_eq!(
            Selection::recent(MAX_RECENT_HOURS).unwrap(),
            Selection::Recent { hours: MAX_RECENT_HOURS }
        );

        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        assert_eq!(Selection::Recent { hours: i64::MAX }.window(now), Window::Unbounded);
    }
}
