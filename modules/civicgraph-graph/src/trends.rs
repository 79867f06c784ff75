//! Time-windowed topic trend rollups.
//!
//! A trend node summarizes one (topic, city) pair over one calendar period.
//! Each run recomputes the period from the article/topic associations and
//! overwrites the node, so re-running a period yields the same snapshot.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use neo4rs::query;
use tracing::{debug, info};

use civicgraph_common::SyncError;

use crate::GraphClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Day,
    Week,
    Month,
}

impl Granularity {
    fn trend_label(&self) -> &'static str {
        match self {
            Self::Day => "TopicTrendDaily",
            Self::Week => "TopicTrendWeekly",
            Self::Month => "TopicTrend",
        }
    }

    fn period_property(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "yearWeek",
            Self::Month => "yearMonth",
        }
    }

    fn city_rel(&self) -> &'static str {
        match self {
            Self::Day => "DAILY_TREND",
            Self::Week => "WEEKLY_TREND",
            Self::Month => "MONTHLY_TREND",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day => write!(f, "daily"),
            Self::Week => write!(f, "weekly"),
            Self::Month => write!(f, "monthly"),
        }
    }
}

impl FromStr for Granularity {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Self::Day),
            "week" | "weekly" => Ok(Self::Week),
            "month" | "monthly" => Ok(Self::Month),
            other => Err(SyncError::Period(format!("unknown granularity: {other}"))),
        }
    }
}

/// A calendar period `[start, end)` with its key.
///
/// Keys: `YYYY-MM-DD` for days, `YYYY-Www` for weeks (the `%W` week of the
/// period's Monday, so days before a year's first Monday fall in the previous
/// year's last week), `YYYY-MM` for months.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    pub granularity: Granularity,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub key: String,
}

impl Period {
    /// The period containing `date`.
    pub fn containing(granularity: Granularity, date: NaiveDate) -> Result<Self, SyncError> {
        match granularity {
            Granularity::Day => {
                let end = date
                    .succ_opt()
                    .ok_or_else(|| SyncError::Period(format!("no day after {date}")))?;
                Ok(Self {
                    granularity,
                    start: date,
                    end,
                    key: date.format("%Y-%m-%d").to_string(),
                })
            }
            Granularity::Week => {
                let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
                Ok(Self {
                    granularity,
                    start: monday,
                    end: monday + Duration::days(7),
                    // Keyed by the week of its Monday.
                    key: monday.format("%Y-W%W").to_string(),
                })
            }
            Granularity::Month => {
                let start = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
                    .ok_or_else(|| SyncError::Period(format!("invalid month of {date}")))?;
                let end = first_of_next_month(start)?;
                Ok(Self {
                    granularity,
                    start,
                    end,
                    key: start.format("%Y-%m").to_string(),
                })
            }
        }
    }

    /// The most recent period that ended on or before `today`.
    pub fn last_completed(granularity: Granularity, today: NaiveDate) -> Result<Self, SyncError> {
        let current = Self::containing(granularity, today)?;
        let before = current
            .start
            .pred_opt()
            .ok_or_else(|| SyncError::Period(format!("no period before {}", current.start)))?;
        Self::containing(granularity, before)
    }

    /// Parse an explicit period key.
    pub fn parse(granularity: Granularity, key: &str) -> Result<Self, SyncError> {
        let key = key.trim();
        let bad = || SyncError::Period(format!("{key:?} is not a valid {granularity} period key"));

        match granularity {
            Granularity::Day => {
                let date = NaiveDate::parse_from_str(key, "%Y-%m-%d").map_err(|_| bad())?;
                Self::containing(granularity, date)
            }
            Granularity::Month => {
                let (year, month) = key.split_once('-').ok_or_else(bad)?;
                let year: i32 = year.parse().map_err(|_| bad())?;
                let month: u32 = month.parse().map_err(|_| bad())?;
                let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(bad)?;
                Self::containing(granularity, start)
            }
            Granularity::Week => {
                let (year, week) = key.split_once("-W").ok_or_else(bad)?;
                let year: i32 = year.parse().map_err(|_| bad())?;
                let week: i64 = week.parse().map_err(|_| bad())?;
                if !(0..=53).contains(&week) {
                    return Err(bad());
                }
                let monday = first_monday(year).ok_or_else(bad)? + Duration::weeks(week - 1);
                let period = Self::containing(granularity, monday)?;
                // Weeks are keyed by their Monday, so week 00 and a missing week 53
                // belong to a neighbouring year under another key.
                let canonical = format!("{year:04}-W{week:02}");
                if period.key != canonical {
                    return Err(SyncError::Period(format!(
                        "{key:?} is week {} under Monday-based keys",
                        period.key
                    )));
                }
                Ok(period)
            }
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}, {})", self.granularity, self.key, self.start, self.end)
    }
}

fn first_of_next_month(start: NaiveDate) -> Result<NaiveDate, SyncError> {
    let (year, month) = if start.month() == 12 {
        (start.year() + 1, 1)
    } else {
        (start.year(), start.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| SyncError::Period(format!("no month after {start}")))
}

/// First Monday of `year`: the start of `%W` week 01.
fn first_monday(year: i32) -> Option<NaiveDate> {
    let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let offset = (7 - jan1.weekday().num_days_from_monday()) % 7;
    Some(jan1 + Duration::days(offset as i64))
}

/// One recomputed trend snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendRow {
    pub city: String,
    pub state: String,
    pub topic: String,
    pub mention_count: i64,
    pub average_sentiment: Option<f64>,
}

/// Recomputes trend nodes for a period from committed graph state.
pub struct TrendAggregator {
    client: GraphClient,
}

impl TrendAggregator {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Recompute and overwrite every (city, topic) trend node for `period`.
    pub async fn aggregate(&self, period: &Period) -> Result<Vec<TrendRow>, SyncError> {
        info!(period = %period, "Generating topic trends");

        let q = query(&trend_cypher(period.granularity))
            .param("startDate", period.start)
            .param("endDate", period.end)
            .param("periodKey", period.key.as_str());

        let mut stream = self.client.graph.execute(q).await?;
        let mut trends = Vec::new();
        while let Some(row) = stream.next().await? {
            let trend = TrendRow {
                city: row.get("city").unwrap_or_default(),
                state: row.get("state").unwrap_or_default(),
                topic: row.get("topic").unwrap_or_default(),
                mention_count: row.get("mentionCount").unwrap_or_default(),
                average_sentiment: row.get::<Option<f64>>("avgSentiment").ok().flatten(),
            };
            debug!(
                city = trend.city.as_str(),
                topic = trend.topic.as_str(),
                count = trend.mention_count,
                sentiment = ?trend.average_sentiment,
                "Updated trend"
            );
            trends.push(trend);
        }

        info!(period = period.key.as_str(), trends = trends.len(), "Topic trends updated");
        Ok(trends)
    }
}

/// Aggregate article/topic associations in `[startDate, endDate)` per (city, topic)
/// and overwrite the period's trend nodes.
fn trend_cypher(granularity: Granularity) -> String {
    let label = granularity.trend_label();
    let period = granularity.period_property();
    let rel = granularity.city_rel();
    format!(
        "MATCH (c:City)<-[:PUBLISHED_IN]-(a:Article)-[rel:HAS_TOPIC]->(i:Issue)
         WHERE rel.publishDate IS NOT NULL
           AND date(rel.publishDate) >= $startDate
           AND date(rel.publishDate) < $endDate
         WITH c, i,
              count(DISTINCT a) AS mentionCount,
              avg(a.sentimentScore) AS avgSentiment
         MERGE (tt:{label} {{
           topicName: i.name,
           cityName: c.name,
           cityState: coalesce(c.state, ''),
           {period}: $periodKey
         }})
         SET tt.mentionCount = mentionCount,
             tt.averageSentiment = avgSentiment,
             tt.periodStart = $startDate,
             tt.periodEnd = $endDate,
             tt.lastUpdated = datetime()
         MERGE (c)-[:{rel}]->(tt)
         MERGE (tt)-[:TREND_OF]->(i)
         RETURN c.name AS city, coalesce(c.state, '') AS state, i.name AS topic,
                mentionCount, avgSentiment"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn last_completed_month() {
        let p = Period::last_completed(Granularity::Month, d(2024, 3, 15)).unwrap();
        assert_eq!(p.start, d(2024, 2, 1));
        assert_eq!(p.end, d(2024, 3, 1));
        assert_eq!(p.key, "2024-02");
    }

    #[test]
    fn last_completed_month_wraps_year() {
        let p = Period::last_completed(Granularity::Month, d(2024, 1, 1)).unwrap();
        assert_eq!(p.key, "2023-12");
        assert_eq!(p.end, d(2024, 1, 1));
    }

    #[test]
    fn december_ends_next_january() {
        let p = Period::parse(Granularity::Month, "2023-12").unwrap();
        assert_eq!(p.start, d(2023, 12, 1));
        assert_eq!(p.end, d(2024, 1, 1));
    }

    #[test]
    fn last_completed_week_starts_on_previous_monday() {
        // 2024-03-15 is a Friday; the current week starts Monday 2024-03-11.
        let p = Period::last_completed(Granularity::Week, d(2024, 3, 15)).unwrap();
        assert_eq!(p.start, d(2024, 3, 4));
        assert_eq!(p.end, d(2024, 3, 11));
        assert_eq!(p.key, "2024-W10");
    }

    #[test]
    fn week_keys_round_trip_through_parse() {
        let p = Period::parse(Granularity::Week, "2024-W10").unwrap();
        assert_eq!(p.start, d(2024, 3, 4));

        assert_eq!(p.key, "2024-W10");
        let w1 = Period::parse(Granularity::Week, "2023-W01").unwrap();
        assert_eq!(w1.start, d(2023, 1, 2));
        assert_eq!(w1.key, "2023-W01");
        assert_eq!(Period::parse(Granularity::Week, "2023-W1").unwrap().key, "2023-W01");
    }

    #[test]
    fn week_keys_owned_by_another_year_are_rejected() {
        // 2023 starts on a Sunday, so its week 00 is the Monday-keyed 2022-W52.
        let err = Period::parse(Granularity::Week, "2023-W00").unwrap_err();
        assert!(err.to_string().contains("2022-W52"));
        // 2024 starts on a Monday and has no week 00 at all.
        assert!(Period::parse(Granularity::Week, "2024-W00").is_err());
        // 2023 has 52 Mondays; its week 53 would be 2024-W01.
        assert!(Period::parse(Granularity::Week, "2023-W53").is_err());
        assert_eq!(Period::parse(Granularity::Week, "2024-W53").unwrap().start, d(2024, 12, 30));
        assert_eq!(
            Period::parse(Granularity::Week, "2022-W52").unwrap().start,
            d(2022, 12, 26)
        );
    }

    #[test]
    fn last_completed_day_is_yesterday() {
        let p = Period::last_completed(Granularity::Day, d(2024, 3, 1)).unwrap();
        assert_eq!(p.key, "2024-02-29");
        assert_eq!(p.end, d(2024, 3, 1));
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(Period::parse(Granularity::Month, "2024-13").is_err());
        assert!(Period::parse(Granularity::Month, "February").is_err());
        assert!(Period::parse(Granularity::Week, "2024-10").is_err());
        assert!(Period::parse(Granularity::Week, "2024-W60").is_err());
        assert!(Period::parse(Granularity::Day, "2024-02-30").is_err());
    }

    #[test]
    fn cypher_uses_granularity_names() {
        let monthly = trend_cypher(Granularity::Month);
        assert!(monthly.contains("MERGE (tt:TopicTrend {"));
        assert!(monthly.contains("yearMonth: $periodKey"));
        assert!(monthly.contains("[:MONTHLY_TREND]"));

        let weekly = trend_cypher(Granularity::Week);
        assert!(weekly.contains("TopicTrendWeekly"));
        assert!(weekly.contains("yearWeek: $periodKey"));
        assert!(weekly.contains("[:WEEKLY_TREND]"));
    }

    #[test]
    fn granularity_names() {
        assert_eq!("monthly".parse::<Granularity>().unwrap(), Granularity::Month);
        assert_eq!("week".parse::<Granularity>().unwrap(), Granularity::Week);
        assert!("yearly".parse::<Granularity>().is_err());
    }
}
