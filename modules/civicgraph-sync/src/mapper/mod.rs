//! Row-to-graph mapping, one mapper per source table.
//!
//! Mappers are pure: the same row always yields the same ordered intents. A
//! mapper is either *creating* (it owns its root node and may bring it into
//! existence) or *augmenting* (it only decorates nodes another table created).
//! The role is enforced in [`map_row`], not left to the store's ON MATCH branch.

pub mod articles;
pub mod council_articles;
pub mod council_insights;
pub mod council_videos;
pub mod news_articles;

use tracing::warn;

use civicgraph_common::{SourceRow, SourceTable};
use civicgraph_graph::{MergeMode, Mutation, PropValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperRole {
    Creating,
    Augmenting,
}

pub trait RowMapper: Send + Sync {
    fn table(&self) -> SourceTable;

    fn role(&self) -> MapperRole;

    /// Intents for one row, in application order. Empty means "skip the row".
    fn map(&self, row: &SourceRow) -> Vec<Mutation>;
}

pub fn mapper_for(table: SourceTable) -> &'static dyn RowMapper {
    match table {
        SourceTable::NewsArticles => &news_articles::NewsArticleMapper,
        SourceTable::Articles => &articles::ArticleEnrichmentMapper,
        SourceTable::CouncilArticles => &council_articles::CouncilArticleMapper,
        SourceTable::CouncilInsights => &council_insights::CouncilInsightMapper,
        SourceTable::CouncilVideos => &council_videos::CouncilVideoMapper,
    }
}

/// Map a row with its table's mapper and enforce the mapper's role.
pub fn map_row(table: SourceTable, row: &SourceRow) -> Vec<Mutation> {
    let mapper = mapper_for(table);
    let mutations = mapper.map(row);
    match mapper.role() {
        MapperRole::Creating => mutations,
        MapperRole::Augmenting => augment_only(table, mutations),
    }
}

/// Augmenting mappers may only emit match-only node intents.
fn augment_only(table: SourceTable, mutations: Vec<Mutation>) -> Vec<Mutation> {
    mutations
        .into_iter()
        .filter(|m| {
            let allowed = matches!(m, Mutation::Node(n) if n.mode == MergeMode::Augment);
            if !allowed {
                warn!(table = %table, "Dropping creating intent from augmenting mapper");
            }
            allowed
        })
        .collect()
}

/// Column value as a graph property; missing and NULL both map to null.
fn prop(row: &SourceRow, column: &str) -> PropValue {
    PropValue::from(row.get(column))
}

/// Drop repeats, keeping the first occurrence.
fn dedup(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
