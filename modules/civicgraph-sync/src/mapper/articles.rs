use civicgraph_common::{SourceRow, SourceTable};
use civicgraph_graph::{Mutation, NodeMerge, NodeRef, PropValue};

use super::{prop, MapperRole, RowMapper};

/// `(column, property)` pairs copied onto the article.
const METRICS: [(&str, &str); 9] = [
    ("engagement_score", "engagementScore"),
    ("view_count", "viewCount"),
    ("share_count", "shareCount"),
    ("comment_count", "commentCount"),
    ("reading_time_minutes", "readingTime"),
    ("complexity_score", "complexityScore"),
    ("fact_density", "factDensity"),
    ("is_opinion", "isOpinion"),
    ("sentiment_category", "sentimentCategory"),
];

/// Enrichment rows: decorate an existing `Article`, never create one.
pub struct ArticleEnrichmentMapper;

impl RowMapper for ArticleEnrichmentMapper {
    fn table(&self) -> SourceTable {
        SourceTable::Articles
    }

    fn role(&self) -> MapperRole {
        MapperRole::Augmenting
    }

    fn map(&self, row: &SourceRow) -> Vec<Mutation> {
        let Some(article_id) = row.get("news_article_id") else {
            return Vec::new();
        };

        let node = METRICS.iter().fold(
            NodeMerge::augment(NodeRef::article(PropValue::from(article_id))),
            |node, (column, property)| node.on_match(*property, prop(row, column)),
        );
        vec![node.into()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civicgraph_common::ColumnValue;
    use civicgraph_graph::MergeMode;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn rows_without_foreign_key_are_skipped() {
        let row = SourceRow::new()
            .with("id", ColumnValue::Int(1))
            .with("news_article_id", ColumnValue::Null)
            .with("view_count", ColumnValue::Int(10));
        assert!(ArticleEnrichmentMapper.map(&row).is_empty());
    }

    #[test]
    fn metrics_are_match_only_on_the_referenced_article() {
        let row = SourceRow::new()
            .with("id", ColumnValue::Int(1))
            .with("news_article_id", ColumnValue::Int(42))
            .with("view_count", ColumnValue::Int(10))
            .with(
                "complexity_score",
                ColumnValue::Decimal(Decimal::from_str("3.25").unwrap()),
            )
            .with("is_opinion", ColumnValue::Bool(true));

        let out = ArticleEnrichmentMapper.map(&row);
        assert_eq!(out.len(), 1);
        let Mutation::Node(node) = &out[0] else {
            panic!("expected a node intent");
        };
        assert_eq!(node.mode, MergeMode::Augment);
        assert_eq!(node.node, NodeRef::article(42i64));
        assert!(node.on_create.is_empty());
        assert_eq!(node.on_match.len(), METRICS.len());
        assert!(node.on_match.contains(&("viewCount", PropValue::Int(10))));
        assert!(node.on_match.contains(&("complexityScore", PropValue::Float(3.25))));
        assert!(node.on_match.contains(&("isOpinion", PropValue::Bool(true))));
        assert!(node.on_match.contains(&("shareCount", PropValue::Null)));
    }
}
