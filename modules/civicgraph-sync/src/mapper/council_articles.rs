use civicgraph_common::decode::{decode_list, LIST_DELIMITER};
use civicgraph_common::{SourceRow, SourceTable};
use civicgraph_graph::{Mutation, NodeMerge, NodeRef, PropValue, RelMerge, RelType};

use super::{dedup, prop, MapperRole, RowMapper};

pub struct CouncilArticleMapper;

impl RowMapper for CouncilArticleMapper {
    fn table(&self) -> SourceTable {
        SourceTable::CouncilArticles
    }

    fn role(&self) -> MapperRole {
        MapperRole::Creating
    }

    fn map(&self, row: &SourceRow) -> Vec<Mutation> {
        let Some(id) = row.text("id") else {
            return Vec::new();
        };
        let article = NodeRef::article(id.as_str());

        let mut out: Vec<Mutation> = vec![NodeMerge::create(article.clone())
            .on_create("title", prop(row, "article_title"))
            .on_create("content", prop(row, "article_content"))
            .on_create("summary", prop(row, "summary"))
            .on_create("sourceType", "CouncilMeeting")
            .on_create("importanceScore", prop(row, "importance_score"))
            .into()];

        if let Some(video_id) = row.text("video_id") {
            out.push(
                RelMerge::new(
                    NodeRef::meeting(video_id.as_str()),
                    RelType::HasArticle,
                    article.clone(),
                )
                .into(),
            );
        }

        for insight_id in dedup(decode_list(row.get("related_insight_ids"), LIST_DELIMITER)) {
            out.push(
                RelMerge::new(
                    article.clone(),
                    RelType::HasInsight,
                    NodeRef::insight(PropValue::from(insight_id)),
                )
                .into(),
            );
        }

        for topic in dedup(decode_list(row.get("topic_tags"), LIST_DELIMITER)) {
            out.push(RelMerge::new(article.clone(), RelType::HasTopic, NodeRef::issue(&topic)).into());
        }

        out
    }
}
