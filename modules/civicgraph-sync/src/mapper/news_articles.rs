use civicgraph_common::decode::{decode_list, LIST_DELIMITER};
use civicgraph_common::{SourceRow, SourceTable};
use civicgraph_graph::{
    MentionFact, Mutation, NodeLabel, NodeMerge, NodeRef, PropValue, RelMerge, RelType,
};

use super::{dedup, prop, MapperRole, RowMapper};

const TOPIC_COLUMNS: [&str; 4] = ["topic_1", "topic_2", "topic_3", "main_topic"];

/// Primary content: creates `Article` nodes and their place, topic and person links.
pub struct NewsArticleMapper;

impl RowMapper for NewsArticleMapper {
    fn table(&self) -> SourceTable {
        SourceTable::NewsArticles
    }

    fn role(&self) -> MapperRole {
        MapperRole::Creating
    }

    fn map(&self, row: &SourceRow) -> Vec<Mutation> {
        let Some(id) = row.get("id") else {
            return Vec::new();
        };
        let article = NodeRef::article(PropValue::from(id));
        let published = prop(row, "date_posted");

        let mut out: Vec<Mutation> = vec![NodeMerge::create(article.clone())
            .on_create("title", prop(row, "title"))
            .on_create("summary", prop(row, "summary"))
            .on_create("content", prop(row, "full_content"))
            .on_create("publishDate", published.clone())
            .on_create("url", prop(row, "url"))
            .on_create("sentimentScore", prop(row, "sentiment"))
            .on_match("summary", prop(row, "summary"))
            .on_match("content", prop(row, "full_content"))
            .on_match("sentimentScore", prop(row, "sentiment"))
            .into()];

        let location = row.text("city_seo").zip(row.text("state_seo"));
        if let Some((city, state)) = &location {
            let city_ref = NodeRef::city(city, Some(state.as_str()));
            out.push(RelMerge::new(article.clone(), RelType::PublishedIn, city_ref.clone()).into());
            out.push(
                RelMerge::new(
                    city_ref,
                    RelType::LocatedIn,
                    NodeRef::new(NodeLabel::State).key("name", state.as_str()),
                )
                .into(),
            );
        }

        for topic in topics(row) {
            out.push(
                RelMerge::new(article.clone(), RelType::HasTopic, NodeRef::issue(&topic))
                    .on_create("publishDate", published.clone())
                    .on_create("createdAt", PropValue::Now)
                    .on_match("updatedAt", PropValue::Now)
                    .into(),
            );
            if let Some((city, state)) = &location {
                out.push(
                    MentionFact {
                        article_id: PropValue::from(id),
                        topic,
                        city: city.clone(),
                        state: state.clone(),
                        mentioned_at: published.clone(),
                    }
                    .into(),
                );
            }
        }

        for person in dedup(decode_list(row.get("entity_person"), LIST_DELIMITER)) {
            out.push(
                RelMerge::new(article.clone(), RelType::MentionsPerson, NodeRef::person(&person))
                    .into(),
            );
        }

        out
    }
}

/// The fixed topic columns followed by the keyword list, trimmed and de-duplicated.
fn topics(row: &SourceRow) -> Vec<String> {
    let fixed = TOPIC_COLUMNS.iter().filter_map(|column| row.text(column));
    let keywords = decode_list(row.get("topic_keywords"), LIST_DELIMITER);
    dedup(fixed.chain(keywords))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use civicgraph_common::ColumnValue;

    fn text(s: &str) -> ColumnValue {
        ColumnValue::Text(s.into())
    }

    fn base_row() -> SourceRow {
        SourceRow::new()
            .with("id", ColumnValue::Int(42))
            .with("title", text("Council approves budget"))
            .with("summary", text("Short"))
            .with("full_content", text("Long"))
            .with(
                "date_posted",
                ColumnValue::Date(NaiveDate::from_ymd_opt(2024, 2, 10).unwrap()),
            )
            .with("url", text("https://example.org/a/42"))
            .with("sentiment", ColumnValue::Float(0.4))
    }

    fn rels(out: &[Mutation], rel: RelType) -> Vec<&RelMerge> {
        out.iter()
            .filter_map(|m| match m {
                Mutation::Relationship(r) if r.rel == rel => Some(r),
                _ => None,
            })
            .collect()
    }

    fn mentions(out: &[Mutation]) -> Vec<&MentionFact> {
        out.iter()
            .filter_map(|m| match m {
                Mutation::Mention(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn article_node_splits_create_and_match_fields() {
        let out = NewsArticleMapper.map(&base_row());
        let Mutation::Node(node) = &out[0] else {
            panic!("first intent must be the article node");
        };
        let created: Vec<&str> = node.on_create.iter().map(|(k, _)| *k).collect();
        let matched: Vec<&str> = node.on_match.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            created,
            vec!["title", "summary", "content", "publishDate", "url", "sentimentScore"]
        );
        assert_eq!(matched, vec!["summary", "content", "sentimentScore"]);
        assert_eq!(node.node, NodeRef::article(42i64));
    }

    #[test]
    fn location_requires_city_and_state() {
        let row = base_row().with("city_seo", text("springfield"));
        let out = NewsArticleMapper.map(&row);
        assert!(rels(&out, RelType::PublishedIn).is_empty());

        let row = base_row()
            .with("city_seo", text("springfield"))
            .with("state_seo", text("il"));
        let out = NewsArticleMapper.map(&row);
        assert_eq!(rels(&out, RelType::PublishedIn).len(), 1);
        assert_eq!(rels(&out, RelType::LocatedIn).len(), 1);
    }

    #[test]
    fn topics_merge_fixed_columns_and_keywords() {
        let row = base_row()
            .with("topic_1", text("Housing"))
            .with("topic_2", text(" "))
            .with("main_topic", text("Housing"))
            .with("topic_keywords", text("zoning, transit ,,Housing"));
        let out = NewsArticleMapper.map(&row);

        let names: Vec<PropValue> = rels(&out, RelType::HasTopic)
            .iter()
            .map(|r| r.to.key[0].1.clone())
            .collect();
        assert_eq!(
            names,
            vec![
                PropValue::Text("Housing".into()),
                PropValue::Text("zoning".into()),
                PropValue::Text("transit".into()),
            ]
        );
        // No location, so no mention facts.
        assert!(mentions(&out).is_empty());
    }

    #[test]
    fn each_topic_with_location_records_one_mention() {
        let row = base_row()
            .with("city_seo", text("springfield"))
            .with("state_seo", text("il"))
            .with("topic_1", text("Transit"))
            .with(
                "topic_keywords",
                ColumnValue::TextList(vec!["Parks".into(), "Transit".into()]),
            );
        let out = NewsArticleMapper.map(&row);

        let facts = mentions(&out);
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].topic, "Transit");
        assert_eq!(facts[1].topic, "Parks");
        assert_eq!(facts[0].article_id, PropValue::Int(42));
        assert_eq!(facts[0].city, "springfield");
        assert_eq!(
            facts[0].mentioned_at,
            PropValue::Date(NaiveDate::from_ymd_opt(2024, 2, 10).unwrap())
        );
    }

    #[test]
    fn persons_from_delimited_text() {
        let row = base_row().with("entity_person", text("Jane Doe, John Roe,"));
        let out = NewsArticleMapper.map(&row);
        assert_eq!(rels(&out, RelType::MentionsPerson).len(), 2);
    }

    #[test]
    fn mapping_is_deterministic() {
        let row = base_row()
            .with("city_seo", text("springfield"))
            .with("state_seo", text("il"))
            .with("topic_1", text("Transit"));
        assert_eq!(NewsArticleMapper.map(&row), NewsArticleMapper.map(&row));
    }
}
