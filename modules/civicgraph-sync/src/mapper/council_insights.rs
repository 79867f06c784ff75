use civicgraph_common::decode::{decode_list, decode_quotes, decode_typed_entities, LIST_DELIMITER};
use civicgraph_common::{SourceRow, SourceTable};
use civicgraph_graph::{Mutation, NodeLabel, NodeMerge, NodeRef, PropValue, RelMerge, RelType};

use super::{dedup, prop, MapperRole, RowMapper};

/// Attributes refreshed on every write, as `(column, property)`.
const ATTRIBUTES: [(&str, &str); 8] = [
    ("category", "category"),
    ("insight_title", "title"),
    ("insight_description", "description"),
    ("vote_result", "voteResult"),
    ("next_steps", "nextSteps"),
    ("sentiment", "sentiment"),
    ("importance", "importance"),
    ("city", "city"),
];

/// Set once, when the insight is first seen.
const FIRST_SEEN: [(&str, &str); 4] = [
    ("start_time", "startTime"),
    ("end_time", "endTime"),
    ("timestamp", "timestamp"),
    ("created_at", "createdAt"),
];

/// Copied onto the meeting link when present.
const SEGMENT: [(&str, &str); 3] = [
    ("start_time", "startTime"),
    ("end_time", "endTime"),
    ("timestamp", "timestamp"),
];

pub struct CouncilInsightMapper;

impl RowMapper for CouncilInsightMapper {
    fn table(&self) -> SourceTable {
        SourceTable::CouncilInsights
    }

    fn role(&self) -> MapperRole {
        MapperRole::Creating
    }

    fn map(&self, row: &SourceRow) -> Vec<Mutation> {
        let Some(id) = row.text("id") else {
            return Vec::new();
        };
        let insight = NodeRef::insight(id.as_str());
        let city = row.text("city");

        let node = ATTRIBUTES
            .iter()
            .fold(NodeMerge::create(insight.clone()), |node, (column, property)| {
                node.set(*property, prop(row, column))
            });
        let node = FIRST_SEEN.iter().fold(node, |node, (column, property)| {
            node.on_create(*property, prop(row, column))
        });
        let mut out: Vec<Mutation> = vec![node.into()];

        if let Some(video_id) = row.text("video_id") {
            let meeting = NodeRef::meeting(video_id.as_str());
            let link = RelMerge::new(meeting, RelType::HasInsight, insight.clone())
                .from_on_create("sourceType", "CouncilMeeting")
                .from_on_create("city", prop(row, "city"));
            let link = SEGMENT
                .iter()
                .filter(|(column, _)| row.get(column).is_some())
                .fold(link, |link, (column, property)| link.set(*property, prop(row, column)));
            out.push(link.into());
        }

        if let Some(city) = &city {
            out.push(
                RelMerge::new(insight.clone(), RelType::AboutCity, NodeRef::city(city, None)).into(),
            );
        }

        for quote in decode_quotes(row.get("quotes")) {
            let quote_ref = NodeRef::new(NodeLabel::Quote)
                .key("text", quote.text.as_str())
                .key("insightId", id.as_str())
                .key("index", quote.index as i64);
            out.push(RelMerge::new(insight.clone(), RelType::HasQuote, quote_ref.clone()).into());
            if let Some(speaker) = &quote.speaker {
                out.push(RelMerge::new(NodeRef::person(speaker), RelType::Stated, quote_ref).into());
            }
        }

        for (entity_type, names) in decode_typed_entities(row.get("entities")) {
            let kind = EntityKind::classify(&entity_type);
            for name in dedup(names) {
                out.push(
                    RelMerge::new(insight.clone(), RelType::MentionsEntity, kind.node(&name))
                        .key("type", kind.type_name())
                        .into(),
                );
            }
        }

        for figure in dedup(decode_list(row.get("key_figures"), LIST_DELIMITER)) {
            out.push(
                RelMerge::new(insight.clone(), RelType::MentionsFigure, NodeRef::person(&figure)).into(),
            );
        }

        for topic in dedup(decode_list(row.get("related_topics"), LIST_DELIMITER)) {
            let issue = NodeRef::issue(&topic);
            out.push(RelMerge::new(insight.clone(), RelType::ConcernsTopic, issue.clone()).into());
            if let Some(city) = &city {
                out.push(RelMerge::new(NodeRef::city(city, None), RelType::HasIssue, issue).into());
            }
        }

        out
    }
}

/// Canonical entity categories. Unknown categories keep their lowercased name.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EntityKind {
    Person,
    Organization,
    Location,
    Other(String),
}

impl EntityKind {
    fn classify(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        match lower.as_str() {
            "person" | "persons" | "people" => Self::Person,
            "organization" | "organizations" | "org" | "orgs" => Self::Organization,
            "location" | "locations" | "place" | "places" => Self::Location,
            _ => Self::Other(lower),
        }
    }

    fn type_name(&self) -> String {
        match self {
            Self::Person => "person".into(),
            Self::Organization => "organization".into(),
            Self::Location => "location".into(),
            Self::Other(name) => name.clone(),
        }
    }

    fn node(&self, name: &str) -> NodeRef {
        match self {
            Self::Person => NodeRef::person(name),
            Self::Organization => NodeRef::new(NodeLabel::Organization).key("name", name),
            Self::Location => NodeRef::new(NodeLabel::Location).key("name", name),
            Self::Other(kind) => NodeRef::new(NodeLabel::Entity)
                .key("name", name)
                .key("type", kind.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use civicgraph_common::ColumnValue;
    use serde_json::json;

    const ID: &str = "9c1d0000-0000-4000-8000-0000000000aa";

    fn text(s: &str) -> ColumnValue {
        ColumnValue::Text(s.into())
    }

    fn row() -> SourceRow {
        SourceRow::new()
            .with("id", text(ID))
            .with("category", text("vote"))
            .with("insight_title", text("Transit levy passes"))
            .with(
                "created_at",
                ColumnValue::Timestamp(Utc.with_ymd_and_hms(2024, 3, 2, 18, 0, 0).unwrap()),
            )
    }

    fn rels(out: &[Mutation], rel: RelType) -> Vec<&RelMerge> {
        out.iter()
            .filter_map(|m| match m {
                Mutation::Relationship(r) if r.rel == rel => Some(r),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn insight_refreshes_attributes_but_keeps_first_seen_times() {
        let out = CouncilInsightMapper.map(&row());
        let Mutation::Node(node) = &out[0] else {
            panic!("expected insight node");
        };
        assert_eq!(node.on_create.len(), ATTRIBUTES.len() + FIRST_SEEN.len());
        assert_eq!(node.on_match.len(), ATTRIBUTES.len());
        assert!(node.on_match.iter().all(|(k, _)| *k != "createdAt"));
        assert!(node.on_match.contains(&("title", PropValue::Text("Transit levy passes".into()))));
    }

    #[test]
    fn meeting_link_carries_present_segment_times_only() {
        let row = row()
            .with("video_id", text("vid-7"))
            .with("city", text("Springfield"))
            .with("start_time", ColumnValue::Float(12.5))
            .with("end_time", ColumnValue::Null);
        let out = CouncilInsightMapper.map(&row);

        let links = rels(&out, RelType::HasInsight);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].from, NodeRef::meeting("vid-7"));
        assert_eq!(links[0].on_create, vec![("startTime", PropValue::Float(12.5))]);
        assert_eq!(links[0].from_on_create[0], ("sourceType", PropValue::Text("CouncilMeeting".into())));
        assert_eq!(rels(&out, RelType::AboutCity).len(), 1);
    }

    #[test]
    fn quotes_keep_source_positions() {
        let row = row().with(
            "quotes",
            text(r#"["First", {"speaker": "Nobody"}, {"quote": "First", "speaker": "Mayor Lee"}]"#),
        );
        let out = CouncilInsightMapper.map(&row);

        let quotes = rels(&out, RelType::HasQuote);
        assert_eq!(quotes.len(), 2);
        let indices: Vec<&PropValue> = quotes.iter().map(|r| &r.to.key[2].1).collect();
        assert_eq!(indices, vec![&PropValue::Int(0), &PropValue::Int(2)]);

        let stated = rels(&out, RelType::Stated);
        assert_eq!(stated.len(), 1);
        assert_eq!(stated[0].from, NodeRef::person("Mayor Lee"));
        assert_eq!(stated[0].to, quotes[1].to);
    }

    #[test]
    fn malformed_quotes_are_ignored() {
        let row = row().with("quotes", text("[not json"));
        let out = CouncilInsightMapper.map(&row);
        assert!(rels(&out, RelType::HasQuote).is_empty());
    }

    #[test]
    fn entities_map_to_canonical_labels() {
        let row = row().with(
            "entities",
            ColumnValue::Json(json!({
                "People": ["Jane Doe"],
                "orgs": ["Metro Transit"],
                "places": ["Main St"],
                "Programs": ["Safe Routes"]
            })),
        );
        let out = CouncilInsightMapper.map(&row);
        let mentions = rels(&out, RelType::MentionsEntity);
        assert_eq!(mentions.len(), 4);

        let find = |label: NodeLabel| mentions.iter().find(|r| r.to.label == label).unwrap();
        assert_eq!(find(NodeLabel::Person).key, vec![("type", PropValue::Text("person".into()))]);
        assert_eq!(
            find(NodeLabel::Organization).key,
            vec![("type", PropValue::Text("organization".into()))]
        );
        let other = find(NodeLabel::Entity);
        assert_eq!(other.key, vec![("type", PropValue::Text("programs".into()))]);
        assert!(other.to.key.contains(&("type", PropValue::Text("programs".into()))));
    }

    #[test]
    fn related_topics_link_city_only_when_known() {
        let without_city = row().with("related_topics", text("Transit, Budget"));
        let out = CouncilInsightMapper.map(&without_city);
        assert_eq!(rels(&out, RelType::ConcernsTopic).len(), 2);
        assert!(rels(&out, RelType::HasIssue).is_empty());

        let with_city = without_city.with("city", text("Springfield"));
        let out = CouncilInsightMapper.map(&with_city);
        assert_eq!(rels(&out, RelType::HasIssue).len(), 2);
    }

    #[test]
    fn key_figures_become_people() {
        let row = row().with(
            "key_figures",
            ColumnValue::TextList(vec!["Mayor Lee".into(), "Mayor Lee".into()]),
        );
        let out = CouncilInsightMapper.map(&row);
        assert_eq!(rels(&out, RelType::MentionsFigure).len(), 1);
    }
}
