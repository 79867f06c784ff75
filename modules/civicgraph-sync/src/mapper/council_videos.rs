use civicgraph_common::{SourceRow, SourceTable};
use civicgraph_graph::{Mutation, NodeMerge, NodeRef, RelMerge, RelType};

use super::{prop, MapperRole, RowMapper};

const ATTRIBUTES: [(&str, &str); 6] = [
    ("youtube_url", "youtubeUrl"),
    ("meeting_title", "title"),
    ("meeting_date", "meetingDate"),
    ("video_duration", "duration"),
    ("city", "city"),
    ("youtube_video_id", "youtubeVideoId"),
];

/// Council meeting recordings become `Meeting` nodes.
pub struct CouncilVideoMapper;

impl RowMapper for CouncilVideoMapper {
    fn table(&self) -> SourceTable {
        SourceTable::CouncilVideos
    }

    fn role(&self) -> MapperRole {
        MapperRole::Creating
    }

    fn map(&self, row: &SourceRow) -> Vec<Mutation> {
        let Some(id) = row.text("id") else {
            return Vec::new();
        };
        let meeting = NodeRef::meeting(id.as_str());

        let node = ATTRIBUTES
            .iter()
            .fold(NodeMerge::create(meeting.clone()), |node, (column, property)| {
                node.set(*property, prop(row, column))
            })
            .on_create("sourceType", "CouncilMeeting")
            .on_create("createdAt", prop(row, "created_at"));
        let mut out: Vec<Mutation> = vec![node.into()];

        if let Some(city) = row.text("city") {
            out.push(RelMerge::new(NodeRef::city(&city, None), RelType::HasMeeting, meeting).into());
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use civicgraph_common::ColumnValue;
    use civicgraph_graph::PropValue;

    fn row() -> SourceRow {
        SourceRow::new()
            .with("id", ColumnValue::Text("a1b2".into()))
            .with("meeting_title", ColumnValue::Text("Regular session".into()))
            .with(
                "meeting_date",
                ColumnValue::Date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()),
            )
            .with("video_duration", ColumnValue::Int(5400))
    }

    #[test]
    fn meeting_attributes_refresh_and_source_type_is_fixed() {
        let out = CouncilVideoMapper.map(&row());
        assert_eq!(out.len(), 1);
        let Mutation::Node(node) = &out[0] else {
            panic!("expected meeting node");
        };
        assert_eq!(node.node, NodeRef::meeting("a1b2"));
        assert!(node.on_match.contains(&("duration", PropValue::Int(5400))));
        assert!(node.on_create.contains(&("sourceType", PropValue::Text("CouncilMeeting".into()))));
        assert!(!node.on_match.iter().any(|(k, _)| *k == "sourceType"));
    }

    #[test]
    fn city_links_meeting() {
        let out = CouncilVideoMapper.map(&row().with("city", ColumnValue::Text("Springfield".into())));
        let Mutation::Relationship(rel) = &out[1] else {
            panic!("expected city link");
        };
        assert_eq!(rel.rel, RelType::HasMeeting);
        assert_eq!(rel.from, NodeRef::city("Springfield", None));
        assert_eq!(rel.to, NodeRef::meeting("a1b2"));
    }

    #[test]
    fn rows_without_id_map_to_nothing() {
        let row = SourceRow::new().with("meeting_title", ColumnValue::Text("x".into()));
        assert!(CouncilVideoMapper.map(&row).is_empty());
    }
}
