//! Graph mutation intents.
//!
//! Mappers describe what a row means for the graph as a list of `Mutation`s;
//! the writer decides how to execute them. Every intent is keyed on natural keys
//! only, so applying the same intent twice converges on the same nodes and edges.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;

use civicgraph_common::ColumnValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeLabel {
    Article,
    City,
    State,
    Issue,
    Person,
    Organization,
    Location,
    Entity,
    Meeting,
    Insight,
    Quote,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Article => "Article",
            Self::City => "City",
            Self::State => "State",
            Self::Issue => "Issue",
            Self::Person => "Person",
            Self::Organization => "Organization",
            Self::Location => "Location",
            Self::Entity => "Entity",
            Self::Meeting => "Meeting",
            Self::Insight => "Insight",
            Self::Quote => "Quote",
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelType {
    PublishedIn,
    LocatedIn,
    HasTopic,
    HasIssue,
    MentionsPerson,
    HasArticle,
    HasInsight,
    AboutCity,
    ConcernsTopic,
    HasQuote,
    Stated,
    MentionsEntity,
    MentionsFigure,
    HasMeeting,
}

impl RelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PublishedIn => "PUBLISHED_IN",
            Self::LocatedIn => "LOCATED_IN",
            Self::HasTopic => "HAS_TOPIC",
            Self::HasIssue => "HAS_ISSUE",
            Self::MentionsPerson => "MENTIONS_PERSON",
            Self::HasArticle => "HAS_ARTICLE",
            Self::HasInsight => "HAS_INSIGHT",
            Self::AboutCity => "ABOUT_CITY",
            Self::ConcernsTopic => "CONCERNS_TOPIC",
            Self::HasQuote => "HAS_QUOTE",
            Self::Stated => "STATED",
            Self::MentionsEntity => "MENTIONS_ENTITY",
            Self::MentionsFigure => "MENTIONS_FIGURE",
            Self::HasMeeting => "HAS_MEETING",
        }
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A property value bound into a graph statement.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    TextList(Vec<String>),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    /// The store's clock at write time.
    Now,
}

impl PropValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PropValue::Null)
    }
}

/// Decimals narrow to f64; JSON is stored as its text form.
impl From<&ColumnValue> for PropValue {
    fn from(value: &ColumnValue) -> Self {
        match value {
            ColumnValue::Null => PropValue::Null,
            ColumnValue::Int(n) => PropValue::Int(*n),
            ColumnValue::Float(f) => PropValue::Float(*f),
            ColumnValue::Decimal(d) => d.to_f64().map(PropValue::Float).unwrap_or(PropValue::Null),
            ColumnValue::Text(s) => PropValue::Text(s.clone()),
            ColumnValue::Bool(b) => PropValue::Bool(*b),
            ColumnValue::Timestamp(ts) => PropValue::DateTime(*ts),
            ColumnValue::Date(d) => PropValue::Date(*d),
            ColumnValue::Json(serde_json::Value::String(s)) => PropValue::Text(s.clone()),
            ColumnValue::Json(serde_json::Value::Null) => PropValue::Null,
            ColumnValue::Json(v) => PropValue::Text(v.to_string()),
            ColumnValue::TextList(items) => PropValue::TextList(items.clone()),
        }
    }
}

impl From<Option<&ColumnValue>> for PropValue {
    fn from(value: Option<&ColumnValue>) -> Self {
        value.map(PropValue::from).unwrap_or(PropValue::Null)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Text(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Text(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

/// Ordered `(property, value)` pairs.
pub type Props = Vec<(&'static str, PropValue)>;

/// A node addressed by its natural key.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRef {
    pub label: NodeLabel,
    pub key: Props,
}

impl NodeRef {
    pub fn new(label: NodeLabel) -> Self {
        Self {
            label,
            key: Vec::new(),
        }
    }

    pub fn key(mut self, name: &'static str, value: impl Into<PropValue>) -> Self {
        self.key.push((name, value.into()));
        self
    }

    /// A key component that is only part of the key when present.
    pub fn key_opt(self, name: &'static str, value: Option<impl Into<PropValue>>) -> Self {
        match value {
            Some(v) => self.key(name, v),
            None => self,
        }
    }

    pub fn article(id: impl Into<PropValue>) -> Self {
        Self::new(NodeLabel::Article).key("id", id)
    }

    pub fn city(name: &str, state: Option<&str>) -> Self {
        Self::new(NodeLabel::City).key("name", name).key_opt("state", state)
    }

    pub fn issue(name: &str) -> Self {
        Self::new(NodeLabel::Issue).key("name", name)
    }

    pub fn person(name: &str) -> Self {
        Self::new(NodeLabel::Person).key("name", name)
    }

    pub fn meeting(id: impl Into<PropValue>) -> Self {
        Self::new(NodeLabel::Meeting).key("id", id)
    }

    pub fn insight(id: impl Into<PropValue>) -> Self {
        Self::new(NodeLabel::Insight).key("id", id)
    }
}

/// Whether a node merge may bring a node into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Create the node when absent.
    Create,
    /// Update an existing node only; a missing node makes the intent a no-op.
    Augment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeMerge {
    pub node: NodeRef,
    pub mode: MergeMode,
    pub on_create: Props,
    pub on_match: Props,
}

impl NodeMerge {
    pub fn create(node: NodeRef) -> Self {
        Self {
            node,
            mode: MergeMode::Create,
            on_create: Vec::new(),
            on_match: Vec::new(),
        }
    }

    pub fn augment(node: NodeRef) -> Self {
        Self {
            node,
            mode: MergeMode::Augment,
            on_create: Vec::new(),
            on_match: Vec::new(),
        }
    }

    pub fn on_create(mut self, name: &'static str, value: impl Into<PropValue>) -> Self {
        self.on_create.push((name, value.into()));
        self
    }

    pub fn on_match(mut self, name: &'static str, value: impl Into<PropValue>) -> Self {
        self.on_match.push((name, value.into()));
        self
    }

    /// Set on both branches.
    pub fn set(self, name: &'static str, value: impl Into<PropValue>) -> Self {
        let value = value.into();
        self.on_create(name, value.clone()).on_match(name, value)
    }
}

/// A relationship merged between two nodes, both merged by natural key first.
#[derive(Debug, Clone, PartialEq)]
pub struct RelMerge {
    pub from: NodeRef,
    pub rel: RelType,
    pub to: NodeRef,
    /// Properties that are part of the relationship's identity.
    pub key: Props,
    pub on_create: Props,
    pub on_match: Props,
    /// Properties set on the source node only when it is created by this merge.
    pub from_on_create: Props,
}

impl RelMerge {
    pub fn new(from: NodeRef, rel: RelType, to: NodeRef) -> Self {
        Self {
            from,
            rel,
            to,
            key: Vec::new(),
            on_create: Vec::new(),
            on_match: Vec::new(),
            from_on_create: Vec::new(),
        }
    }

    pub fn key(mut self, name: &'static str, value: impl Into<PropValue>) -> Self {
        self.key.push((name, value.into()));
        self
    }

    pub fn on_create(mut self, name: &'static str, value: impl Into<PropValue>) -> Self {
        self.on_create.push((name, value.into()));
        self
    }

    pub fn on_match(mut self, name: &'static str, value: impl Into<PropValue>) -> Self {
        self.on_match.push((name, value.into()));
        self
    }

    /// Set on both branches.
    pub fn set(self, name: &'static str, value: impl Into<PropValue>) -> Self {
        let value = value.into();
        self.on_create(name, value.clone()).on_match(name, value)
    }

    pub fn from_on_create(mut self, name: &'static str, value: impl Into<PropValue>) -> Self {
        self.from_on_create.push((name, value.into()));
        self
    }
}

/// One article mentioning one topic in one city.
#[derive(Debug, Clone, PartialEq)]
pub struct MentionFact {
    pub article_id: PropValue,
    pub topic: String,
    pub city: String,
    pub state: String,
    pub mentioned_at: PropValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Node(NodeMerge),
    Relationship(RelMerge),
    Mention(MentionFact),
}

impl From<NodeMerge> for Mutation {
    fn from(m: NodeMerge) -> Self {
        Mutation::Node(m)
    }
}

impl From<RelMerge> for Mutation {
    fn from(m: RelMerge) -> Self {
        Mutation::Relationship(m)
    }
}

impl From<MentionFact> for Mutation {
    fn from(m: MentionFact) -> Self {
        Mutation::Mention(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn decimals_narrow_to_float() {
        let d = ColumnValue::Decimal(Decimal::from_str("0.8125").unwrap());
        assert_eq!(PropValue::from(&d), PropValue::Float(0.8125));
    }

    #[test]
    fn json_columns_store_as_text() {
        let v = ColumnValue::Json(serde_json::json!({"a": 1}));
        assert_eq!(PropValue::from(&v), PropValue::Text("{\"a\":1}".into()));
        assert_eq!(PropValue::from(None), PropValue::Null);
    }

    #[test]
    fn city_key_omits_missing_state() {
        let with_state = NodeRef::city("Springfield", Some("IL"));
        let without = NodeRef::city("Springfield", None);
        assert_eq!(with_state.key.len(), 2);
        assert_eq!(without.key, vec![("name", PropValue::Text("Springfield".into()))]);
    }

    #[test]
    fn set_applies_to_both_branches() {
        let m = NodeMerge::create(NodeRef::meeting("m1")).set("title", "Council");
        assert_eq!(m.on_create, m.on_match);
        assert_eq!(m.on_create.len(), 1);
    }
}
