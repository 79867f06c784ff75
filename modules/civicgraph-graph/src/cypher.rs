//! Rendering of mutation intents into parameterized Cypher.
//!
//! Labels, relationship types and property names come from code, never from
//! row data, so they are interpolated; every value is a bound parameter.

use neo4rs::{query, Query};

use civicgraph_common::CounterMode;

use crate::mutation::{MentionFact, MergeMode, Mutation, NodeMerge, NodeRef, PropValue, Props, RelMerge};

/// A rendered statement with its parameters, in binding order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Vec<(String, PropValue)>,
}

impl Statement {
    fn new() -> Self {
        Self {
            text: String::new(),
            params: Vec::new(),
        }
    }

    fn line(&mut self, line: impl AsRef<str>) {
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(line.as_ref());
    }

    /// Bind a value and return the expression that refers to it.
    fn bind(&mut self, name: String, value: &PropValue) -> String {
        if matches!(value, PropValue::Now) {
            return "datetime()".to_string();
        }
        let expr = format!("${name}");
        self.params.push((name, value.clone()));
        expr
    }

    /// `{a: $p_a, b: $p_b}`
    fn key_map(&mut self, prefix: &str, props: &Props) -> String {
        let fields: Vec<String> = props
            .iter()
            .map(|(name, value)| {
                let expr = self.bind(format!("{prefix}_{name}"), value);
                format!("{name}: {expr}")
            })
            .collect();
        format!("{{{}}}", fields.join(", "))
    }

    /// `v.a = $p_a, v.b = $p_b`
    fn assignments(&mut self, var: &str, prefix: &str, props: &Props) -> String {
        props
            .iter()
            .map(|(name, value)| {
                let expr = self.bind(format!("{prefix}_{name}"), value);
                format!("{var}.{name} = {expr}")
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn merge_node(&mut self, var: &str, node: &NodeRef) {
        let key = self.key_map(var, &node.key);
        self.line(format!("MERGE ({var}:{} {key})", node.label));
    }

    fn set_branches(&mut self, var: &str, on_create: &Props, on_match: &Props) {
        if !on_create.is_empty() {
            let sets = self.assignments(var, &format!("{var}_c"), on_create);
            self.line(format!("ON CREATE SET {sets}"));
        }
        if !on_match.is_empty() {
            let sets = self.assignments(var, &format!("{var}_m"), on_match);
            self.line(format!("ON MATCH SET {sets}"));
        }
    }

    pub fn to_query(&self) -> Query {
        self.params
            .iter()
            .fold(query(&self.text), |q, (name, value)| bind_param(q, name, value))
    }
}

fn bind_param(q: Query, name: &str, value: &PropValue) -> Query {
    match value {
        PropValue::Null | PropValue::Now => q.param::<Option<String>>(name, None),
        PropValue::Bool(b) => q.param(name, *b),
        PropValue::Int(n) => q.param(name, *n),
        PropValue::Float(f) => q.param(name, *f),
        PropValue::Text(s) => q.param(name, s.as_str()),
        PropValue::TextList(items) => q.param(name, items.clone()),
        PropValue::DateTime(ts) => q.param(name, ts.fixed_offset()),
        PropValue::Date(d) => q.param(name, *d),
    }
}

pub fn render(mutation: &Mutation, counters: CounterMode) -> Statement {
    match mutation {
        Mutation::Node(m) => render_node(m),
        Mutation::Relationship(m) => render_relationship(m),
        Mutation::Mention(m) => match counters {
            CounterMode::Derived => render_mention_derived(m),
            CounterMode::Increment => render_mention_increment(m),
        },
    }
}

fn render_node(m: &NodeMerge) -> Statement {
    let mut st = Statement::new();
    match m.mode {
        MergeMode::Create => {
            st.merge_node("n", &m.node);
            st.set_branches("n", &m.on_create, &m.on_match);
        }
        MergeMode::Augment => {
            let key = st.key_map("n", &m.node.key);
            st.line(format!("MATCH (n:{} {key})", m.node.label));
            if m.on_match.is_empty() {
                st.line("RETURN count(n) AS matched");
            } else {
                let sets = st.assignments("n", "n_m", &m.on_match);
                st.line(format!("SET {sets}"));
            }
        }
    }
    st
}

fn render_relationship(m: &RelMerge) -> Statement {
    let mut st = Statement::new();
    st.merge_node("a", &m.from);
    if !m.from_on_create.is_empty() {
        let sets = st.assignments("a", "a_c", &m.from_on_create);
        st.line(format!("ON CREATE SET {sets}"));
    }
    st.merge_node("b", &m.to);
    if m.key.is_empty() {
        st.line(format!("MERGE (a)-[r:{}]->(b)", m.rel));
    } else {
        let key = st.key_map("r", &m.key);
        st.line(format!("MERGE (a)-[r:{} {key}]->(b)", m.rel));
    }
    st.set_branches("r", &m.on_create, &m.on_match);
    st
}

fn mention_params(st: &mut Statement, m: &MentionFact) {
    st.params.push(("article_id".into(), m.article_id.clone()));
    st.params.push(("topic".into(), PropValue::Text(m.topic.clone())));
    st.params.push(("city".into(), PropValue::Text(m.city.clone())));
    st.params.push(("state".into(), PropValue::Text(m.state.clone())));
    st.params.push(("mentioned_at".into(), m.mentioned_at.clone()));
}

/// Record the fact, then recompute the city/topic counters from all facts.
fn render_mention_derived(m: &MentionFact) -> Statement {
    let mut st = Statement::new();
    st.line("MERGE (f:IssueMention {articleId: $article_id, topic: $topic, city: $city, state: $state})");
    st.line("ON CREATE SET f.mentionedAt = $mentioned_at, f.createdAt = datetime()");
    st.line("WITH f");
    st.line("MERGE (c:City {name: $city, state: $state})");
    st.line("MERGE (i:Issue {name: $topic})");
    st.line("MERGE (c)-[hi:HAS_ISSUE]->(i)");
    st.line("ON CREATE SET hi.createdAt = datetime()");
    st.line("WITH hi");
    st.line("MATCH (m:IssueMention {topic: $topic, city: $city, state: $state})");
    st.line("WITH hi, count(DISTINCT m.articleId) AS mentions, min(m.mentionedAt) AS first, max(m.mentionedAt) AS last");
    st.line("SET hi.mentionCount = mentions, hi.firstMentioned = first, hi.lastMentioned = last, hi.updatedAt = datetime()");
    mention_params(&mut st, m);
    st
}

/// In-place increment. Every application bumps the counter.
fn render_mention_increment(m: &MentionFact) -> Statement {
    let mut st = Statement::new();
    st.line("MERGE (c:City {name: $city, state: $state})");
    st.line("MERGE (i:Issue {name: $topic})");
    st.line("MERGE (c)-[hi:HAS_ISSUE]->(i)");
    st.line("ON CREATE SET hi.firstMentioned = $mentioned_at, hi.mentionCount = 1, hi.createdAt = datetime()");
    st.line("ON MATCH SET hi.lastMentioned = $mentioned_at, hi.mentionCount = coalesce(hi.mentionCount, 0) + 1, hi.updatedAt = datetime()");
    mention_params(&mut st, m);
    st.params.retain(|(name, _)| name != "article_id");
    st
}
