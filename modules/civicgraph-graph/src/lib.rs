pub mod client;
pub mod cypher;
pub mod migrate;
pub mod mutation;
pub mod trends;
pub mod writer;

#[cfg(feature = "test-utils")]
pub mod testutil;

pub use client::GraphClient;
pub use mutation::{
    MentionFact, MergeMode, Mutation, NodeLabel, NodeMerge, NodeRef, PropValue, RelMerge, RelType,
};
pub use neo4rs::query;
pub use trends::{Granularity, Period, TrendAggregator, TrendRow};
pub use writer::{GraphSink, GraphWriter};
