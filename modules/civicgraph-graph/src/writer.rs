use async_trait::async_trait;
use tracing::{debug, warn};

use civicgraph_common::{CounterMode, SyncError};

use crate::cypher::render;
use crate::mutation::Mutation;
use crate::GraphClient;

/// Applies mutation intents to a graph store.
#[async_trait]
pub trait GraphSink: Send + Sync {
    /// Apply `mutations` in order as one unit of work.
    async fn apply(&self, mutations: &[Mutation]) -> Result<(), SyncError>;
}

/// Write-side wrapper for the graph. Used by the sync orchestrator only.
pub struct GraphWriter {
    client: GraphClient,
    counters: CounterMode,
}

impl GraphWriter {
    pub fn new(client: GraphClient) -> Self {
        Self {
            client,
            counters: CounterMode::default(),
        }
    }

    pub fn with_counter_mode(mut self, counters: CounterMode) -> Self {
        self.counters = counters;
        self
    }

    pub fn counter_mode(&self) -> CounterMode {
        self.counters
    }
}

#[async_trait]
impl GraphSink for GraphWriter {
    async fn apply(&self, mutations: &[Mutation]) -> Result<(), SyncError> {
        if mutations.is_empty() {
            return Ok(());
        }

        let mut txn = self.client.graph.start_txn().await?;
        for mutation in mutations {
            let statement = render(mutation, self.counters);
            if let Err(e) = txn.run(statement.to_query()).await {
                warn!(error = %e, statement = %first_line(&statement.text), "Graph write failed, rolling back");
                if let Err(rollback) = txn.rollback().await {
                    warn!(error = %rollback, "Rollback failed");
                }
                return Err(e.into());
            }
        }
        txn.commit().await?;

        debug!(mutations = mutations.len(), "Committed graph writes");
        Ok(())
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
