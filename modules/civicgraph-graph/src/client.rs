use neo4rs::{query, ConfigBuilder, Graph};

/// Thin wrapper around neo4rs::Graph providing connection setup.
#[derive(Clone)]
pub struct GraphClient {
    pub(crate) graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given credentials.
    ///
    /// neo4rs opens its pool lazily, so a `RETURN 1` ping forces the bolt handshake
    /// and surfaces bad credentials or an unreachable host here instead of mid-sync.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, neo4rs::Error> {
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .fetch_size(500)
            .max_connections(4)
            .build()?;
        let graph = Graph::connect(config).await?;
        graph.run(query("RETURN 1")).await?;
        Ok(Self { graph })
    }

    /// Get a reference to the underlying neo4rs Graph.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }
}
