use neo4rs::query;
use tracing::{info, warn};

use crate::GraphClient;

/// Run idempotent schema migrations: one constraint or index per natural key.
///
/// Composite keys get composite indexes rather than node-key constraints, which
/// need an enterprise edition.
pub async fn migrate(client: &GraphClient) -> Result<(), neo4rs::Error> {
    let g = &client.graph;

    info!("Running schema migrations...");

    // --- Single-property natural keys ---
    let constraints = [
        "CREATE CONSTRAINT article_id IF NOT EXISTS FOR (n:Article) REQUIRE n.id IS UNIQUE",
        "CREATE CONSTRAINT meeting_id IF NOT EXISTS FOR (n:Meeting) REQUIRE n.id IS UNIQUE",
        "CREATE CONSTRAINT insight_id IF NOT EXISTS FOR (n:Insight) REQUIRE n.id IS UNIQUE",
        "CREATE CONSTRAINT state_name IF NOT EXISTS FOR (n:State) REQUIRE n.name IS UNIQUE",
        "CREATE CONSTRAINT issue_name IF NOT EXISTS FOR (n:Issue) REQUIRE n.name IS UNIQUE",
        "CREATE CONSTRAINT person_name IF NOT EXISTS FOR (n:Person) REQUIRE n.name IS UNIQUE",
        "CREATE CONSTRAINT organization_name IF NOT EXISTS FOR (n:Organization) REQUIRE n.name IS UNIQUE",
        "CREATE CONSTRAINT location_name IF NOT EXISTS FOR (n:Location) REQUIRE n.name IS UNIQUE",
    ];

    for c in &constraints {
        run_ignoring_exists(g, c).await?;
    }
    info!("Uniqueness constraints created");

    // --- Composite natural keys ---
    let indexes = [
        "CREATE INDEX city_key IF NOT EXISTS FOR (n:City) ON (n.name, n.state)",
        "CREATE INDEX city_name IF NOT EXISTS FOR (n:City) ON (n.name)",
        "CREATE INDEX entity_key IF NOT EXISTS FOR (n:Entity) ON (n.name, n.type)",
        "CREATE INDEX quote_key IF NOT EXISTS FOR (n:Quote) ON (n.insightId, n.index)",
        "CREATE INDEX mention_key IF NOT EXISTS FOR (n:IssueMention) ON (n.topic, n.city, n.state)",
        "CREATE INDEX mention_article IF NOT EXISTS FOR (n:IssueMention) ON (n.articleId)",
    ];

    for idx in &indexes {
        run_ignoring_exists(g, idx).await?;
    }
    info!("Composite key indexes created");

    // --- Trend rollups ---
    let trend_indexes = [
        "CREATE INDEX trend_monthly IF NOT EXISTS FOR (n:TopicTrend) ON (n.topicName, n.cityName, n.yearMonth)",
        "CREATE INDEX trend_weekly IF NOT EXISTS FOR (n:TopicTrendWeekly) ON (n.topicName, n.cityName, n.yearWeek)",
        "CREATE INDEX trend_daily IF NOT EXISTS FOR (n:TopicTrendDaily) ON (n.topicName, n.cityName, n.day)",
    ];

    for idx in &trend_indexes {
        run_ignoring_exists(g, idx).await?;
    }
    info!("Trend indexes created");

    Ok(())
}

/// Run a Cypher statement, ignoring errors that indicate the constraint/index already exists.
async fn run_ignoring_exists(g: &neo4rs::Graph, cypher: &str) -> Result<(), neo4rs::Error> {
    match g.run(query(cypher)).await {
        Ok(_) => Ok(()),
        Err(e) => {
            let msg = e.to_string().to_lowercase();
            if msg.contains("already exists") || msg.contains("equivalent") {
                warn!("Already exists (skipped): {}", cypher.chars().take(80).collect::<String>());
                Ok(())
            } else {
                Err(e)
            }
        }
    }
}
