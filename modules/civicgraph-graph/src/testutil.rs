//! Test utilities for spinning up a real Neo4j instance via testcontainers.

use testcontainers::{
    core::{ContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

use crate::GraphClient;

/// Spin up a Neo4j container and return the container handle + connected GraphClient.
///
/// The container is dropped (and stopped) when `ContainerAsync` goes out of scope,
/// so callers must hold it alive for the duration of the test.
pub async fn neo4j_container() -> (ContainerAsync<GenericImage>, GraphClient) {
    let image = GenericImage::new("neo4j", "5.25.1")
        .with_exposed_port(ContainerPort::Tcp(7687))
        .with_wait_for(WaitFor::message_on_stdout("Started."))
        .with_env_var("NEO4J_AUTH", "neo4j/testpassword");

    let container: ContainerAsync<GenericImage> = image
        .start()
        .await
        .expect("Failed to start Neo4j container");

    let host_port = container
        .get_host_port_ipv4(7687)
        .await
        .expect("Failed to get Neo4j host port");

    let uri = format!("bolt://127.0.0.1:{host_port}");
    let client = GraphClient::connect(&uri, "neo4j", "testpassword")
        .await
        .expect("Failed to connect to Neo4j");

    (container, client)
}

/// Count nodes with `label`.
pub async fn count_nodes(client: &GraphClient, label: &str) -> i64 {
    let cypher = format!("MATCH (n:{label}) RETURN count(n) AS n");
    let mut stream = client
        .inner()
        .execute(neo4rs::query(&cypher))
        .await
        .expect("count query failed");
    let row = stream.next().await.expect("stream failed").expect("no count row");
    row.get::<i64>("n").expect("count column")
}

/// Count relationships of `rel_type`.
pub async fn count_relationships(client: &GraphClient, rel_type: &str) -> i64 {
    let cypher = format!("MATCH ()-[r:{rel_type}]->() RETURN count(r) AS n");
    let mut stream = client
        .inner()
        .execute(neo4rs::query(&cypher))
        .await
        .expect("count query failed");
    let row = stream.next().await.expect("stream failed").expect("no count row");
    row.get::<i64>("n").expect("count column")
}
