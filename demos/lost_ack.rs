//! Walk-through of a create whose acknowledgement is lost.
//!
//! The first attempt lands on the cluster but the caller sees a disconnect.
//! The retry collides with the stored document, which is read back and
//! recognized as this write's own effect.
//!
//! Run with `RUST_LOG=searchcore=debug cargo run --example lost_ack` to see
//! every decision the engine makes.

use searchcore::{
    ClusterError, DocumentId, DocumentOperations, IndexName, MappingSchema, Operation,
    RetrySettings, UpdateTimestamp, WriteIntent,
};
use searchcore_memory::InMemoryCluster;
use searchcore_testing::ScriptedCluster;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let index = IndexName::try_new("cells")?;
    let memory = InMemoryCluster::new();
    memory.create_index(&index, MappingSchema::new())?;

    let cluster = ScriptedCluster::new(memory)
        .lose_ack(Operation::Index, ClusterError::node_disconnected("node-2"));
    let settings = RetrySettings::from_env()?;
    let operations = DocumentOperations::new(&cluster, index).with_settings(settings);

    let id = DocumentId::try_new("cell-1")?;
    let body = json!({"kind": "box", "size": 3});
    let intent = WriteIntent::new(
        body.as_object().cloned().unwrap_or_default(),
        UpdateTimestamp::now(),
    );

    info!(id = %id, "creating document");
    let ack = operations.create(&id, &intent).await?;

    info!(
        version = %ack.version(),
        reconciled = ack.is_reconciled(),
        calls = cluster.calls(Operation::Index),
        "create confirmed"
    );

    let stored = operations.get(&id).await?;
    info!(found = stored.is_some(), "read back");

    Ok(())
}
