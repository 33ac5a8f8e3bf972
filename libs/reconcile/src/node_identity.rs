//! Node boot identity lookup.

use std::sync::Arc;

use crate::{ClientError, ClientResult, NodeClient, Workload};

/// Resolves the boot ID of the node hosting a workload.
///
/// Failures are returned to the caller, which must treat a stale boot ID
/// as a degraded but acceptable condition.
#[derive(Clone)]
pub struct NodeIdentityResolver {
    nodes: Arc<dyn NodeClient>,
}

impl NodeIdentityResolver {
    pub fn new(nodes: Arc<dyn NodeClient>) -> Self {
        Self { nodes }
    }

    /// Current boot ID of the workload's node.
    pub async fn boot_id_for(&self, workload: &Workload) -> ClientResult<String> {
        if workload.node_name.is_empty() {
            return Err(ClientError::NotFound(format!(
                "node for unscheduled workload {}",
                workload.name
            )));
        }
        let node = self.nodes.get_node(&workload.node_name).await?;
        Ok(node.boot_id)
    }
}
