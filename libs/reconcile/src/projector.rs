//! Derives observed instance status from the live workload.
//!
//! Rules, in priority order:
//!
//! 1. No workload: `error` if an attempt to run is in effect, else `stopped`.
//! 2. Deletion requested: `stopping`.
//! 3. Pending: `starting`.
//! 4. Running: `starting` until every container is ready, then `running`.
//! 5. Anything else: `error`, keeping the node boot ID.

use tracing::{debug, warn};

use crate::{
    InstanceSpec, InstanceState, InstanceStatus, NodeIdentityResolver, Workload, WorkloadPhase,
};

/// Recomputes `InstanceStatus` in place from a workload observation.
#[derive(Clone)]
pub struct StatusProjector {
    node_identity: NodeIdentityResolver,
}

impl StatusProjector {
    pub fn new(node_identity: NodeIdentityResolver) -> Self {
        Self { node_identity }
    }

    pub async fn project(
        &self,
        workload: Option<&Workload>,
        spec: &InstanceSpec,
        status: &mut InstanceStatus,
    ) {
        let Some(workload) = workload else {
            let state = if status.started {
                InstanceState::Error
            } else {
                InstanceState::Stopped
            };
            status.set_unavailable(state);
            return;
        };

        if workload.is_pending_deletion() {
            status.set_unavailable(InstanceState::Stopping);
            return;
        }

        match workload.phase {
            WorkloadPhase::Pending => status.set_unavailable(InstanceState::Starting),
            WorkloadPhase::Running => {
                if !workload.all_containers_ready() {
                    status.set_unavailable(InstanceState::Starting);
                    return;
                }
                status.current_state = InstanceState::Running;
                if status.ip != workload.pod_ip {
                    status.ip = workload.pod_ip.clone();
                    debug!(instance = %workload.name, ip = %status.ip, "Instance starts running");
                }
                // Latched at first start; later image changes are upgrades.
                if status.current_image.is_empty() {
                    status.current_image = spec.engine_image.clone();
                }
                match self.node_identity.boot_id_for(workload).await {
                    Ok(boot_id) => status.node_boot_id = boot_id,
                    Err(e) => warn!(
                        instance = %workload.name,
                        node = %workload.node_name,
                        error = %e,
                        "Cannot get node boot ID for instance"
                    ),
                }
            }
            phase => {
                warn!(
                    instance = %workload.name,
                    phase = %phase,
                    "Instance state is failed/unknown"
                );
                // node_boot_id stays: the next cycle needs it to detect a reboot.
                status.set_unavailable(InstanceState::Error);
            }
        }
    }
}
