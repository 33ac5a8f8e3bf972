//! Collaborator interfaces consumed by the reconciler.

use async_trait::async_trait;
use bsm_events::ObjectRef;

use crate::{ClientResult, Node, ReconcileResult, Workload, WorkloadSpec};

/// Access to workload units in the instance namespace.
#[async_trait]
pub trait WorkloadClient: Send + Sync {
    /// Fetch a workload by name. Absence is `ClientError::NotFound`.
    async fn get_workload(&self, name: &str) -> ClientResult<Workload>;

    /// Create a workload and return the cluster's view of it.
    async fn create_workload(&self, spec: &WorkloadSpec) -> ClientResult<Workload>;

    /// Request deletion. The workload may linger while it terminates.
    async fn delete_workload(&self, name: &str) -> ClientResult<()>;

    /// Fetch the last `tail_lines` lines of combined output, timestamped.
    async fn workload_logs(&self, name: &str, tail_lines: u32) -> ClientResult<String>;
}

/// Read access to cluster nodes.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn get_node(&self, name: &str) -> ClientResult<Node>;
}

/// An object that owns exactly one instance workload.
pub trait InstanceObject: Send + Sync {
    /// Stable identity; the workload carries the same name.
    fn identity(&self) -> &str;

    /// Reference used to attach lifecycle events.
    fn object_ref(&self) -> ObjectRef;
}

/// Builds the workload creation spec for an instance object.
pub trait PodSpecBuilder<O>: Send + Sync {
    fn build_spec(&self, obj: &O) -> ReconcileResult<WorkloadSpec>;
}
