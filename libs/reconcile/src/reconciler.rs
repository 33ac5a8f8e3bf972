//! Instance reconciler.
//!
//! One call to [`InstanceReconciler::reconcile`] is one cycle:
//! - Fetch the workload named after the object
//! - Create or delete it according to the desired state
//! - Project the observed status from the resulting workload
//! - Enforce node pinning and capture crash logs
//!
//! Cycles for the same object must not overlap; the caller serializes them
//! and persists the mutated spec and status afterwards.

use std::marker::PhantomData;
use std::sync::Arc;

use bsm_events::{EventReason, EventSink, LifecycleEvent};
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    ClientResult, DiagnosticCapture, InstanceObject, InstanceSpec, InstanceState, InstanceStatus,
    NodeClient, NodeIdentityResolver, PodSpecBuilder, ReconcileError, ReconcileResult,
    StatusProjector, Workload, WorkloadClient, WorkloadSpec, DEFAULT_CRASH_LOG_TAIL_LINES,
};

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Log lines captured from a workload when its instance errors.
    pub crash_log_tail_lines: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            crash_log_tail_lines: DEFAULT_CRASH_LOG_TAIL_LINES,
        }
    }
}

/// Drives the workload of one kind of instance object (`O`).
pub struct InstanceReconciler<O> {
    workloads: Arc<dyn WorkloadClient>,
    events: Arc<dyn EventSink>,
    pod_specs: Arc<dyn PodSpecBuilder<O>>,
    projector: StatusProjector,
    diagnostics: DiagnosticCapture,
    _object: PhantomData<fn(&O)>,
}

impl<O: InstanceObject> InstanceReconciler<O> {
    pub fn new(
        workloads: Arc<dyn WorkloadClient>,
        nodes: Arc<dyn NodeClient>,
        events: Arc<dyn EventSink>,
        pod_specs: Arc<dyn PodSpecBuilder<O>>,
        config: ReconcilerConfig,
    ) -> Self {
        let projector = StatusProjector::new(NodeIdentityResolver::new(nodes));
        let diagnostics = DiagnosticCapture::new(Arc::clone(&workloads), config.crash_log_tail_lines);
        Self {
            workloads,
            events,
            pod_specs,
            projector,
            diagnostics,
            _object: PhantomData,
        }
    }

    /// Run one reconciliation cycle for `obj`.
    ///
    /// `spec.node_id` is latched on first placement; everything else in
    /// `spec` is read-only. `status` is recomputed in place, and is forced
    /// to `error` on a node pin violation or a desire state other than
    /// running or stopped.
    #[instrument(skip_all, fields(instance = %obj.identity()))]
    pub async fn reconcile(
        &self,
        obj: &O,
        spec: &mut InstanceSpec,
        status: &mut InstanceStatus,
    ) -> ReconcileResult<()> {
        let name = obj.identity();
        let mut workload = self.fetch_workload(name).await?;

        match spec.desire_state {
            InstanceState::Running => {
                if workload.as_ref().is_some_and(|w| !w.is_pending_deletion()) {
                    status.started = true;
                } else if status.current_state == InstanceState::Stopped {
                    let workload_spec = self.pod_specs.build_spec(obj)?;
                    workload = Some(self.create_workload(obj, &workload_spec).await?);
                    status.started = true;
                } else {
                    debug!(
                        current_state = %status.current_state,
                        "Previous workload not stopped yet, deferring creation"
                    );
                }
            }
            InstanceState::Stopped => {
                if workload.as_ref().is_some_and(|w| !w.is_pending_deletion()) {
                    match self.delete_workload(obj).await {
                        Ok(()) => {
                            if let Some(w) = workload.as_mut() {
                                w.deletion_timestamp = Some(Utc::now());
                            }
                        }
                        Err(e) if e.is_not_found() => workload = None,
                        // Retried by the next cycle, which still sees the workload.
                        // Until then the projection below reads it as live, so
                        // status stays running with the boot ID refreshed.
                        Err(_) => {}
                    }
                }
                status.started = false;
                status.node_boot_id.clear();
            }
            other => {
                status.set_unavailable(InstanceState::Error);
                return Err(ReconcileError::UnknownDesireState(other));
            }
        }

        self.projector
            .project(workload.as_ref(), spec, status)
            .await;

        match (status.current_state, workload.as_ref()) {
            (InstanceState::Running, Some(w)) => enforce_node_pin(name, w, spec, status)?,
            (InstanceState::Error, Some(w)) => self.diagnostics.report_crash(&w.name).await,
            _ => {}
        }

        Ok(())
    }

    /// Tear down the workload of an object that is being removed.
    ///
    /// No-op when the workload is absent or already terminating.
    #[instrument(skip_all, fields(instance = %obj.identity()))]
    pub async fn delete(&self, obj: &O) -> ReconcileResult<()> {
        match self.fetch_workload(obj.identity()).await? {
            Some(w) if !w.is_pending_deletion() => match self.delete_workload(obj).await {
                Err(e) if !e.is_not_found() => Err(e.into()),
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    async fn fetch_workload(&self, name: &str) -> ReconcileResult<Option<Workload>> {
        match self.workloads.get_workload(name).await {
            Ok(w) => Ok(Some(w)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_workload(&self, obj: &O, spec: &WorkloadSpec) -> ReconcileResult<Workload> {
        match self.workloads.create_workload(spec).await {
            Ok(w) => {
                info!(workload = %spec.name, "Created instance workload");
                self.emit(obj, EventReason::Start, format!("Starts {}", spec.name))
                    .await;
                Ok(w)
            }
            Err(e) => {
                self.emit(
                    obj,
                    EventReason::FailedStarting,
                    format!("Error starting {}: {}", spec.name, e),
                )
                .await;
                Err(e.into())
            }
        }
    }

    async fn delete_workload(&self, obj: &O) -> ClientResult<()> {
        let name = obj.identity();
        match self.workloads.delete_workload(name).await {
            Ok(()) => {
                info!(workload = %name, "Deleted instance workload");
                self.emit(obj, EventReason::Stop, format!("Stops {name}"))
                    .await;
                Ok(())
            }
            Err(e) => {
                warn!(workload = %name, error = %e, "Failed to delete instance workload");
                self.emit(
                    obj,
                    EventReason::FailedStopping,
                    format!("Error stopping {name}: {e}"),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn emit(&self, obj: &O, reason: EventReason, message: String) {
        self.events
            .emit(LifecycleEvent::new(obj.object_ref(), reason, message))
            .await;
    }
}

/// Latch the node on first placement, or fail the cycle on a mismatch.
fn enforce_node_pin(
    name: &str,
    workload: &Workload,
    spec: &mut InstanceSpec,
    status: &mut InstanceStatus,
) -> ReconcileResult<()> {
    if spec.node_id.is_empty() {
        spec.node_id = workload.node_name.clone();
        return Ok(());
    }
    if spec.node_id == workload.node_name {
        return Ok(());
    }

    status.current_state = InstanceState::Error;
    status.ip.clear();
    status.node_boot_id.clear();
    let err = ReconcileError::NodePinViolation {
        instance: name.to_string(),
        expected: spec.node_id.clone(),
        actual: workload.node_name.clone(),
    };
    error!(error = %err, "Instance escaped its pinned node");
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_on(node: &str) -> Workload {
        Workload {
            name: "vol-e".into(),
            node_name: node.into(),
            pod_ip: "10.0.0.5".into(),
            ..Default::default()
        }
    }

    fn running_status() -> InstanceStatus {
        InstanceStatus {
            current_state: InstanceState::Running,
            started: true,
            ip: "10.0.0.5".into(),
            current_image: "engine:v1".into(),
            node_boot_id: "boot-a".into(),
        }
    }

    #[test]
    fn test_node_pin_latches_first_placement() {
        let mut spec = InstanceSpec::default();
        let mut status = running_status();

        enforce_node_pin("vol-e", &running_on("node-a"), &mut spec, &mut status).unwrap();

        assert_eq!(spec.node_id, "node-a");
        assert_eq!(status, running_status());
    }

    #[test]
    fn test_node_pin_mismatch_forces_error() {
        let mut spec = InstanceSpec {
            node_id: "node-a".into(),
            ..Default::default()
        };
        let mut status = running_status();

        let err = enforce_node_pin("vol-e", &running_on("node-b"), &mut spec, &mut status)
            .unwrap_err();

        assert!(matches!(err, ReconcileError::NodePinViolation { .. }));
        assert_eq!(spec.node_id, "node-a");
        assert_eq!(status.current_state, InstanceState::Error);
        assert!(status.ip.is_empty());
        assert!(status.node_boot_id.is_empty());
        // The recorded image is not part of the violation cleanup.
        assert_eq!(status.current_image, "engine:v1");
    }

    #[test]
    fn test_config_default_tail_lines() {
        assert_eq!(ReconcilerConfig::default().crash_log_tail_lines, 100);
    }
}
