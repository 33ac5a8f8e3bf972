//! In-memory cluster fakes for tests.
//!
//! [`FakeCluster`] implements the workload client, node client and event
//! sink at once. It models the parts of cluster behavior the reconciler
//! depends on:
//!
//! - Created workloads start `Pending`, with no node and no ready containers
//! - Deletes are graceful: the workload stays, marked for deletion, until
//!   [`FakeCluster::finish_termination`] is called
//! - Every call is counted so tests can assert exact create/delete counts

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bsm_events::{EventReason, EventSink, LifecycleEvent, ObjectKind, ObjectRef};
use bsm_reconcile::{
    ClientError, ClientResult, ContainerReadiness, ContainerSpec, InstanceObject, Node, NodeClient,
    PodSpecBuilder, ReconcileError, ReconcileResult, Workload, WorkloadClient, WorkloadPhase,
    WorkloadSpec,
};
use chrono::Utc;

/// Namespace used by test objects.
pub const TEST_NAMESPACE: &str = "bsm-test";

/// Cluster operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Op {
    Get,
    Create,
    Delete,
    Logs,
    GetNode,
}

/// Number of calls made per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get: usize,
    pub create: usize,
    pub delete: usize,
    pub logs: usize,
    pub get_node: usize,
}

#[derive(Default)]
struct ClusterState {
    workloads: BTreeMap<String, Workload>,
    nodes: BTreeMap<String, Node>,
    logs: BTreeMap<String, String>,
    events: Vec<LifecycleEvent>,
    failures: BTreeMap<Op, ClientError>,
    calls: CallCounts,
    logs_detached: bool,
}

/// In-memory stand-in for the cluster API.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a node with the given boot ID, replacing any previous one.
    pub fn add_node(&self, name: &str, boot_id: &str) {
        self.state().nodes.insert(
            name.to_string(),
            Node {
                name: name.to_string(),
                boot_id: boot_id.to_string(),
            },
        );
    }

    /// Simulate a host reboot.
    pub fn reboot_node(&self, name: &str, new_boot_id: &str) {
        self.add_node(name, new_boot_id);
    }

    pub fn insert_workload(&self, workload: Workload) {
        self.state()
            .workloads
            .insert(workload.name.clone(), workload);
    }

    pub fn workload(&self, name: &str) -> Option<Workload> {
        self.state().workloads.get(name).cloned()
    }

    /// Apply `f` to a stored workload. Returns false if it does not exist.
    pub fn update_workload(&self, name: &str, f: impl FnOnce(&mut Workload)) -> bool {
        match self.state().workloads.get_mut(name) {
            Some(w) => {
                f(w);
                true
            }
            None => false,
        }
    }

    /// Schedule a workload and mark it running with every container ready.
    pub fn mark_running(&self, name: &str, node: &str, ip: &str) -> bool {
        self.update_workload(name, |w| {
            w.phase = WorkloadPhase::Running;
            w.node_name = node.to_string();
            w.pod_ip = ip.to_string();
            for c in &mut w.container_statuses {
                c.ready = true;
            }
        })
    }

    pub fn set_phase(&self, name: &str, phase: WorkloadPhase) -> bool {
        self.update_workload(name, |w| w.phase = phase)
    }

    /// Remove a workload that was marked for deletion.
    pub fn finish_termination(&self, name: &str) -> bool {
        let mut state = self.state();
        let terminating = state
            .workloads
            .get(name)
            .is_some_and(|w| w.is_pending_deletion());
        if terminating {
            state.workloads.remove(name);
        }
        terminating
    }

    /// Remove a workload without going through deletion.
    pub fn vanish(&self, name: &str) -> bool {
        self.state().workloads.remove(name).is_some()
    }

    pub fn set_logs(&self, name: &str, logs: &str) {
        self.state()
            .logs
            .insert(name.to_string(), logs.to_string());
    }

    /// Make log requests resolve to no endpoint, as in a disconnected harness.
    pub fn detach_logs(&self) {
        self.state().logs_detached = true;
    }

    /// Fail every call of `op` with `err` until cleared.
    pub fn fail(&self, op: Op, err: ClientError) {
        self.state().failures.insert(op, err);
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.state().events.clone()
    }

    pub fn event_reasons(&self) -> Vec<EventReason> {
        self.state().events.iter().map(|e| e.reason).collect()
    }
}

fn injected(state: &ClusterState, op: Op) -> ClientResult<()> {
    match state.failures.get(&op) {
        Some(err) => Err(err.clone()),
        None => Ok(()),
    }
}

#[async_trait]
impl WorkloadClient for FakeCluster {
    async fn get_workload(&self, name: &str) -> ClientResult<Workload> {
        let mut state = self.state();
        state.calls.get += 1;
        injected(&state, Op::Get)?;
        state
            .workloads
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("workload {name}")))
    }

    async fn create_workload(&self, spec: &WorkloadSpec) -> ClientResult<Workload> {
        let mut state = self.state();
        state.calls.create += 1;
        injected(&state, Op::Create)?;
        if state.workloads.contains_key(&spec.name) {
            return Err(ClientError::AlreadyExists(format!("workload {}", spec.name)));
        }
        let workload = Workload {
            name: spec.name.clone(),
            node_name: spec.node_name.clone().unwrap_or_default(),
            phase: WorkloadPhase::Pending,
            deletion_timestamp: None,
            container_statuses: spec
                .containers
                .iter()
                .map(|c| ContainerReadiness {
                    name: c.name.clone(),
                    ready: false,
                })
                .collect(),
            pod_ip: String::new(),
        };
        state
            .workloads
            .insert(workload.name.clone(), workload.clone());
        Ok(workload)
    }

    async fn delete_workload(&self, name: &str) -> ClientResult<()> {
        let mut state = self.state();
        state.calls.delete += 1;
        injected(&state, Op::Delete)?;
        match state.workloads.get_mut(name) {
            Some(w) => {
                w.deletion_timestamp.get_or_insert_with(Utc::now);
                Ok(())
            }
            None => Err(ClientError::NotFound(format!("workload {name}"))),
        }
    }

    async fn workload_logs(&self, name: &str, tail_lines: u32) -> ClientResult<String> {
        let mut state = self.state();
        state.calls.logs += 1;
        injected(&state, Op::Logs)?;
        if state.logs_detached {
            return Err(ClientError::EmptyRequestPath(format!("logs of {name}")));
        }
        if !state.workloads.contains_key(name) {
            return Err(ClientError::NotFound(format!("workload {name}")));
        }
        let logs = state.logs.get(name).cloned().unwrap_or_default();
        let lines: Vec<&str> = logs.lines().collect();
        let start = lines.len().saturating_sub(tail_lines as usize);
        Ok(lines[start..].join("\n"))
    }
}

#[async_trait]
impl NodeClient for FakeCluster {
    async fn get_node(&self, name: &str) -> ClientResult<Node> {
        let mut state = self.state();
        state.calls.get_node += 1;
        injected(&state, Op::GetNode)?;
        state
            .nodes
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("node {name}")))
    }
}

#[async_trait]
impl EventSink for FakeCluster {
    async fn emit(&self, event: LifecycleEvent) {
        self.state().events.push(event);
    }
}

/// Minimal instance object.
#[derive(Debug, Clone)]
pub struct TestInstance {
    pub name: String,
    pub kind: ObjectKind,
}

impl TestInstance {
    pub fn engine(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ObjectKind::Engine,
        }
    }

    pub fn replica(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ObjectKind::Replica,
        }
    }
}

impl InstanceObject for TestInstance {
    fn identity(&self) -> &str {
        &self.name
    }

    fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(self.kind, TEST_NAMESPACE, self.name.clone())
    }
}

/// Builds a single-container spec, or fails when `fail_with` is set.
#[derive(Debug, Clone, Default)]
pub struct TestPodSpecBuilder {
    pub image: String,
    pub fail_with: Option<String>,
}

impl TestPodSpecBuilder {
    pub fn new(image: &str) -> Self {
        Self {
            image: image.to_string(),
            fail_with: None,
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            image: String::new(),
            fail_with: Some(reason.to_string()),
        }
    }
}

impl PodSpecBuilder<TestInstance> for TestPodSpecBuilder {
    fn build_spec(&self, obj: &TestInstance) -> ReconcileResult<WorkloadSpec> {
        if let Some(reason) = &self.fail_with {
            return Err(ReconcileError::PodSpec {
                instance: obj.name.clone(),
                reason: reason.clone(),
            });
        }
        Ok(WorkloadSpec {
            name: obj.name.clone(),
            containers: vec![ContainerSpec {
                name: obj.name.clone(),
                image: self.image.clone(),
                command: vec!["longhorn".to_string()],
                ..Default::default()
            }],
            ..Default::default()
        })
    }
}
