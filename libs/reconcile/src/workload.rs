//! Workload units and nodes as seen by the reconciler.
//!
//! These are narrow views of the cluster objects: only the fields the
//! state machine reads are carried.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle phase reported by the cluster for a workload unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WorkloadPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl WorkloadPhase {
    /// Parse a cluster phase string. Unrecognized values map to `Unknown`.
    pub fn from_phase(s: &str) -> Self {
        match s {
            "Pending" => WorkloadPhase::Pending,
            "Running" => WorkloadPhase::Running,
            "Succeeded" => WorkloadPhase::Succeeded,
            "Failed" => WorkloadPhase::Failed,
            _ => WorkloadPhase::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadPhase::Pending => "Pending",
            WorkloadPhase::Running => "Running",
            WorkloadPhase::Succeeded => "Succeeded",
            WorkloadPhase::Failed => "Failed",
            WorkloadPhase::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for WorkloadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Readiness of one container in a workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerReadiness {
    pub name: String,
    pub ready: bool,
}

/// Live view of a workload unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub name: String,

    /// Node the workload was scheduled to. Empty while unscheduled.
    pub node_name: String,

    pub phase: WorkloadPhase,

    /// Set once the cluster has accepted a delete for this workload.
    pub deletion_timestamp: Option<DateTime<Utc>>,

    pub container_statuses: Vec<ContainerReadiness>,

    pub pod_ip: String,
}

impl Workload {
    pub fn is_pending_deletion(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// True when every container has passed its readiness check.
    pub fn all_containers_ready(&self) -> bool {
        self.container_statuses.iter().all(|c| c.ready)
    }
}

/// Restart policy for a workload unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RestartPolicy {
    Always,
    OnFailure,
    #[default]
    Never,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::Always => "Always",
            RestartPolicy::OnFailure => "OnFailure",
            RestartPolicy::Never => "Never",
        }
    }
}

/// Container in a workload creation spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub privileged: bool,
}

/// Everything needed to create a workload unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Node to place the workload on, when already known.
    #[serde(default)]
    pub node_name: Option<String>,

    #[serde(default)]
    pub restart_policy: RestartPolicy,

    pub containers: Vec<ContainerSpec>,
}

/// A cluster node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,

    /// Changes on every host reboot.
    pub boot_id: String,
}
