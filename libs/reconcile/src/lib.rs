//! Instance reconciliation core.
//!
//! Drives the single workload unit backing a storage instance (an engine
//! or a replica process) toward its desired state. Key concepts:
//!
//! - **Desired state**: `InstanceSpec::desire_state`, the operator's intent.
//! - **Observed state**: `InstanceStatus`, always re-derived from the live
//!   workload; the core never trusts a cached status over the workload.
//! - **Node pinning**: once placed, an instance never silently migrates.
//!
//! # Invariants
//!
//! - The workload is named after the owning object's identity
//! - Re-running a cycle never double-creates or double-deletes
//! - `spec.node_id` is latched once and never reassigned
//! - Diagnostic lookups (boot ID, crash logs) never fail a cycle
//!
//! The core is stateless between cycles. Callers own persistence of the
//! mutated spec and status, and serialize cycles per object.

mod client;
mod diagnostics;
mod error;
mod node_identity;
mod projector;
mod reconciler;
mod types;
mod workload;

pub use client::{InstanceObject, NodeClient, PodSpecBuilder, WorkloadClient};
pub use diagnostics::DiagnosticCapture;
pub use error::{ClientError, ClientResult, ReconcileError, ReconcileResult};
pub use node_identity::NodeIdentityResolver;
pub use projector::StatusProjector;
pub use reconciler::{InstanceReconciler, ReconcilerConfig};
pub use types::{InstanceSpec, InstanceState, InstanceStatus};
pub use workload::{
    ContainerReadiness, ContainerSpec, Node, RestartPolicy, Workload, WorkloadPhase, WorkloadSpec,
};

/// Default number of log lines captured from a crashed workload.
pub const DEFAULT_CRASH_LOG_TAIL_LINES: u32 = 100;
