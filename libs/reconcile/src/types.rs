//! Instance spec and status.

use serde::{Deserialize, Serialize};

/// Lifecycle state of an instance.
///
/// Used both as the observed `current_state` and as the desired state,
/// where only `Running` and `Stopped` are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Stopped => "stopped",
            InstanceState::Starting => "starting",
            InstanceState::Running => "running",
            InstanceState::Stopping => "stopping",
            InstanceState::Error => "error",
        }
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired configuration of an instance. Owned by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceSpec {
    pub desire_state: InstanceState,

    /// Node the instance is pinned to. Empty until first placement.
    #[serde(rename = "nodeID")]
    pub node_id: String,

    pub engine_image: String,
}

/// Observed state of an instance. Mutated only by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceStatus {
    pub current_state: InstanceState,

    /// An attempt to run the instance is in effect. Survives error and
    /// restart cycles; only desired-state transitions clear it.
    pub started: bool,

    /// Valid only while `current_state` is running.
    pub ip: String,

    /// Image recorded at first successful start.
    pub current_image: String,

    /// Boot ID of the hosting node. Kept through errors so a later cycle
    /// can tell a node reboot from a plain crash.
    #[serde(rename = "nodeBootID")]
    pub node_boot_id: String,
}

impl InstanceStatus {
    /// Set the state and drop the runtime endpoint fields.
    pub(crate) fn set_unavailable(&mut self, state: InstanceState) {
        self.current_state = state;
        self.ip.clear();
        self.current_image.clear();
    }
}
