//! Engine and replica objects.
//!
//! Each object owns one instance workload of the same name. The embedded
//! `InstanceSpec`/`InstanceStatus` are flattened into the object's own
//! spec and status so stored documents read like the cluster resources.

use std::collections::BTreeMap;

use bsm_events::{ObjectKind, ObjectRef};
use bsm_reconcile::{InstanceObject, InstanceSpec, InstanceStatus};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Object metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,

    /// Incremented on every successful save.
    #[serde(default)]
    pub resource_version: u64,

    /// Set when the object has been asked to go away.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            resource_version: 0,
            deletion_timestamp: None,
        }
    }
}

/// An instance-owning object that can be stored and reconciled.
pub trait StoredInstance: InstanceObject + Clone + Serialize + DeserializeOwned + 'static {
    const KIND: ObjectKind;

    fn metadata(&self) -> &ObjectMeta;
    fn metadata_mut(&mut self) -> &mut ObjectMeta;
    fn instance_spec(&self) -> &InstanceSpec;
    fn instance_status(&self) -> &InstanceStatus;

    /// Write back spec and status after a reconciliation cycle.
    fn set_instance(&mut self, spec: InstanceSpec, status: InstanceStatus);
}

fn object_ref(kind: ObjectKind, meta: &ObjectMeta) -> ObjectRef {
    ObjectRef {
        kind,
        namespace: meta.namespace.clone(),
        name: meta.name.clone(),
        resource_version: Some(meta.resource_version.to_string()),
    }
}

fn default_frontend() -> String {
    "tgt-blockdev".to_string()
}

/// Engine spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSpec {
    #[serde(flatten)]
    pub instance: InstanceSpec,

    pub volume_name: String,

    /// Volume size in bytes.
    pub volume_size: u64,

    #[serde(default = "default_frontend")]
    pub frontend: String,

    /// Replica name to replica address.
    #[serde(default)]
    pub replica_address_map: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    #[serde(flatten)]
    pub instance: InstanceStatus,
}

/// The controller process of a volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engine {
    pub metadata: ObjectMeta,
    pub spec: EngineSpec,
    #[serde(default)]
    pub status: EngineStatus,
}

impl InstanceObject for Engine {
    fn identity(&self) -> &str {
        &self.metadata.name
    }

    fn object_ref(&self) -> ObjectRef {
        object_ref(Self::KIND, &self.metadata)
    }
}

impl StoredInstance for Engine {
    const KIND: ObjectKind = ObjectKind::Engine;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn instance_spec(&self) -> &InstanceSpec {
        &self.spec.instance
    }

    fn instance_status(&self) -> &InstanceStatus {
        &self.status.instance
    }

    fn set_instance(&mut self, spec: InstanceSpec, status: InstanceStatus) {
        self.spec.instance = spec;
        self.status.instance = status;
    }
}

/// Replica spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaSpec {
    #[serde(flatten)]
    pub instance: InstanceSpec,

    pub volume_name: String,

    /// Volume size in bytes.
    pub volume_size: u64,

    /// Host directory holding the replica's data files.
    pub data_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaStatus {
    #[serde(flatten)]
    pub instance: InstanceStatus,
}

/// One copy of a volume's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    pub metadata: ObjectMeta,
    pub spec: ReplicaSpec,
    #[serde(default)]
    pub status: ReplicaStatus,
}

impl InstanceObject for Replica {
    fn identity(&self) -> &str {
        &self.metadata.name
    }

    fn object_ref(&self) -> ObjectRef {
        object_ref(Self::KIND, &self.metadata)
    }
}

impl StoredInstance for Replica {
    const KIND: ObjectKind = ObjectKind::Replica;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn instance_spec(&self) -> &InstanceSpec {
        &self.spec.instance
    }

    fn instance_status(&self) -> &InstanceStatus {
        &self.status.instance
    }

    fn set_instance(&mut self, spec: InstanceSpec, status: InstanceStatus) {
        self.spec.instance = spec;
        self.status.instance = status;
    }
}
