//! Workload specs for engine and replica instances.

use std::collections::BTreeMap;

use bsm_reconcile::{
    ContainerSpec, InstanceSpec, PodSpecBuilder, ReconcileError, ReconcileResult, RestartPolicy,
    WorkloadSpec,
};

use crate::objects::{Engine, Replica};

pub const LABEL_KIND: &str = "bsm.io/kind";
pub const LABEL_VOLUME: &str = "bsm.io/volume";

/// Port the replica data server listens on.
pub const REPLICA_PORT: u16 = 9502;

fn require(instance: &str, field: &str, value: &str) -> ReconcileResult<()> {
    if value.trim().is_empty() {
        return Err(ReconcileError::PodSpec {
            instance: instance.to_string(),
            reason: format!("{field} is empty"),
        });
    }
    Ok(())
}

fn workload_spec(
    name: &str,
    kind: &str,
    volume: &str,
    instance: &InstanceSpec,
    command: Vec<String>,
) -> WorkloadSpec {
    let labels = BTreeMap::from([
        (LABEL_KIND.to_string(), kind.to_string()),
        (LABEL_VOLUME.to_string(), volume.to_string()),
    ]);
    WorkloadSpec {
        name: name.to_string(),
        labels,
        // Pinned instances must come back on the same node.
        node_name: (!instance.node_id.is_empty()).then(|| instance.node_id.clone()),
        restart_policy: RestartPolicy::Never,
        containers: vec![ContainerSpec {
            name: name.to_string(),
            image: instance.engine_image.clone(),
            command,
            args: Vec::new(),
            privileged: true,
        }],
    }
}

/// Builds engine controller workloads.
#[derive(Debug, Clone)]
pub struct EnginePodSpecBuilder {
    binary: String,
}

impl EnginePodSpecBuilder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl PodSpecBuilder<Engine> for EnginePodSpecBuilder {
    fn build_spec(&self, engine: &Engine) -> ReconcileResult<WorkloadSpec> {
        let name = &engine.metadata.name;
        require(name, "engine image", &engine.spec.instance.engine_image)?;
        require(name, "volume name", &engine.spec.volume_name)?;

        let mut command = vec![
            self.binary.clone(),
            "controller".to_string(),
            engine.spec.volume_name.clone(),
            "--frontend".to_string(),
            engine.spec.frontend.clone(),
        ];
        for address in engine.spec.replica_address_map.values() {
            command.push("--replica".to_string());
            command.push(format!("tcp://{address}"));
        }

        Ok(workload_spec(
            name,
            "engine",
            &engine.spec.volume_name,
            &engine.spec.instance,
            command,
        ))
    }
}

/// Builds replica data server workloads.
#[derive(Debug, Clone)]
pub struct ReplicaPodSpecBuilder {
    binary: String,
}

impl ReplicaPodSpecBuilder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl PodSpecBuilder<Replica> for ReplicaPodSpecBuilder {
    fn build_spec(&self, replica: &Replica) -> ReconcileResult<WorkloadSpec> {
        let name = &replica.metadata.name;
        require(name, "engine image", &replica.spec.instance.engine_image)?;
        require(name, "volume name", &replica.spec.volume_name)?;
        require(name, "data path", &replica.spec.data_path)?;

        let command = vec![
            self.binary.clone(),
            "replica".to_string(),
            replica.spec.data_path.clone(),
            "--size".to_string(),
            replica.spec.volume_size.to_string(),
            "--listen".to_string(),
            format!("0.0.0.0:{REPLICA_PORT}"),
        ];

        Ok(workload_spec(
            name,
            "replica",
            &replica.spec.volume_name,
            &replica.spec.instance,
            command,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{EngineSpec, ObjectMeta, ReplicaSpec};
    use bsm_reconcile::InstanceState;
    use rstest::rstest;

    const IMAGE: &str = "longhornio/longhorn-engine:v1.0";

    fn instance(node_id: &str) -> InstanceSpec {
        InstanceSpec {
            desire_state: InstanceState::Running,
            node_id: node_id.to_string(),
            engine_image: IMAGE.to_string(),
        }
    }

    fn engine() -> Engine {
        Engine {
            metadata: ObjectMeta::new("vol-e", "longhorn-system"),
            spec: EngineSpec {
                instance: instance(""),
                volume_name: "vol".into(),
                volume_size: 1 << 30,
                frontend: "tgt-blockdev".into(),
                replica_address_map: BTreeMap::from([
                    ("vol-r-2".to_string(), "10.0.0.8:9502".to_string()),
                    ("vol-r-1".to_string(), "10.0.0.7:9502".to_string()),
                ]),
            },
            status: Default::default(),
        }
    }

    fn replica(node_id: &str) -> Replica {
        Replica {
            metadata: ObjectMeta::new("vol-r-1", "longhorn-system"),
            spec: ReplicaSpec {
                instance: instance(node_id),
                volume_name: "vol".into(),
                volume_size: 1 << 30,
                data_path: "/var/lib/longhorn/replicas/vol-r-1".into(),
            },
            status: Default::default(),
        }
    }

    #[test]
    fn test_engine_command_lists_replicas_in_order() {
        let spec = EnginePodSpecBuilder::new("longhorn")
            .build_spec(&engine())
            .unwrap();

        assert_eq!(spec.name, "vol-e");
        assert_eq!(spec.node_name, None);
        assert_eq!(spec.restart_policy, RestartPolicy::Never);
        assert_eq!(spec.labels[LABEL_KIND], "engine");
        assert_eq!(
            spec.containers[0].command,
            vec![
                "longhorn",
                "controller",
                "vol",
                "--frontend",
                "tgt-blockdev",
                "--replica",
                "tcp://10.0.0.7:9502",
                "--replica",
                "tcp://10.0.0.8:9502",
            ]
        );
        assert_eq!(spec.containers[0].image, IMAGE);
    }

    #[test]
    fn test_pinned_replica_targets_its_node() {
        let spec = ReplicaPodSpecBuilder::new("longhorn")
            .build_spec(&replica("node-a"))
            .unwrap();

        assert_eq!(spec.node_name.as_deref(), Some("node-a"));
        assert_eq!(spec.labels[LABEL_VOLUME], "vol");
        assert_eq!(spec.containers[0].command[1], "replica");
        assert!(spec.containers[0].privileged);
    }

    fn clear_image(r: &mut Replica) {
        r.spec.instance.engine_image.clear();
    }

    fn clear_volume(r: &mut Replica) {
        r.spec.volume_name.clear();
    }

    fn blank_data_path(r: &mut Replica) {
        r.spec.data_path = " ".into();
    }

    #[rstest]
    #[case::image(clear_image, "engine image is empty")]
    #[case::volume(clear_volume, "volume name is empty")]
    #[case::data_path(blank_data_path, "data path is empty")]
    fn test_incomplete_replica_is_rejected(
        #[case] mutate: fn(&mut Replica),
        #[case] reason: &str,
    ) {
        let mut replica = replica("");
        mutate(&mut replica);

        let err = ReplicaPodSpecBuilder::new("longhorn")
            .build_spec(&replica)
            .unwrap_err();

        assert!(matches!(err, ReconcileError::PodSpec { .. }));
        assert!(err.to_string().contains(reason));
    }

    #[test]
    fn test_engine_without_volume_is_rejected() {
        let mut engine = engine();
        engine.spec.volume_name.clear();

        let err = EnginePodSpecBuilder::new("longhorn")
            .build_spec(&engine)
            .unwrap_err();

        assert!(err.to_string().contains("volume name is empty"));
    }
}
