//! Controller passes over a SQLite store and an in-memory cluster.

use std::sync::Arc;
use std::time::Duration;

use bsm_instance_manager::objects::{EngineSpec, ReplicaSpec};
use bsm_instance_manager::{
    Engine, EnginePodSpecBuilder, InstanceController, InstanceStore, ObjectMeta, PassStats,
    Replica, ReplicaPodSpecBuilder,
};
use bsm_reconcile::{
    ClientError, InstanceReconciler, InstanceSpec, InstanceState, ReconcilerConfig, Workload,
    WorkloadPhase,
};
use bsm_testing::{FakeCluster, Op};
use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::watch;

const NS: &str = "longhorn-system";
const IMAGE: &str = "longhornio/longhorn-engine:v1.0";

struct Harness {
    _dir: TempDir,
    cluster: Arc<FakeCluster>,
    store: InstanceStore,
    controller: InstanceController,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let cluster = Arc::new(FakeCluster::new());
    let store = InstanceStore::open(dir.path().join("instances.db")).unwrap();

    let engines = InstanceReconciler::<Engine>::new(
        cluster.clone(),
        cluster.clone(),
        cluster.clone(),
        Arc::new(EnginePodSpecBuilder::new("longhorn")),
        ReconcilerConfig::default(),
    );
    let replicas = InstanceReconciler::<Replica>::new(
        cluster.clone(),
        cluster.clone(),
        cluster.clone(),
        Arc::new(ReplicaPodSpecBuilder::new("longhorn")),
        ReconcilerConfig::default(),
    );
    let controller =
        InstanceController::new(store.clone(), engines, replicas, Duration::from_millis(10));

    Harness {
        _dir: dir,
        cluster,
        store,
        controller,
    }
}

fn instance(desire_state: InstanceState, node_id: &str) -> InstanceSpec {
    InstanceSpec {
        desire_state,
        node_id: node_id.to_string(),
        engine_image: IMAGE.to_string(),
    }
}

fn engine(name: &str, desire_state: InstanceState) -> Engine {
    Engine {
        metadata: ObjectMeta::new(name, NS),
        spec: EngineSpec {
            instance: instance(desire_state, ""),
            volume_name: "vol".into(),
            volume_size: 1 << 30,
            frontend: "tgt-blockdev".into(),
            ..Default::default()
        },
        status: Default::default(),
    }
}

fn replica(name: &str, node_id: &str) -> Replica {
    Replica {
        metadata: ObjectMeta::new(name, NS),
        spec: ReplicaSpec {
            instance: instance(InstanceState::Running, node_id),
            volume_name: "vol".into(),
            volume_size: 1 << 30,
            data_path: format!("/var/lib/longhorn/replicas/{name}"),
        },
        status: Default::default(),
    }
}

fn stored_engine(h: &Harness, name: &str) -> Engine {
    h.store.get(name).unwrap().unwrap()
}

#[tokio::test]
async fn test_engine_is_started_and_pinned() {
    let h = harness();
    h.store
        .save(&mut engine("vol-e", InstanceState::Running))
        .unwrap();
    h.cluster.add_node("node-a", "boot-1");

    let stats = h.controller.reconcile_pass().await.unwrap();
    assert_eq!(
        stats,
        PassStats {
            reconciled: 1,
            ..Default::default()
        }
    );
    assert_eq!(h.cluster.calls().create, 1);

    let started = stored_engine(&h, "vol-e");
    assert_eq!(started.status.instance.current_state, InstanceState::Starting);
    assert!(started.status.instance.started);
    assert_eq!(started.metadata.resource_version, 2);

    h.cluster.mark_running("vol-e", "node-a", "10.0.0.5");
    h.controller.reconcile_pass().await.unwrap();

    let running = stored_engine(&h, "vol-e");
    assert_eq!(running.status.instance.current_state, InstanceState::Running);
    assert_eq!(running.status.instance.ip, "10.0.0.5");
    assert_eq!(running.status.instance.current_image, IMAGE);
    assert_eq!(running.status.instance.node_boot_id, "boot-1");
    assert_eq!(running.spec.instance.node_id, "node-a");
    assert_eq!(h.cluster.calls().create, 1);
}

#[tokio::test]
async fn test_unchanged_object_is_not_saved() {
    let h = harness();
    h.store
        .save(&mut engine("vol-e", InstanceState::Stopped))
        .unwrap();

    h.controller.reconcile_pass().await.unwrap();
    h.controller.reconcile_pass().await.unwrap();

    assert_eq!(stored_engine(&h, "vol-e").metadata.resource_version, 1);
    assert_eq!(h.cluster.calls().delete, 0);
}

#[tokio::test]
async fn test_deleted_object_tears_down_and_is_removed() {
    let h = harness();
    let mut obj = engine("vol-e", InstanceState::Running);
    h.store.save(&mut obj).unwrap();
    h.controller.reconcile_pass().await.unwrap();

    let mut obj = stored_engine(&h, "vol-e");
    obj.metadata.deletion_timestamp = Some(Utc::now());
    h.store.save(&mut obj).unwrap();

    let stats = h.controller.reconcile_pass().await.unwrap();

    assert_eq!(stats.removed, 1);
    assert_eq!(h.cluster.calls().delete, 1);
    assert!(h.cluster.workload("vol-e").unwrap().is_pending_deletion());
    assert!(h.store.get::<Engine>("vol-e").unwrap().is_none());
}

#[tokio::test]
async fn test_failed_teardown_keeps_object() {
    let h = harness();
    let mut obj = engine("vol-e", InstanceState::Running);
    h.store.save(&mut obj).unwrap();
    h.controller.reconcile_pass().await.unwrap();

    let mut obj = stored_engine(&h, "vol-e");
    obj.metadata.deletion_timestamp = Some(Utc::now());
    h.store.save(&mut obj).unwrap();
    h.cluster.fail(
        Op::Delete,
        ClientError::Transport("connection reset".into()),
    );

    let stats = h.controller.reconcile_pass().await.unwrap();

    assert_eq!(stats.failed, 1);
    assert!(h.store.get::<Engine>("vol-e").unwrap().is_some());
}

#[tokio::test]
async fn test_pin_violation_is_persisted() {
    let h = harness();
    h.store.save(&mut replica("vol-r-1", "node-a")).unwrap();
    h.cluster.add_node("node-b", "boot-b");
    h.cluster.insert_workload(Workload {
        name: "vol-r-1".into(),
        node_name: "node-b".into(),
        phase: WorkloadPhase::Running,
        pod_ip: "10.0.0.9".into(),
        ..Default::default()
    });

    let stats = h.controller.reconcile_pass().await.unwrap();
    assert_eq!(stats.failed, 1);

    let stored: Replica = h.store.get("vol-r-1").unwrap().unwrap();
    assert_eq!(stored.status.instance.current_state, InstanceState::Error);
    assert!(stored.status.instance.ip.is_empty());
    assert!(stored.status.instance.node_boot_id.is_empty());
    assert_eq!(stored.spec.instance.node_id, "node-a");
}

#[tokio::test]
async fn test_failures_do_not_abort_the_pass() {
    let h = harness();
    h.store
        .save(&mut engine("vol-e", InstanceState::Running))
        .unwrap();
    h.store.save(&mut replica("vol-r-1", "")).unwrap();
    h.cluster.fail(Op::Get, ClientError::Transport("timeout".into()));

    let stats = h.controller.reconcile_pass().await.unwrap();
    assert_eq!(stats.failed, 2);
    assert_eq!(h.cluster.calls().get, 2);

    h.cluster.clear_failures();
    let stats = h.controller.reconcile_pass().await.unwrap();
    assert_eq!(stats.reconciled, 2);
    assert_eq!(h.cluster.calls().create, 2);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let h = harness();
    h.store
        .save(&mut engine("vol-e", InstanceState::Running))
        .unwrap();
    let cluster = h.cluster.clone();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let controller = h.controller;
    let handle = tokio::spawn(async move { controller.run(shutdown_rx).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(cluster.calls().create, 1);
}
