//! bsm Instance Manager
//!
//! Runs next to the cluster API and converges engine and replica
//! workloads toward the desired state stored on each object.

use std::sync::Arc;

use anyhow::{Context, Result};
use bsm_reconcile::InstanceReconciler;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bsm_instance_manager::{
    Config, Engine, EnginePodSpecBuilder, InstanceStore, InstanceController, KubeClient,
    Replica, ReplicaPodSpecBuilder,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        namespace = %config.namespace,
        kube_api_url = %config.kube_api_url,
        state_dir = %config.state_dir,
        "Starting bsm instance manager"
    );

    let kube = Arc::new(KubeClient::from_config(&config)?);
    let db_path = config.database_path();
    let store = InstanceStore::open(&db_path)
        .with_context(|| format!("failed to open object store {}", db_path.display()))?;

    let engines = InstanceReconciler::<Engine>::new(
        kube.clone(),
        kube.clone(),
        kube.clone(),
        Arc::new(EnginePodSpecBuilder::new(&config.engine_binary)),
        config.reconciler_config(),
    );
    let replicas = InstanceReconciler::<Replica>::new(
        kube.clone(),
        kube.clone(),
        kube,
        Arc::new(ReplicaPodSpecBuilder::new(&config.engine_binary)),
        config.reconciler_config(),
    );
    let controller = InstanceController::new(store, engines, replicas, config.reconcile_interval());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let controller_handle = tokio::spawn(async move {
        controller.run(shutdown_rx).await;
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Received shutdown signal");

    // The controller finishes its current pass before exiting.
    let _ = shutdown_tx.send(true);
    controller_handle.await.context("controller task panicked")?;

    info!("Instance manager shutdown complete");
    Ok(())
}
