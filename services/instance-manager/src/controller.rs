//! Level-triggered controller loop.
//!
//! Every tick loads all engines and replicas from the store and runs one
//! reconciliation cycle per object. Objects are handled one at a time, so
//! two cycles for the same object never overlap. Failures are logged and
//! the object is picked up again on the next tick.

use std::time::Duration;

use anyhow::Result;
use bsm_reconcile::{InstanceObject, InstanceReconciler};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::objects::{Engine, Replica, StoredInstance};
use crate::store::InstanceStore;

/// Outcome counts for one pass over the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub reconciled: usize,
    pub removed: usize,
    pub failed: usize,
}

impl PassStats {
    fn merge(&mut self, other: PassStats) {
        self.reconciled += other.reconciled;
        self.removed += other.removed;
        self.failed += other.failed;
    }
}

enum Outcome {
    Reconciled,
    Removed,
}

/// Reconciles every stored engine and replica on a fixed interval.
pub struct InstanceController {
    store: InstanceStore,
    engines: InstanceReconciler<Engine>,
    replicas: InstanceReconciler<Replica>,
    interval: Duration,
}

impl InstanceController {
    pub fn new(
        store: InstanceStore,
        engines: InstanceReconciler<Engine>,
        replicas: InstanceReconciler<Replica>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            engines,
            replicas,
            interval,
        }
    }

    /// Run passes until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            reconcile_interval_secs = self.interval.as_secs(),
            "Starting instance controller"
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.reconcile_pass().await {
                        error!(error = %e, "Reconciliation pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Instance controller shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run one cycle for every stored object.
    ///
    /// Only a failure to list the store aborts the pass.
    pub async fn reconcile_pass(&self) -> Result<PassStats> {
        let mut stats = self.reconcile_kind(&self.engines).await?;
        stats.merge(self.reconcile_kind(&self.replicas).await?);

        debug!(
            reconciled = stats.reconciled,
            removed = stats.removed,
            failed = stats.failed,
            "Reconciliation pass complete"
        );
        Ok(stats)
    }

    async fn reconcile_kind<T: StoredInstance>(
        &self,
        reconciler: &InstanceReconciler<T>,
    ) -> Result<PassStats> {
        let mut stats = PassStats::default();
        for obj in self.store.list::<T>()? {
            let name = obj.identity().to_string();
            match self.reconcile_object(reconciler, obj).await {
                Ok(Outcome::Reconciled) => stats.reconciled += 1,
                Ok(Outcome::Removed) => stats.removed += 1,
                Err(e) => {
                    warn!(kind = %T::KIND, instance = %name, error = %e, "Reconcile failed");
                    stats.failed += 1;
                }
            }
        }
        Ok(stats)
    }

    async fn reconcile_object<T: StoredInstance>(
        &self,
        reconciler: &InstanceReconciler<T>,
        mut obj: T,
    ) -> Result<Outcome> {
        if obj.metadata().deletion_timestamp.is_some() {
            reconciler.delete(&obj).await?;
            self.store.remove::<T>(obj.identity())?;
            info!(kind = %T::KIND, instance = %obj.identity(), "Removed instance object");
            return Ok(Outcome::Removed);
        }

        let mut spec = obj.instance_spec().clone();
        let mut status = obj.instance_status().clone();
        let result = reconciler.reconcile(&obj, &mut spec, &mut status).await;

        // Persist even on error: a pin violation forces the Error state.
        if spec != *obj.instance_spec() || status != *obj.instance_status() {
            obj.set_instance(spec, status);
            self.store.save(&mut obj)?;
        }

        result?;
        Ok(Outcome::Reconciled)
    }
}
