//! bsm Instance Manager Library
//!
//! The instance manager keeps engine and replica workloads on the cluster
//! in line with the desired state recorded on each object. It runs a
//! level-triggered loop: every pass reads all objects, reconciles each one
//! against its workload and persists the resulting status.
//!
//! ## Modules
//!
//! - `config`: Environment configuration
//! - `controller`: The reconciliation loop
//! - `kube`: REST client for pods, nodes and events
//! - `objects`: Engine and replica objects
//! - `podspec`: Workload specs for engines and replicas
//! - `store`: SQLite-backed object store

pub mod config;
pub mod controller;
pub mod kube;
pub mod objects;
pub mod podspec;
pub mod store;

pub use config::Config;
pub use controller::{InstanceController, PassStats};
pub use kube::KubeClient;
pub use objects::{Engine, ObjectMeta, Replica, StoredInstance};
pub use podspec::{EnginePodSpecBuilder, ReplicaPodSpecBuilder};
pub use store::{InstanceStore, StoreError};
