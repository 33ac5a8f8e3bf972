//! Cluster API client.
//!
//! Talks to the core/v1 REST endpoints for pods, nodes and events:
//! - Pods in the configured namespace back instance workloads
//! - Node status supplies the boot ID used to detect host reboots
//! - Lifecycle events are posted as core/v1 `Event` objects

use std::time::Duration;

use async_trait::async_trait;
use bsm_events::{EventSink, LifecycleEvent};
use bsm_reconcile::{
    ClientError, ClientResult, ContainerReadiness, Node, NodeClient, Workload, WorkloadClient,
    WorkloadPhase, WorkloadSpec,
};
use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::Config;

/// Reported as the source component of posted events.
pub const EVENT_COMPONENT: &str = "bsm-instance-manager";

/// REST client for the cluster API.
pub struct KubeClient {
    client: reqwest::Client,
    base_url: String,
    namespace: String,
    token: Option<String>,
}

impl KubeClient {
    /// Create a client for `base_url`, scoped to `namespace`.
    pub fn new(
        base_url: impl Into<String>,
        namespace: impl Into<String>,
        token: Option<String>,
    ) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(transport)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            namespace: namespace.into(),
            token,
        })
    }

    /// Create a client from configuration. A missing token file means
    /// unauthenticated requests.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let token = match std::fs::read_to_string(&config.kube_token_file) {
            Ok(token) => Some(token.trim().to_string()),
            Err(e) => {
                warn!(
                    path = %config.kube_token_file,
                    error = %e,
                    "No service account token; requests will be unauthenticated"
                );
                None
            }
        };
        Ok(Self::new(&config.kube_api_url, &config.namespace, token)?)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn pods_url(&self) -> ClientResult<String> {
        if self.base_url.is_empty() || self.namespace.is_empty() {
            return Err(ClientError::EmptyRequestPath("pods".to_string()));
        }
        Ok(format!(
            "{}/api/v1/namespaces/{}/pods",
            self.base_url, self.namespace
        ))
    }

    fn pod_url(&self, name: &str) -> ClientResult<String> {
        if name.is_empty() {
            return Err(ClientError::EmptyRequestPath("pod".to_string()));
        }
        Ok(format!("{}/{}", self.pods_url()?, name))
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

fn transport(e: reqwest::Error) -> ClientError {
    ClientError::Transport(e.to_string())
}

/// Map a non-success response to a client error.
async fn check(response: Response, what: &str) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(what.to_string()),
        StatusCode::CONFLICT => ClientError::AlreadyExists(what.to_string()),
        _ => ClientError::Api {
            status: status.as_u16(),
            message: body,
        },
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> ClientResult<T> {
    response
        .json()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodMeta {
    name: String,
    #[serde(default)]
    deletion_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodSpecView {
    #[serde(default)]
    node_name: String,
}

#[derive(Debug, Deserialize)]
struct ContainerStatusView {
    name: String,
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodStatusView {
    #[serde(default)]
    phase: String,
    #[serde(default, rename = "podIP")]
    pod_ip: String,
    #[serde(default)]
    container_statuses: Vec<ContainerStatusView>,
}

#[derive(Debug, Deserialize)]
struct PodView {
    metadata: PodMeta,
    #[serde(default)]
    spec: PodSpecView,
    #[serde(default)]
    status: PodStatusView,
}

impl From<PodView> for Workload {
    fn from(pod: PodView) -> Self {
        Workload {
            name: pod.metadata.name,
            node_name: pod.spec.node_name,
            phase: WorkloadPhase::from_phase(&pod.status.phase),
            deletion_timestamp: pod.metadata.deletion_timestamp,
            container_statuses: pod
                .status
                .container_statuses
                .into_iter()
                .map(|c| ContainerReadiness {
                    name: c.name,
                    ready: c.ready,
                })
                .collect(),
            pod_ip: pod.status.pod_ip,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NodeMeta {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct NodeInfoView {
    #[serde(default, rename = "bootID")]
    boot_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeStatusView {
    #[serde(default)]
    node_info: NodeInfoView,
}

#[derive(Debug, Deserialize)]
struct NodeView {
    metadata: NodeMeta,
    #[serde(default)]
    status: NodeStatusView,
}

/// Render a workload spec as a core/v1 Pod.
pub fn pod_manifest(spec: &WorkloadSpec, namespace: &str) -> Value {
    let containers: Vec<Value> = spec
        .containers
        .iter()
        .map(|c| {
            json!({
                "name": c.name,
                "image": c.image,
                "command": c.command,
                "args": c.args,
                "securityContext": {"privileged": c.privileged},
            })
        })
        .collect();

    let mut pod_spec = json!({
        "restartPolicy": spec.restart_policy.as_str(),
        "containers": containers,
    });
    if let Some(node) = &spec.node_name {
        pod_spec["nodeName"] = json!(node);
    }

    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": spec.name,
            "namespace": namespace,
            "labels": spec.labels,
        },
        "spec": pod_spec,
    })
}

/// Render a lifecycle event as a core/v1 Event.
pub fn event_manifest(event: &LifecycleEvent) -> Value {
    let obj = &event.involved_object;
    let mut involved = json!({
        "kind": obj.kind.to_string(),
        "namespace": obj.namespace,
        "name": obj.name,
    });
    if let Some(rv) = &obj.resource_version {
        involved["resourceVersion"] = json!(rv);
    }

    json!({
        "apiVersion": "v1",
        "kind": "Event",
        "metadata": {
            "generateName": format!("{}.", obj.name),
            "namespace": obj.namespace,
        },
        "involvedObject": involved,
        "type": event.event_type.as_str(),
        "reason": event.reason.as_str(),
        "message": event.message,
        "firstTimestamp": event.occurred_at,
        "lastTimestamp": event.occurred_at,
        "count": 1,
        "source": {"component": EVENT_COMPONENT},
    })
}

#[async_trait]
impl WorkloadClient for KubeClient {
    async fn get_workload(&self, name: &str) -> ClientResult<Workload> {
        let url = self.pod_url(name)?;
        let response = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(transport)?;
        let pod: PodView = decode(check(response, &format!("pod {name}")).await?).await?;
        Ok(pod.into())
    }

    async fn create_workload(&self, spec: &WorkloadSpec) -> ClientResult<Workload> {
        let url = self.pods_url()?;
        debug!(workload = %spec.name, "Creating pod");
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&pod_manifest(spec, &self.namespace))
            .send()
            .await
            .map_err(transport)?;
        let pod: PodView = decode(check(response, &format!("pod {}", spec.name)).await?).await?;
        Ok(pod.into())
    }

    async fn delete_workload(&self, name: &str) -> ClientResult<()> {
        let url = self.pod_url(name)?;
        debug!(workload = %name, "Deleting pod");
        let response = self
            .request(reqwest::Method::DELETE, &url)
            .send()
            .await
            .map_err(transport)?;
        check(response, &format!("pod {name}")).await?;
        Ok(())
    }

    async fn workload_logs(&self, name: &str, tail_lines: u32) -> ClientResult<String> {
        let url = format!(
            "{}/log?timestamps=true&tailLines={tail_lines}",
            self.pod_url(name)?
        );
        let response = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(transport)?;
        check(response, &format!("logs of pod {name}"))
            .await?
            .text()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[async_trait]
impl NodeClient for KubeClient {
    async fn get_node(&self, name: &str) -> ClientResult<Node> {
        if self.base_url.is_empty() || name.is_empty() {
            return Err(ClientError::EmptyRequestPath("node".to_string()));
        }
        let url = format!("{}/api/v1/nodes/{}", self.base_url, name);
        let response = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(transport)?;
        let node: NodeView = decode(check(response, &format!("node {name}")).await?).await?;
        Ok(Node {
            name: node.metadata.name,
            boot_id: node.status.node_info.boot_id,
        })
    }
}

#[async_trait]
impl EventSink for KubeClient {
    async fn emit(&self, event: LifecycleEvent) {
        let obj = &event.involved_object;
        if self.base_url.is_empty() || obj.namespace.is_empty() {
            warn!(object = %obj, reason = %event.reason, "Dropping event with empty path");
            return;
        }
        let url = format!(
            "{}/api/v1/namespaces/{}/events",
            self.base_url, obj.namespace
        );

        let result = self
            .request(reqwest::Method::POST, &url)
            .json(&event_manifest(&event))
            .send()
            .await
            .map_err(transport);
        let result = match result {
            Ok(response) => check(response, "event").await.map(|_| ()),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            warn!(
                object = %obj,
                reason = %event.reason,
                error = %e,
                "Failed to post lifecycle event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bsm_events::{EventReason, ObjectKind, ObjectRef};
    use bsm_reconcile::{ContainerSpec, RestartPolicy};
    use std::collections::BTreeMap;

    #[test]
    fn test_pod_view_conversion() {
        let pod: PodView = serde_json::from_value(json!({
            "metadata": {"name": "vol-e", "deletionTimestamp": "2024-01-01T00:00:00Z"},
            "spec": {"nodeName": "node-a"},
            "status": {
                "phase": "Running",
                "podIP": "10.0.0.5",
                "containerStatuses": [{"name": "vol-e", "ready": true}]
            }
        }))
        .unwrap();

        let workload = Workload::from(pod);
        assert_eq!(workload.node_name, "node-a");
        assert_eq!(workload.phase, WorkloadPhase::Running);
        assert_eq!(workload.pod_ip, "10.0.0.5");
        assert!(workload.is_pending_deletion());
        assert!(workload.all_containers_ready());
    }

    #[test]
    fn test_unscheduled_pod_has_defaults() {
        let pod: PodView = serde_json::from_value(json!({"metadata": {"name": "vol-r"}})).unwrap();

        let workload = Workload::from(pod);
        assert_eq!(workload.node_name, "");
        assert_eq!(workload.phase, WorkloadPhase::Unknown);
        assert!(workload.container_statuses.is_empty());
    }

    #[test]
    fn test_pod_manifest() {
        let spec = WorkloadSpec {
            name: "vol-r-1".into(),
            labels: BTreeMap::from([("bsm.io/kind".to_string(), "replica".to_string())]),
            node_name: Some("node-a".into()),
            restart_policy: RestartPolicy::Never,
            containers: vec![ContainerSpec {
                name: "vol-r-1".into(),
                image: "engine:v1".into(),
                command: vec!["longhorn".into(), "replica".into()],
                args: Vec::new(),
                privileged: true,
            }],
        };

        let pod = pod_manifest(&spec, "longhorn-system");
        assert_eq!(pod["metadata"]["namespace"], "longhorn-system");
        assert_eq!(pod["metadata"]["labels"]["bsm.io/kind"], "replica");
        assert_eq!(pod["spec"]["nodeName"], "node-a");
        assert_eq!(pod["spec"]["restartPolicy"], "Never");
        assert_eq!(pod["spec"]["containers"][0]["securityContext"]["privileged"], true);
    }

    #[test]
    fn test_event_manifest() {
        let mut obj = ObjectRef::new(ObjectKind::Replica, "longhorn-system", "vol-r-1");
        obj.resource_version = Some("7".into());
        let event = LifecycleEvent::new(obj, EventReason::FailedStopping, "Error stopping vol-r-1");

        let manifest = event_manifest(&event);
        assert_eq!(manifest["involvedObject"]["kind"], "Replica");
        assert_eq!(manifest["involvedObject"]["resourceVersion"], "7");
        assert_eq!(manifest["type"], "Warning");
        assert_eq!(manifest["reason"], "FailedStopping");
        assert_eq!(manifest["source"]["component"], EVENT_COMPONENT);
    }

    #[test]
    fn test_empty_name_is_rejected_before_sending() {
        let client = KubeClient::new("http://127.0.0.1:1", "longhorn-system", None).unwrap();
        assert!(matches!(
            client.pod_url(""),
            Err(ClientError::EmptyRequestPath(_))
        ));

        let client = KubeClient::new("http://127.0.0.1:1", "", None).unwrap();
        assert!(matches!(
            client.pod_url("vol-e"),
            Err(ClientError::EmptyRequestPath(_))
        ));
    }
}
