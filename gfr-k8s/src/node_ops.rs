//! Node Operations
//!
//! Cordon, drain, uncordon and readiness checks against the Kubernetes API.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, info, warn};

use super::client::{api_status, K8sClient};
use gfr_core::control::{ControlError, DrainOptions, NodeController};

/// Interval between checks for evicted pods to disappear
const DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Node controller backed by the Kubernetes API
pub struct KubeNodeController {
    client: K8sClient,
    dry_run: bool,
}

impl KubeNodeController {
    pub fn new(client: K8sClient, dry_run: bool) -> Self {
        Self { client, dry_run }
    }

    async fn evict_all(&self, node: &str, pods: &[Pod], options: &DrainOptions) -> Result<(), ControlError> {
        let grace = grace_seconds(options);
        let mut failures = Vec::new();

        for pod in pods {
            let namespace = pod.metadata.namespace.as_deref().unwrap_or("default");
            let name = pod.metadata.name.as_deref().unwrap_or("unknown");

            let result = if options.force {
                self.client.delete_pod(namespace, name, grace).await
            } else {
                self.client.evict_pod(namespace, name, grace).await
            };

            match result {
                Ok(()) => debug!(node = node, namespace = namespace, pod = name, "Pod removal requested"),
                Err(e) if api_status(&e) == Some(404) => {
                    debug!(namespace = namespace, pod = name, "Pod already gone");
                }
                Err(e) => {
                    warn!(
                        node = node,
                        namespace = namespace,
                        pod = name,
                        error = %e,
                        "Failed to remove pod"
                    );
                    failures.push(format!("{}/{}: {:#}", namespace, name, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ControlError::Api(format!(
                "{} pod(s) could not be removed: {}",
                failures.len(),
                failures.join("; ")
            )))
        }
    }

    /// Wait until none of the drained pods remain on the node
    async fn wait_for_pods_gone(&self, node: &str, options: &DrainOptions) -> Result<(), ControlError> {
        let deadline = tokio::time::Instant::now() + options.timeout;

        loop {
            let remaining = self
                .client
                .list_pods_on_node(node)
                .await
                .map_err(to_control_error)?
                .into_iter()
                .filter(|pod| !should_skip_pod(pod, options))
                .count();

            if remaining == 0 {
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(ControlError::Timeout(options.timeout));
            }

            debug!(node = node, remaining, "Waiting for pods to terminate");
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl NodeController for KubeNodeController {
    async fn cordon(&self, node: &str) -> Result<(), ControlError> {
        if self.dry_run {
            info!(node = node, "[DRY-RUN] Would cordon node");
            return Ok(());
        }

        self.client
            .set_unschedulable(node, true)
            .await
            .map_err(to_control_error)?;
        info!(node = node, "Node cordoned");
        Ok(())
    }

    async fn drain(&self, node: &str, options: &DrainOptions) -> Result<(), ControlError> {
        let pods: Vec<Pod> = self
            .client
            .list_pods_on_node(node)
            .await
            .map_err(to_control_error)?
            .into_iter()
            .filter(|pod| !should_skip_pod(pod, options))
            .collect();

        if !options.delete_empty_dir_data {
            if let Some(pod) = pods.iter().find(|pod| uses_empty_dir(pod)) {
                return Err(ControlError::Other(format!(
                    "pod {} uses emptyDir data",
                    pod.metadata.name.as_deref().unwrap_or("unknown")
                )));
            }
        }

        if self.dry_run {
            for pod in &pods {
                info!(
                    node = node,
                    namespace = pod.metadata.namespace.as_deref().unwrap_or("default"),
                    pod = pod.metadata.name.as_deref().unwrap_or("unknown"),
                    force = options.force,
                    "[DRY-RUN] Would evict pod"
                );
            }
            return Ok(());
        }

        info!(
            node = node,
            pods = pods.len(),
            force = options.force,
            grace_period = ?options.grace_period,
            "Draining node"
        );

        if pods.is_empty() {
            return Ok(());
        }

        self.evict_all(node, &pods, options).await?;
        self.wait_for_pods_gone(node, options).await?;

        info!(node = node, "Node drained");
        Ok(())
    }

    async fn uncordon(&self, node: &str) -> Result<(), ControlError> {
        if self.dry_run {
            info!(node = node, "[DRY-RUN] Would uncordon node");
            return Ok(());
        }

        self.client
            .set_unschedulable(node, false)
            .await
            .map_err(to_control_error)?;
        info!(node = node, "Node uncordoned");
        Ok(())
    }

    async fn read_ready(&self, node: &str) -> Result<bool, ControlError> {
        let node = self.client.get_node(node).await.map_err(to_control_error)?;
        Ok(is_ready(&node))
    }
}

/// Map a client error to a control error, keeping not-found distinct
pub fn to_control_error(err: anyhow::Error) -> ControlError {
    match api_status(&err) {
        Some(404) => ControlError::NotFound(format!("{:#}", err)),
        _ => ControlError::Api(format!("{:#}", err)),
    }
}

/// Whether the node's Ready condition is True
pub fn is_ready(node: &k8s_openapi::api::core::v1::Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"))
        .map_or(false, |c| c.status == "True")
}

/// Check if a pod should be left alone by a drain
fn should_skip_pod(pod: &Pod, options: &DrainOptions) -> bool {
    let metadata = &pod.metadata;

    // Skip mirror pods (created by kubelet for static pods)
    if let Some(annotations) = &metadata.annotations {
        if annotations.contains_key("kubernetes.io/config.mirror") {
            return true;
        }
    }

    if options.ignore_daemon_sets {
        if let Some(owner_refs) = &metadata.owner_references {
            if owner_refs.iter().any(|owner| owner.kind == "DaemonSet") {
                return true;
            }
        }
    }

    // Finished pods hold no workload
    matches!(
        pod.status.as_ref().and_then(|s| s.phase.as_deref()),
        Some("Succeeded") | Some("Failed")
    )
}

fn uses_empty_dir(pod: &Pod) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.volumes.as_ref())
        .map_or(false, |volumes| volumes.iter().any(|v| v.empty_dir.is_some()))
}

/// Grace period in whole seconds, saturating at the API's limit
fn grace_seconds(options: &DrainOptions) -> u32 {
    u32::try_from(options.grace_period.as_secs()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        EmptyDirVolumeSource, NodeCondition, NodeStatus, PodSpec, PodStatus, Volume,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
    use std::collections::BTreeMap;

    fn pod(name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("training".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn owned_by(mut pod: Pod, kind: &str) -> Pod {
        pod.metadata.owner_references = Some(vec![OwnerReference {
            kind: kind.to_string(),
            name: "owner".to_string(),
            api_version: "apps/v1".to_string(),
            uid: "uid".to_string(),
            ..Default::default()
        }]);
        pod
    }

    #[test]
    fn test_skip_rules() {
        let graceful = DrainOptions::graceful(Duration::from_secs(30), Duration::from_secs(300));

        assert!(!should_skip_pod(&pod("trainer-0"), &graceful));
        assert!(!should_skip_pod(&owned_by(pod("trainer-1"), "StatefulSet"), &graceful));
        assert!(should_skip_pod(&owned_by(pod("dcgm-exporter"), "DaemonSet"), &graceful));

        let mut mirror = pod("kube-apiserver");
        mirror.metadata.annotations = Some(BTreeMap::from([(
            "kubernetes.io/config.mirror".to_string(),
            "hash".to_string(),
        )]));
        assert!(should_skip_pod(&mirror, &graceful));

        let mut done = pod("job-0");
        done.status = Some(PodStatus {
            phase: Some("Succeeded".to_string()),
            ..Default::default()
        });
        assert!(should_skip_pod(&done, &graceful));

        let mut keep_daemonsets = graceful.clone();
        keep_daemonsets.ignore_daemon_sets = false;
        assert!(!should_skip_pod(&owned_by(pod("dcgm-exporter"), "DaemonSet"), &keep_daemonsets));
    }

    #[test]
    fn test_empty_dir_detection() {
        let mut scratch = pod("scratch");
        scratch.spec = Some(PodSpec {
            volumes: Some(vec![Volume {
                name: "cache".to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            }]),
            ..Default::default()
        });

        assert!(uses_empty_dir(&scratch));
        assert!(!uses_empty_dir(&pod("plain")));
    }

    #[test]
    fn test_ready_condition() {
        let node = |status: &str| k8s_openapi::api::core::v1::Node {
            status: Some(NodeStatus {
                conditions: Some(vec![
                    NodeCondition {
                        type_: "MemoryPressure".to_string(),
                        status: "False".to_string(),
                        ..Default::default()
                    },
                    NodeCondition {
                        type_: "Ready".to_string(),
                        status: status.to_string(),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert!(is_ready(&node("True")));
        assert!(!is_ready(&node("False")));
        assert!(!is_ready(&node("Unknown")));
        assert!(!is_ready(&k8s_openapi::api::core::v1::Node::default()));
    }

    #[test]
    fn test_grace_seconds_saturates() {
        let timeout = Duration::from_secs(300);
        assert_eq!(grace_seconds(&DrainOptions::graceful(Duration::from_secs(30), timeout)), 30);
        assert_eq!(grace_seconds(&DrainOptions::forced(timeout)), 0);

        let huge = Duration::from_secs(u64::from(u32::MAX) + 7);
        assert_eq!(grace_seconds(&DrainOptions::graceful(huge, timeout)), u32::MAX);
    }
}
