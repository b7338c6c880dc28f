//! Kubernetes Client wrapper
//!
//! Provides a simplified interface to the Kubernetes API.

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, DeleteParams, EvictParams, ListParams, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use tracing::{debug, info};

/// Field manager name used for patches
const FIELD_MANAGER: &str = "gfr";

/// Kubernetes client wrapper
#[derive(Clone)]
pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    /// Create a new K8s client using in-cluster config or kubeconfig
    pub async fn new() -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("Failed to create Kubernetes client")?;

        info!("Connected to Kubernetes API server");
        Ok(Self { client })
    }

    pub fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    pub fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub fn pods_all(&self) -> Api<Pod> {
        Api::all(self.client.clone())
    }

    /// Get a node by name
    pub async fn get_node(&self, name: &str) -> Result<Node> {
        self.nodes()
            .get(name)
            .await
            .with_context(|| format!("Failed to get node: {}", name))
    }

    /// Set or clear `spec.unschedulable`
    pub async fn set_unschedulable(&self, node_name: &str, unschedulable: bool) -> Result<()> {
        let patch = json!({
            "spec": {
                "unschedulable": unschedulable
            }
        });

        let params = PatchParams::apply(FIELD_MANAGER);
        self.nodes()
            .patch(node_name, &params, &Patch::Merge(&patch))
            .await
            .with_context(|| {
                format!(
                    "Failed to set unschedulable={} on node: {}",
                    unschedulable, node_name
                )
            })?;

        debug!(node = node_name, unschedulable, "Node patched");
        Ok(())
    }

    /// List pods on a specific node
    pub async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>> {
        let params = ListParams::default().fields(&format!("spec.nodeName={}", node_name));

        let pods = self
            .pods_all()
            .list(&params)
            .await
            .with_context(|| format!("Failed to list pods on node: {}", node_name))?;

        Ok(pods.items)
    }

    /// List pods in a namespace matching a label selector
    pub async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let params = ListParams::default().labels(label_selector);

        let pods = self
            .pods(namespace)
            .list(&params)
            .await
            .with_context(|| {
                format!(
                    "Failed to list pods in {} matching {}",
                    namespace, label_selector
                )
            })?;

        Ok(pods.items)
    }

    /// Evict a pod through the eviction API
    pub async fn evict_pod(&self, namespace: &str, name: &str, grace_period: u32) -> Result<()> {
        let params = EvictParams {
            delete_options: Some(DeleteParams::default().grace_period(grace_period)),
            ..Default::default()
        };

        self.pods(namespace)
            .evict(name, &params)
            .await
            .with_context(|| format!("Failed to evict pod: {}/{}", namespace, name))?;

        debug!(namespace = namespace, pod = name, "Pod evicted");
        Ok(())
    }

    /// Delete a pod directly, bypassing disruption budgets
    pub async fn delete_pod(&self, namespace: &str, name: &str, grace_period: u32) -> Result<()> {
        self.pods(namespace)
            .delete(name, &DeleteParams::default().grace_period(grace_period))
            .await
            .with_context(|| format!("Failed to delete pod: {}/{}", namespace, name))?;

        debug!(namespace = namespace, pod = name, "Pod deleted");
        Ok(())
    }
}

/// HTTP status of the API error behind `err`, if any
pub fn api_status(err: &anyhow::Error) -> Option<u16> {
    match err.downcast_ref::<kube::Error>() {
        Some(kube::Error::Api(response)) => Some(response.code),
        _ => None,
    }
}
