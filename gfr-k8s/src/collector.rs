//! DCGM exporter collector
//!
//! Finds the DCGM exporter pods, maps each to the node it runs on and
//! scrapes the exporter's Prometheus text for per-GPU ECC and XID counters.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node as K8sNode;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::client::K8sClient;
use gfr_core::collector::{
    CollectError, DiagnosticSnapshot, EvidenceCollector, GpuDiagnostics, MonitoredNode,
};
use gfr_core::fault::Node;

/// Uncorrectable volatile ECC errors
const ECC_METRIC: &str = "DCGM_FI_DEV_ECC_DBE_VOL_TOTAL";
/// Last XID error code
const XID_METRIC: &str = "DCGM_FI_DEV_XID_ERRORS";

const INSTANCE_TYPE_LABEL: &str = "node.kubernetes.io/instance-type";
const ZONE_LABEL: &str = "topology.kubernetes.io/zone";

static SAMPLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_:][A-Za-z0-9_:]*)\{([^}]*)\}\s+(\S+)").expect("valid sample regex")
});

static GPU_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:^|,)\s*gpu="(\d+)""#).expect("valid gpu label regex"));

static PROVIDER_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^aws:///[^/]*/(i-[0-9a-f]+)$").expect("valid provider id regex"));

/// Where to find the exporter pods
#[derive(Debug, Clone)]
pub struct DcgmCollectorConfig {
    pub namespace: String,
    pub label_selector: String,
    pub metrics_port: u16,
    pub scrape_timeout: Duration,
}

/// Evidence collector backed by DCGM exporter pods
pub struct DcgmCollector {
    client: K8sClient,
    http: reqwest::Client,
    config: DcgmCollectorConfig,
}

impl DcgmCollector {
    pub fn new(client: K8sClient, config: DcgmCollectorConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.scrape_timeout)
            .build()?;

        Ok(Self {
            client,
            http,
            config,
        })
    }

    async fn resolve_node(&self, name: &str) -> Result<Node, CollectError> {
        let k8s_node = self
            .client
            .get_node(name)
            .await
            .map_err(|e| CollectError::Discovery(format!("{:#}", e)))?;

        node_from_k8s(name, &k8s_node).ok_or_else(|| {
            CollectError::Discovery(format!("node {} has no EC2 provider ID", name))
        })
    }
}

#[async_trait]
impl EvidenceCollector for DcgmCollector {
    async fn list_nodes(&self) -> Result<Vec<MonitoredNode>, CollectError> {
        let pods = self
            .client
            .list_pods(&self.config.namespace, &self.config.label_selector)
            .await
            .map_err(|e| CollectError::Discovery(format!("{:#}", e)))?;

        let mut targets: BTreeMap<String, MonitoredNode> = BTreeMap::new();
        for pod in pods {
            let pod_name = pod.metadata.name.clone().unwrap_or_default();
            let node_name = pod.spec.as_ref().and_then(|s| s.node_name.clone());
            let status = pod.status.as_ref();
            let pod_ip = status.and_then(|s| s.pod_ip.clone());
            let running = status.and_then(|s| s.phase.as_deref()) == Some("Running");

            let (Some(node_name), Some(pod_ip), true) = (node_name, pod_ip, running) else {
                debug!(pod = %pod_name, "Exporter pod not running, skipping");
                continue;
            };

            if targets.contains_key(&node_name) {
                continue;
            }

            match self.resolve_node(&node_name).await {
                Ok(node) => {
                    targets.insert(
                        node_name,
                        MonitoredNode {
                            node,
                            source: format!("http://{}:{}/metrics", pod_ip, self.config.metrics_port),
                        },
                    );
                }
                Err(e) => warn!(node = %node_name, error = %e, "Cannot resolve node, skipping"),
            }
        }

        debug!(count = targets.len(), "Discovered DCGM exporter nodes");
        Ok(targets.into_values().collect())
    }

    async fn collect(&self, target: &MonitoredNode) -> Result<DiagnosticSnapshot, CollectError> {
        let fetch_error = |message: String| CollectError::Fetch {
            node: target.node.name.clone(),
            message,
        };

        let response = self
            .http
            .get(&target.source)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {} from {}", status, target.source)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        Ok(parse_exporter_text(target.node.clone(), &body))
    }
}

/// Build a core node from the Kubernetes node object
///
/// Returns None when the provider ID does not name an EC2 instance.
pub fn node_from_k8s(name: &str, node: &K8sNode) -> Option<Node> {
    let provider_id = node.spec.as_ref()?.provider_id.as_deref()?;
    let instance_id = PROVIDER_ID_RE.captures(provider_id)?.get(1)?.as_str();

    let labels = node.metadata.labels.as_ref();
    let label = |key: &str| labels.and_then(|l| l.get(key)).cloned();

    Some(Node {
        name: name.to_string(),
        instance_id: instance_id.to_string(),
        instance_type: label(INSTANCE_TYPE_LABEL),
        zone: label(ZONE_LABEL),
    })
}

/// Parse DCGM exporter output into a snapshot
///
/// The snapshot's raw text is the sectioned report followed by the
/// relevant exporter samples verbatim.
pub fn parse_exporter_text(node: Node, text: &str) -> DiagnosticSnapshot {
    let mut gpus: BTreeMap<u32, GpuDiagnostics> = BTreeMap::new();
    let mut samples = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        let Some(caps) = SAMPLE_RE.captures(line) else {
            continue;
        };

        let metric = &caps[1];
        if metric != ECC_METRIC && metric != XID_METRIC {
            continue;
        }

        let Some(gpu) = GPU_LABEL_RE
            .captures(&caps[2])
            .and_then(|g| g[1].parse::<u32>().ok())
        else {
            continue;
        };

        let Ok(value) = caps[3].parse::<f64>() else {
            continue;
        };

        let entry = gpus.entry(gpu).or_default();
        if metric == ECC_METRIC {
            entry.ecc_errors = value.max(0.0) as u64;
        } else {
            entry.last_xid = value.max(0.0) as u32;
        }
        samples.push(line.to_string());
    }

    let mut snapshot = DiagnosticSnapshot::new(node, String::new());
    snapshot.gpus = gpus;
    snapshot.health = snapshot.health_summary();

    let mut raw = snapshot.render_report();
    raw.push_str("=== EXPORTER_SAMPLES ===\n");
    for sample in &samples {
        raw.push_str(sample);
        raw.push('\n');
    }
    snapshot.raw = raw;
    snapshot
}
