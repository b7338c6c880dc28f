//! Diagnostic evidence collection
//!
//! The collector enumerates nodes running the monitored workload and
//! fetches a per-node diagnostic snapshot. The raw text is what the
//! classifier sees; the parsed fields are kept for logging and reports.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fault::Node;

/// Per-GPU diagnostic counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuDiagnostics {
    /// Uncorrectable (double-bit) ECC errors
    pub ecc_errors: u64,
    /// Last XID code reported, 0 if none
    pub last_xid: u32,
}

/// Diagnostic snapshot for one node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticSnapshot {
    pub node: Node,
    /// Diagnostics keyed by GPU index
    pub gpus: BTreeMap<u32, GpuDiagnostics>,
    /// Aggregate health, usually from [`DiagnosticSnapshot::health_summary`]
    pub health: Option<String>,
    /// Raw diagnostic text, handed to the classifier verbatim
    pub raw: String,
    pub collected_at: DateTime<Utc>,
}

impl DiagnosticSnapshot {
    pub fn new(node: Node, raw: impl Into<String>) -> Self {
        Self {
            node,
            gpus: BTreeMap::new(),
            health: None,
            raw: raw.into(),
            collected_at: Utc::now(),
        }
    }

    pub fn total_ecc_errors(&self) -> u64 {
        self.gpus.values().map(|g| g.ecc_errors).sum()
    }

    /// GPUs that reported an XID, with their codes
    pub fn xid_codes(&self) -> Vec<(u32, u32)> {
        self.gpus
            .iter()
            .filter(|(_, g)| g.last_xid != 0)
            .map(|(idx, g)| (*idx, g.last_xid))
            .collect()
    }

    /// Aggregate health derived from the per-GPU counters
    ///
    /// `Failure` when any GPU has uncorrectable ECC errors, `Warning` when
    /// any GPU reported an XID, `Healthy` otherwise. None without GPU data.
    pub fn health_summary(&self) -> Option<String> {
        if self.gpus.is_empty() {
            return None;
        }

        let ecc_total = self.total_ecc_errors();
        let xids = self.xid_codes();
        let overall = if ecc_total > 0 {
            "Failure"
        } else if !xids.is_empty() {
            "Warning"
        } else {
            "Healthy"
        };

        let mut out = format!("Overall Health: {}", overall);
        for (idx, gpu) in self.gpus.iter().filter(|(_, g)| g.ecc_errors > 0) {
            out.push_str(&format!("\nGPU {}: {} uncorrectable ECC error(s)", idx, gpu.ecc_errors));
        }
        for (idx, code) in xids {
            out.push_str(&format!("\nGPU {}: XID {}", idx, code));
        }
        Some(out)
    }

    /// Sectioned text report of the parsed diagnostics
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("=== NODE_INFO ===\n");
        out.push_str(&format!("Node: {}\n", self.node.name));
        out.push_str(&format!("Instance: {}\n", self.node.instance_id));
        if let Some(instance_type) = &self.node.instance_type {
            out.push_str(&format!("InstanceType: {}\n", instance_type));
        }
        out.push_str("=== GPU_COUNT ===\n");
        out.push_str(&format!("{}\n", self.gpus.len()));
        out.push_str("=== ECC_DATA ===\n");
        for (idx, gpu) in &self.gpus {
            out.push_str(&format!("GPU {:<6} {}\n", idx, gpu.ecc_errors));
        }
        out.push_str("=== XID_DATA ===\n");
        for (idx, gpu) in &self.gpus {
            out.push_str(&format!("GPU {:<6} {}\n", idx, gpu.last_xid));
        }
        out.push_str("=== HEALTH_DATA ===\n");
        out.push_str(self.health.as_deref().unwrap_or("unavailable"));
        out.push('\n');
        out
    }
}

/// Errors from evidence collection
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("Failed to list monitored nodes: {0}")]
    Discovery(String),

    #[error("Failed to collect diagnostics from {node}: {message}")]
    Fetch { node: String, message: String },
}

/// A monitored node and the handle used to fetch its diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredNode {
    pub node: Node,
    /// Collector-specific source, e.g. the exporter pod's address
    pub source: String,
}

/// Source of per-node diagnostic evidence
#[async_trait]
pub trait EvidenceCollector: Send + Sync {
    /// Nodes currently carrying the monitored workload
    async fn list_nodes(&self) -> Result<Vec<MonitoredNode>, CollectError>;

    /// Fetch the diagnostic snapshot for one node
    async fn collect(&self, target: &MonitoredNode) -> Result<DiagnosticSnapshot, CollectError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_aggregates() {
        let mut snapshot = DiagnosticSnapshot::new(Node::new("gpu-01", "i-01"), "raw");
        snapshot.gpus.insert(0, GpuDiagnostics { ecc_errors: 0, last_xid: 79 });
        snapshot.gpus.insert(1, GpuDiagnostics { ecc_errors: 4, last_xid: 0 });
        snapshot.gpus.insert(2, GpuDiagnostics { ecc_errors: 1, last_xid: 0 });

        assert_eq!(snapshot.total_ecc_errors(), 5);
        assert_eq!(snapshot.xid_codes(), vec![(0, 79)]);
    }

    #[test]
    fn test_health_summary() {
        let mut snapshot = DiagnosticSnapshot::new(Node::new("gpu-01", "i-01"), "");
        assert!(snapshot.health_summary().is_none());

        snapshot.gpus.insert(0, GpuDiagnostics::default());
        assert_eq!(snapshot.health_summary().unwrap(), "Overall Health: Healthy");

        snapshot.gpus.insert(1, GpuDiagnostics { ecc_errors: 0, last_xid: 48 });
        assert_eq!(
            snapshot.health_summary().unwrap(),
            "Overall Health: Warning\nGPU 1: XID 48"
        );

        snapshot.gpus.insert(2, GpuDiagnostics { ecc_errors: 3, last_xid: 0 });
        assert_eq!(
            snapshot.health_summary().unwrap(),
            "Overall Health: Failure\nGPU 2: 3 uncorrectable ECC error(s)\nGPU 1: XID 48"
        );
    }

    #[test]
    fn test_render_report_sections() {
        let mut snapshot = DiagnosticSnapshot::new(Node::new("gpu-01", "i-01"), "");
        snapshot.gpus.insert(0, GpuDiagnostics { ecc_errors: 0, last_xid: 0 });
        snapshot.gpus.insert(1, GpuDiagnostics { ecc_errors: 4, last_xid: 79 });

        let report = snapshot.render_report();
        assert!(report.starts_with("=== NODE_INFO ===\nNode: gpu-01\nInstance: i-01\n"));
        assert!(report.contains("=== GPU_COUNT ===\n2\n"));
        assert!(report.contains("GPU 1      4\n"));
        assert!(report.contains("GPU 1      79\n"));
        assert!(report.ends_with("=== HEALTH_DATA ===\nunavailable\n"));
    }
}
