//! GFR Kubernetes Integration
//!
//! Provides the Kubernetes client, node operations and the DCGM exporter
//! collector for GPU Fault Remediator.

pub mod client;
pub mod collector;
pub mod node_ops;

pub use client::K8sClient;
pub use collector::{DcgmCollector, DcgmCollectorConfig};
pub use node_ops::KubeNodeController;
