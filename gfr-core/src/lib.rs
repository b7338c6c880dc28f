//! GFR Core Library
//!
//! Fault remediation control loop for GPU Fault Remediator.
//! This crate provides the exclusion store, the capability traits for node,
//! instance, classifier and collector access, the remediation orchestrator
//! and the fault monitor loop.

pub mod classifier;
pub mod collector;
pub mod control;
pub mod error;
pub mod exclusion;
pub mod fault;
pub mod metrics;
pub mod mock;
pub mod monitor;
pub mod notify;
pub mod remediation;

// Re-export common types
pub use classifier::{Classification, Classifier, ClassifierError, HttpClassifier};
pub use collector::{CollectError, DiagnosticSnapshot, EvidenceCollector, MonitoredNode};
pub use control::{ControlError, DrainOptions, InstanceActions, NodeController};
pub use error::RemediationError;
pub use exclusion::{ExclusionEntry, ExclusionError, ExclusionStore, FileExclusionStore};
pub use fault::{FaultCategory, FaultRecord, Node, RemediationAction, RemediationPolicy, Severity};
pub use monitor::{CycleReport, FaultMonitor};
pub use notify::{NotificationEvent, Notifier, NotifierSet};
pub use remediation::{
    Orchestrator, RemediationConfig, RemediationOutcome, RemediationResult, RemediationState,
};
