//! Fault model
//!
//! Nodes, fault categories as reported by the classifier, and the policy
//! that turns a classified fault into a remediation action.
//!
//! Category tags:
//! - HEALTHY
//! - XID_CRITICAL_<code>, XID_ERROR, ECC_ERROR, GPU_HEALTH_ERROR (critical)
//! - XID_WARNING_<code>, GPU_HEALTH_WARNING (warning)
//! - anything else is unknown and goes to manual review

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cluster node backed by a cloud instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    /// Cluster-scoped node name
    pub name: String,
    /// Provider instance ID (e.g. i-0abc...)
    pub instance_id: String,
    /// Instance type (e.g. p4d.24xlarge)
    pub instance_type: Option<String>,
    /// Availability zone
    pub zone: Option<String>,
}

impl Node {
    /// Create a node with only a name and instance ID
    pub fn new(name: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance_id: instance_id.into(),
            instance_type: None,
            zone: None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.instance_id)
    }
}

/// Fault category tag produced by the classifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FaultCategory {
    Healthy,
    XidCritical(u32),
    XidWarning(u32),
    /// XID errors present but no code could be determined
    XidError,
    EccError,
    GpuHealthWarning,
    GpuHealthError,
    /// Unrecognized tag, kept verbatim
    Unknown(String),
}

impl FaultCategory {
    /// Parse a category tag. Never fails: unrecognized tags become `Unknown`.
    pub fn parse(tag: &str) -> Self {
        let tag = tag.trim();
        match tag {
            "HEALTHY" => return FaultCategory::Healthy,
            "XID_ERROR" => return FaultCategory::XidError,
            "ECC_ERROR" => return FaultCategory::EccError,
            "GPU_HEALTH_WARNING" => return FaultCategory::GpuHealthWarning,
            "GPU_HEALTH_ERROR" => return FaultCategory::GpuHealthError,
            _ => {}
        }

        if let Some(code) = tag.strip_prefix("XID_CRITICAL_").and_then(|c| c.parse().ok()) {
            return FaultCategory::XidCritical(code);
        }
        if let Some(code) = tag.strip_prefix("XID_WARNING_").and_then(|c| c.parse().ok()) {
            return FaultCategory::XidWarning(code);
        }

        FaultCategory::Unknown(tag.to_string())
    }

    /// Severity derived from the category
    pub fn severity(&self) -> Severity {
        match self {
            FaultCategory::Healthy => Severity::Healthy,
            FaultCategory::XidCritical(_)
            | FaultCategory::XidError
            | FaultCategory::EccError
            | FaultCategory::GpuHealthError => Severity::Critical,
            FaultCategory::XidWarning(_) | FaultCategory::GpuHealthWarning => Severity::Warning,
            FaultCategory::Unknown(_) => Severity::Unknown,
        }
    }

    /// XID code carried by the category, if any
    pub fn xid(&self) -> Option<u32> {
        match self {
            FaultCategory::XidCritical(code) | FaultCategory::XidWarning(code) => Some(*code),
            _ => None,
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, FaultCategory::Healthy)
    }
}

impl fmt::Display for FaultCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultCategory::Healthy => write!(f, "HEALTHY"),
            FaultCategory::XidCritical(code) => write!(f, "XID_CRITICAL_{}", code),
            FaultCategory::XidWarning(code) => write!(f, "XID_WARNING_{}", code),
            FaultCategory::XidError => write!(f, "XID_ERROR"),
            FaultCategory::EccError => write!(f, "ECC_ERROR"),
            FaultCategory::GpuHealthWarning => write!(f, "GPU_HEALTH_WARNING"),
            FaultCategory::GpuHealthError => write!(f, "GPU_HEALTH_ERROR"),
            FaultCategory::Unknown(tag) => write!(f, "{}", tag),
        }
    }
}

impl From<String> for FaultCategory {
    fn from(tag: String) -> Self {
        FaultCategory::parse(&tag)
    }
}

impl From<FaultCategory> for String {
    fn from(category: FaultCategory) -> Self {
        category.to_string()
    }
}

/// Severity of a fault category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Healthy,
    Warning,
    Critical,
    /// Category not understood; needs a human
    Unknown,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Healthy => write!(f, "healthy"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
            Severity::Unknown => write!(f, "unknown"),
        }
    }
}

/// One classified observation of a node, valid for a single poll cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultRecord {
    pub node: Node,
    pub category: FaultCategory,
    pub severity: Severity,
    /// Number of errors reported for the worst GPU
    pub error_count: u32,
    /// GPU index the classifier attributed the fault to
    pub gpu_id: Option<u32>,
    /// Raw diagnostic text the classification was based on
    pub evidence: String,
    pub observed_at: DateTime<Utc>,
}

impl FaultRecord {
    pub fn new(node: Node, category: FaultCategory, evidence: String) -> Self {
        let severity = category.severity();
        Self {
            node,
            category,
            severity,
            error_count: 0,
            gpu_id: None,
            evidence,
            observed_at: Utc::now(),
        }
    }

    pub fn with_error_count(mut self, count: u32) -> Self {
        self.error_count = count;
        self
    }

    pub fn with_gpu(mut self, gpu_id: Option<u32>) -> Self {
        self.gpu_id = gpu_id;
        self
    }
}

/// What to do with the instance behind a faulty node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemediationAction {
    /// Observe only
    None,
    /// In-place restart, for transient faults
    Reboot,
    /// Terminate and let the autoscaling group provision a new instance
    Replace,
}

impl fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemediationAction::None => write!(f, "none"),
            RemediationAction::Reboot => write!(f, "reboot"),
            RemediationAction::Replace => write!(f, "replace"),
        }
    }
}

/// Maps classified faults to actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationPolicy {
    /// XID codes that signal non-recoverable hardware
    #[serde(default = "default_replace_xids")]
    pub replace_xids: Vec<u32>,

    /// More errors than this on one GPU selects Replace (None = never)
    #[serde(default = "default_replace_after_errors")]
    pub replace_after_errors: Option<u32>,
}

impl Default for RemediationPolicy {
    fn default() -> Self {
        Self {
            replace_xids: default_replace_xids(),
            replace_after_errors: default_replace_after_errors(),
        }
    }
}

impl RemediationPolicy {
    /// Decide the action for a fault. Unknown categories return `None`;
    /// callers route them to manual review.
    pub fn decide(&self, record: &FaultRecord) -> RemediationAction {
        match record.severity {
            Severity::Healthy | Severity::Warning | Severity::Unknown => RemediationAction::None,
            Severity::Critical => {
                let unrecoverable_xid = record
                    .category
                    .xid()
                    .map_or(false, |code| self.replace_xids.contains(&code));
                let too_many_errors = self
                    .replace_after_errors
                    .map_or(false, |limit| record.error_count > limit);

                if unrecoverable_xid || too_many_errors {
                    RemediationAction::Replace
                } else {
                    RemediationAction::Reboot
                }
            }
        }
    }
}

fn default_replace_xids() -> Vec<u32> {
    vec![48, 94, 95]
}

fn default_replace_after_errors() -> Option<u32> {
    Some(5)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tag: &str, count: u32) -> FaultRecord {
        FaultRecord::new(Node::new("gpu-01", "i-01"), FaultCategory::parse(tag), String::new())
            .with_error_count(count)
    }

    #[test]
    fn test_parse_known_tags() {
        assert_eq!(FaultCategory::parse("HEALTHY"), FaultCategory::Healthy);
        assert_eq!(FaultCategory::parse("XID_CRITICAL_79"), FaultCategory::XidCritical(79));
        assert_eq!(FaultCategory::parse("XID_WARNING_43"), FaultCategory::XidWarning(43));
        assert_eq!(FaultCategory::parse(" ECC_ERROR\n"), FaultCategory::EccError);
        assert_eq!(FaultCategory::parse("XID_ERROR"), FaultCategory::XidError);
        assert_eq!(FaultCategory::parse("GPU_HEALTH_ERROR"), FaultCategory::GpuHealthError);
    }

    #[test]
    fn test_unknown_tag_never_healthy() {
        for tag in ["", "healthy", "XID_CRITICAL_", "XID_CRITICAL_abc", "OK"] {
            let category = FaultCategory::parse(tag);
            assert!(matches!(category, FaultCategory::Unknown(_)), "{tag:?}");
            assert_eq!(category.severity(), Severity::Unknown);
        }
    }

    #[test]
    fn test_category_serde_as_tag() {
        let json = serde_json::to_string(&FaultCategory::XidCritical(94)).unwrap();
        assert_eq!(json, "\"XID_CRITICAL_94\"");
        let back: FaultCategory = serde_json::from_str("\"GPU_HEALTH_WARNING\"").unwrap();
        assert_eq!(back, FaultCategory::GpuHealthWarning);
    }

    #[test]
    fn test_severity() {
        assert_eq!(record("XID_CRITICAL_79", 1).severity, Severity::Critical);
        assert_eq!(record("ECC_ERROR", 1).severity, Severity::Critical);
        assert_eq!(record("XID_WARNING_31", 1).severity, Severity::Warning);
        assert_eq!(record("GPU_HEALTH_WARNING", 1).severity, Severity::Warning);
        assert_eq!(record("HEALTHY", 0).severity, Severity::Healthy);
    }

    #[test]
    fn test_policy_decisions() {
        let policy = RemediationPolicy::default();
        assert_eq!(policy.decide(&record("XID_CRITICAL_79", 1)), RemediationAction::Reboot);
        assert_eq!(policy.decide(&record("ECC_ERROR", 2)), RemediationAction::Reboot);
        assert_eq!(policy.decide(&record("XID_CRITICAL_94", 1)), RemediationAction::Replace);
        assert_eq!(policy.decide(&record("XID_ERROR", 6)), RemediationAction::Replace);
        assert_eq!(policy.decide(&record("XID_WARNING_43", 9)), RemediationAction::None);
        assert_eq!(policy.decide(&record("SOMETHING_NEW", 9)), RemediationAction::None);
        assert_eq!(policy.decide(&record("HEALTHY", 0)), RemediationAction::None);
    }

    #[test]
    fn test_policy_error_threshold_disabled() {
        let policy = RemediationPolicy {
            replace_xids: vec![],
            replace_after_errors: None,
        };
        assert_eq!(policy.decide(&record("XID_CRITICAL_94", 50)), RemediationAction::Reboot);
    }
}
