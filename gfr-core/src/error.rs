//! Remediation error taxonomy

use std::time::Duration;

use thiserror::Error;

use crate::control::ControlError;
use crate::exclusion::ExclusionError;
use crate::fault::RemediationAction;

/// Errors raised while remediating one node
#[derive(Debug, Error)]
pub enum RemediationError {
    /// Another cycle owns the node
    #[error("Node {node} is already excluded")]
    AlreadyExcluded { node: String },

    #[error("Failed to cordon {node}: {source}")]
    Cordon {
        node: String,
        #[source]
        source: ControlError,
    },

    /// Graceful drain did not finish in time; escalated once
    #[error("Drain of {node} timed out after {timeout:?}")]
    DrainTimeout { node: String, timeout: Duration },

    /// Drain failed after escalation; logged and remediation continues
    #[error("Failed to drain {node}: {source}")]
    DrainFailed {
        node: String,
        #[source]
        source: ControlError,
    },

    #[error("Failed to {action} instance {instance} of {node}: {source}")]
    Action {
        node: String,
        instance: String,
        action: RemediationAction,
        #[source]
        source: ControlError,
    },

    #[error("Failed to uncordon {node}: {source}")]
    Uncordon {
        node: String,
        #[source]
        source: ControlError,
    },

    /// Post-action state could not be read; recorded as unknown
    #[error("Failed to read back state: {0}")]
    VerificationRead(String),

    #[error(transparent)]
    Exclusion(ExclusionError),
}

impl RemediationError {
    /// Errors that leave the node excluded and unresolved
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RemediationError::Cordon { .. }
                | RemediationError::Action { .. }
                | RemediationError::Uncordon { .. }
        )
    }

    /// Name of the step the error belongs to
    pub fn step(&self) -> &'static str {
        match self {
            RemediationError::AlreadyExcluded { .. } | RemediationError::Exclusion(_) => "exclude",
            RemediationError::Cordon { .. } => "cordon",
            RemediationError::DrainTimeout { .. } | RemediationError::DrainFailed { .. } => "drain",
            RemediationError::Action { .. } => "action",
            RemediationError::Uncordon { .. } => "uncordon",
            RemediationError::VerificationRead(_) => "verify",
        }
    }
}

impl From<ExclusionError> for RemediationError {
    fn from(e: ExclusionError) -> Self {
        match e {
            ExclusionError::AlreadyExcluded { node, .. } => RemediationError::AlreadyExcluded { node },
            other => RemediationError::Exclusion(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(msg: &str) -> ControlError {
        ControlError::Api(msg.to_string())
    }

    #[test]
    fn test_fatal_classification() {
        let node = "gpu-01".to_string();
        assert!(RemediationError::Cordon { node: node.clone(), source: api("x") }.is_fatal());
        assert!(RemediationError::Uncordon { node: node.clone(), source: api("x") }.is_fatal());
        assert!(RemediationError::Action {
            node: node.clone(),
            instance: "i-01".to_string(),
            action: RemediationAction::Reboot,
            source: api("x"),
        }
        .is_fatal());

        assert!(!RemediationError::AlreadyExcluded { node: node.clone() }.is_fatal());
        assert!(!RemediationError::DrainTimeout {
            node: node.clone(),
            timeout: Duration::from_secs(1)
        }
        .is_fatal());
        assert!(!RemediationError::DrainFailed { node, source: api("x") }.is_fatal());
        assert!(!RemediationError::VerificationRead("x".to_string()).is_fatal());
    }

    #[test]
    fn test_already_excluded_conversion() {
        let err: RemediationError = ExclusionError::AlreadyExcluded {
            node: "gpu-05".to_string(),
            reason: "XID_CRITICAL_79".to_string(),
        }
        .into();
        assert!(matches!(err, RemediationError::AlreadyExcluded { ref node } if node == "gpu-05"));
        assert_eq!(err.step(), "exclude");
    }

    #[test]
    fn test_action_message() {
        let err = RemediationError::Action {
            node: "gpu-11".to_string(),
            instance: "i-11".to_string(),
            action: RemediationAction::Replace,
            source: ControlError::Command("exit status 255".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Failed to replace instance i-11 of gpu-11: Command failed: exit status 255"
        );
    }
}
