//! Remote control-plane capabilities
//!
//! Node and instance operations are opaque remote calls with an
//! ok/error/timeout outcome. Implementations surface the remote outcome
//! unmodified and never retry; escalation belongs to the orchestrator.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from node or instance operations
#[derive(Debug, Error)]
pub enum ControlError {
    /// Target does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The Kubernetes API rejected or failed the request
    #[error("Kubernetes API error: {0}")]
    Api(String),

    /// External command exited unsuccessfully
    #[error("Command failed: {0}")]
    Command(String),

    /// Operation did not complete in time
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl ControlError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ControlError::Timeout(_))
    }
}

/// Parameters for a single drain attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainOptions {
    /// Respect pod termination grace periods
    pub graceful: bool,
    /// Grace period given to each evicted pod
    pub grace_period: Duration,
    /// Bound on the whole drain
    pub timeout: Duration,
    /// Leave DaemonSet-managed pods in place
    pub ignore_daemon_sets: bool,
    /// Evict pods using emptyDir volumes (their data is lost)
    pub delete_empty_dir_data: bool,
    /// Delete pods directly instead of going through the eviction API
    pub force: bool,
}

impl DrainOptions {
    /// Graceful drain through the eviction API
    pub fn graceful(grace_period: Duration, timeout: Duration) -> Self {
        Self {
            graceful: true,
            grace_period,
            timeout,
            ignore_daemon_sets: true,
            delete_empty_dir_data: true,
            force: false,
        }
    }

    /// Forced drain: immediate deletion, no grace period
    pub fn forced(timeout: Duration) -> Self {
        Self {
            graceful: false,
            grace_period: Duration::ZERO,
            timeout,
            ignore_daemon_sets: true,
            delete_empty_dir_data: true,
            force: true,
        }
    }
}

/// Node scheduling operations
#[async_trait]
pub trait NodeController: Send + Sync {
    /// Mark the node unschedulable
    async fn cordon(&self, node: &str) -> Result<(), ControlError>;

    /// Evict workloads from the node
    async fn drain(&self, node: &str, options: &DrainOptions) -> Result<(), ControlError>;

    /// Mark the node schedulable again
    async fn uncordon(&self, node: &str) -> Result<(), ControlError>;

    /// Read the node's Ready condition
    async fn read_ready(&self, node: &str) -> Result<bool, ControlError>;
}

/// Compute instance operations
#[async_trait]
pub trait InstanceActions: Send + Sync {
    /// Request an in-place reboot. Only the acknowledgement is synchronous.
    async fn reboot(&self, instance_id: &str) -> Result<(), ControlError>;

    /// Request termination with replacement by the owning autoscaling group
    async fn replace(&self, instance_id: &str) -> Result<(), ControlError>;

    /// Provider's state string for the instance (e.g. "running")
    async fn read_state(&self, instance_id: &str) -> Result<String, ControlError>;
}
