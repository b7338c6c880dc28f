//! Notifications
//!
//! Fault and remediation events fan out to every configured channel.
//! Delivery failures are logged and never affect remediation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::fault::{FaultRecord, Node, Severity};

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Non-healthy classification observed
    FaultDetected,
    RemediationSucceeded,
    /// Terminal failure; the node stays excluded
    RemediationFailed,
    /// Needs a human before anything else happens to the node
    ManualReview,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::FaultDetected => write!(f, "fault_detected"),
            EventKind::RemediationSucceeded => write!(f, "remediation_succeeded"),
            EventKind::RemediationFailed => write!(f, "remediation_failed"),
            EventKind::ManualReview => write!(f, "manual_review"),
        }
    }
}

/// Event payload shared by all channels
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    /// Fault category tag or exclusion reason
    pub error_type: String,
    pub node_name: String,
    pub instance_id: String,
    pub error_details: String,
    /// Remediation step that failed, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub cluster_name: Option<String>,
}

impl NotificationEvent {
    pub fn new(
        kind: EventKind,
        severity: Severity,
        node: &Node,
        error_type: impl Into<String>,
        error_details: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            severity,
            error_type: error_type.into(),
            node_name: node.name.clone(),
            instance_id: node.instance_id.clone(),
            error_details: error_details.into(),
            step: None,
            cluster_name: None,
        }
    }

    pub fn fault_detected(record: &FaultRecord) -> Self {
        let details = match record.gpu_id {
            Some(gpu) => format!("{} error(s) on GPU {}", record.error_count, gpu),
            None => format!("{} error(s)", record.error_count),
        };
        Self::new(
            EventKind::FaultDetected,
            record.severity,
            &record.node,
            record.category.to_string(),
            details,
        )
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    /// One-line subject for channels that have one
    pub fn subject(&self) -> String {
        format!(
            "GPU {} [{}] - {} on {} ({})",
            self.kind, self.severity, self.error_type, self.node_name, self.instance_id
        )
    }
}

/// Errors from a notification channel
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP delivery failed: {0}")]
    Http(String),

    #[error("Endpoint rejected notification: HTTP {0}")]
    Rejected(u16),

    #[error("Command failed: {0}")]
    Command(String),
}

/// A notification channel
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name for logs
    fn name(&self) -> &str;

    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError>;
}

/// Logs every event; always enabled
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        match event.kind {
            EventKind::RemediationFailed | EventKind::ManualReview => error!(
                kind = %event.kind,
                node = %event.node_name,
                instance = %event.instance_id,
                error_type = %event.error_type,
                step = ?event.step,
                details = %event.error_details,
                "ALERT"
            ),
            EventKind::FaultDetected if event.severity >= Severity::Critical => warn!(
                kind = %event.kind,
                node = %event.node_name,
                instance = %event.instance_id,
                error_type = %event.error_type,
                details = %event.error_details,
                "ALERT"
            ),
            _ => info!(
                kind = %event.kind,
                node = %event.node_name,
                instance = %event.instance_id,
                error_type = %event.error_type,
                details = %event.error_details,
                "ALERT"
            ),
        }
        Ok(())
    }
}

/// POSTs the event as JSON to a webhook URL
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }

        debug!(url = %self.url, kind = %event.kind, "Webhook delivered");
        Ok(())
    }
}

/// Fan-out over all configured channels
pub struct NotifierSet {
    channels: Vec<Arc<dyn Notifier>>,
    cluster_name: Option<String>,
}

impl NotifierSet {
    /// A set containing only the log channel
    pub fn new(cluster_name: Option<String>) -> Self {
        Self {
            channels: vec![Arc::new(LogNotifier)],
            cluster_name,
        }
    }

    pub fn with_channel(mut self, channel: Arc<dyn Notifier>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }
}

#[async_trait]
impl Notifier for NotifierSet {
    fn name(&self) -> &str {
        "all"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let mut event = event.clone();
        if event.cluster_name.is_none() {
            event.cluster_name = self.cluster_name.clone();
        }

        let deliveries = self.channels.iter().map(|channel| {
            let event = &event;
            async move { (channel.name(), channel.notify(event).await) }
        });

        for (name, result) in futures::future::join_all(deliveries).await {
            if let Err(e) = result {
                warn!(channel = name, kind = %event.kind, error = %e, "Notification failed");
            }
        }

        Ok(())
    }
}
