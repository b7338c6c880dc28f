//! Configuration module for GFR
//!
//! Handles loading and validating configuration from YAML files and environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use gfr_aws::AwsCliConfig;
use gfr_core::{RemediationConfig, RemediationPolicy};

/// Exclusion ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionsConfig {
    /// JSON file holding the ledger
    #[serde(default = "default_exclusions_path")]
    pub path: PathBuf,

    /// Expiry for exclusions taken by remediation; null disables expiry
    #[serde(with = "humantime_serde", default = "default_exclusion_ttl")]
    pub ttl: Option<Duration>,
}

impl Default for ExclusionsConfig {
    fn default() -> Self {
        Self {
            path: default_exclusions_path(),
            ttl: default_exclusion_ttl(),
        }
    }
}

/// DCGM exporter discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Namespace the exporter pods run in
    #[serde(default = "default_collector_namespace")]
    pub namespace: String,

    #[serde(default = "default_label_selector")]
    pub label_selector: String,

    #[serde(default = "default_exporter_port")]
    pub metrics_port: u16,

    #[serde(with = "humantime_serde", default = "default_scrape_timeout")]
    pub scrape_timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            namespace: default_collector_namespace(),
            label_selector: default_label_selector(),
            metrics_port: default_exporter_port(),
            scrape_timeout: default_scrape_timeout(),
        }
    }
}

/// External fault classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Classification endpoint; required by `run`
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(with = "humantime_serde", default = "default_classifier_timeout")]
    pub timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout: default_classifier_timeout(),
        }
    }
}

/// Notification channels; an unset channel is disabled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub sns_topic_arn: Option<String>,

    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default)]
    pub lambda_function: Option<String>,

    /// Stamped on every event
    #[serde(default)]
    pub cluster_name: Option<String>,

    #[serde(with = "humantime_serde", default = "default_webhook_timeout")]
    pub webhook_timeout: Duration,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            sns_topic_arn: None,
            webhook_url: None,
            lambda_function: None,
            cluster_name: None,
            webhook_timeout: default_webhook_timeout(),
        }
    }
}

/// Metrics export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics are enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Port to expose metrics on
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Interval between poll cycles
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Dry run mode - log node and instance actions but don't execute
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub exclusions: ExclusionsConfig,

    #[serde(default)]
    pub collector: CollectorConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Orchestrator timing
    #[serde(default)]
    pub remediation: RemediationConfig,

    /// Fault to action mapping
    #[serde(default)]
    pub policy: RemediationPolicy,

    #[serde(default)]
    pub notifications: NotificationsConfig,

    #[serde(default)]
    pub aws: AwsCliConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            dry_run: false,
            exclusions: ExclusionsConfig::default(),
            collector: CollectorConfig::default(),
            classifier: ClassifierConfig::default(),
            remediation: RemediationConfig::default(),
            policy: RemediationPolicy::default(),
            notifications: NotificationsConfig::default(),
            aws: AwsCliConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse YAML configuration")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be > 0");
        }
        if self.exclusions.ttl.map_or(false, |ttl| ttl.is_zero()) {
            anyhow::bail!("exclusions.ttl must be > 0 or null");
        }
        if self.collector.metrics_port == 0 {
            anyhow::bail!("collector.metrics_port must be > 0");
        }
        if self.remediation.call_timeout.is_zero() {
            anyhow::bail!("remediation.call_timeout must be > 0");
        }
        if self.remediation.drain.timeout.is_zero() || self.remediation.forced_drain.timeout.is_zero() {
            anyhow::bail!("drain timeouts must be > 0");
        }
        if let Some(url) = &self.notifications.webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("notifications.webhook_url must be an http(s) URL");
            }
        }
        if self.metrics.enabled && self.metrics.port == 0 {
            anyhow::bail!("metrics.port must be > 0 when metrics are enabled");
        }
        Ok(())
    }

    /// Fill unset notification channels from the environment
    pub fn with_notifications_from_env(self) -> Self {
        self.with_notifications_from(|key| std::env::var(key).ok())
    }

    fn with_notifications_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let notifications = &mut self.notifications;

        if notifications.sns_topic_arn.is_none() {
            notifications.sns_topic_arn = env("SNS_TOPIC_ARN");
        }
        if notifications.webhook_url.is_none() {
            notifications.webhook_url = env("WEBHOOK_URL");
        }
        if notifications.lambda_function.is_none() {
            notifications.lambda_function = env("LAMBDA_FUNCTION");
        }
        if notifications.cluster_name.is_none() {
            notifications.cluster_name = env("CLUSTER_NAME");
        }
        self
    }
}

// Default value functions
fn default_poll_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_exclusions_path() -> PathBuf {
    PathBuf::from("/var/lib/gfr/exclusions.json")
}

fn default_exclusion_ttl() -> Option<Duration> {
    Some(Duration::from_secs(6 * 3600))
}

fn default_collector_namespace() -> String {
    "gpu-operator".to_string()
}

fn default_label_selector() -> String {
    "app=nvidia-dcgm-exporter".to_string()
}

fn default_exporter_port() -> u16 {
    9400
}

fn default_scrape_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_classifier_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_metrics_port() -> u16 {
    9464
}

fn default_true() -> bool {
    true
}
