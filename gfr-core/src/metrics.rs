//! Prometheus metrics for GFR

use once_cell::sync::Lazy;
use prometheus::{
    opts, register_gauge_vec, register_histogram_vec, register_int_counter,
    register_int_counter_vec, register_int_gauge, GaugeVec, HistogramVec, IntCounter,
    IntCounterVec, IntGauge,
};

use crate::fault::{FaultRecord, RemediationAction};
use crate::remediation::RemediationOutcome;

/// Completed poll cycles
static POLL_CYCLES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!("gfr_poll_cycles_total", "Total number of poll cycles"))
        .expect("Failed to create poll_cycles metric")
});

/// Node heartbeat (1=healthy, 0=faulty)
static NODE_HEALTHY: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        opts!("gfr_node_healthy", "Last classification of the node (1=healthy, 0=faulty)"),
        &["node", "instance"]
    )
    .expect("Failed to create node_healthy metric")
});

/// Unix time of the node's last classification
static NODE_LAST_SEEN: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        opts!("gfr_node_last_seen_timestamp_seconds", "Unix time of the last classification"),
        &["node"]
    )
    .expect("Failed to create node_last_seen metric")
});

/// Faults detected by category
static FAULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("gfr_faults_total", "Total number of non-healthy classifications"),
        &["category", "severity"]
    )
    .expect("Failed to create faults metric")
});

/// Classifier failures
static CLASSIFIER_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("gfr_classifier_failures_total", "Total number of failed classifications"),
        &["reason"]
    )
    .expect("Failed to create classifier_failures metric")
});

/// Evidence collection failures
static COLLECT_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("gfr_collect_failures_total", "Total number of evidence collection failures"),
        &["stage"]
    )
    .expect("Failed to create collect_failures metric")
});

/// Remediations by action and outcome
static REMEDIATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("gfr_remediations_total", "Total number of remediation cycles"),
        &["action", "outcome"]
    )
    .expect("Failed to create remediations metric")
});

/// Remediation step failures
static STEP_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!("gfr_step_failures_total", "Total number of failed remediation steps"),
        &["step"]
    )
    .expect("Failed to create step_failures metric")
});

/// Live exclusion entries
static LIVE_EXCLUSIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(opts!("gfr_live_exclusions", "Number of live exclusion entries"))
        .expect("Failed to create live_exclusions metric")
});

/// Remediation duration histogram
static REMEDIATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "gfr_remediation_duration_seconds",
        "Duration of remediation cycles",
        &["action"],
        vec![1.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0, 1800.0]
    )
    .expect("Failed to create remediation_duration metric")
});

/// Metrics registry wrapper
pub struct MetricsRegistry;

impl MetricsRegistry {
    pub fn new() -> Self {
        // Force initialization of lazy statics
        let _ = &*POLL_CYCLES;
        let _ = &*NODE_HEALTHY;
        let _ = &*NODE_LAST_SEEN;
        let _ = &*FAULTS;
        let _ = &*CLASSIFIER_FAILURES;
        let _ = &*COLLECT_FAILURES;
        let _ = &*REMEDIATIONS;
        let _ = &*STEP_FAILURES;
        let _ = &*LIVE_EXCLUSIONS;
        let _ = &*REMEDIATION_DURATION;
        Self
    }

    pub fn inc_poll_cycle(&self) {
        POLL_CYCLES.inc();
    }

    /// Record a healthy classification
    pub fn heartbeat(&self, node: &str, instance: &str) {
        NODE_HEALTHY.with_label_values(&[node, instance]).set(1.0);
        NODE_LAST_SEEN
            .with_label_values(&[node])
            .set(chrono::Utc::now().timestamp() as f64);
    }

    /// Record a non-healthy classification
    pub fn record_fault(&self, record: &FaultRecord) {
        let node = &record.node;
        NODE_HEALTHY
            .with_label_values(&[&node.name, &node.instance_id])
            .set(0.0);
        NODE_LAST_SEEN
            .with_label_values(&[&node.name])
            .set(record.observed_at.timestamp() as f64);
        FAULTS
            .with_label_values(&[&record.category.to_string(), &record.severity.to_string()])
            .inc();
    }

    pub fn inc_classifier_failure(&self, reason: &str) {
        CLASSIFIER_FAILURES.with_label_values(&[reason]).inc();
    }

    pub fn inc_collect_failure(&self, stage: &str) {
        COLLECT_FAILURES.with_label_values(&[stage]).inc();
    }

    pub fn inc_step_failure(&self, step: &str) {
        STEP_FAILURES.with_label_values(&[step]).inc();
    }

    pub fn set_live_exclusions(&self, count: i64) {
        LIVE_EXCLUSIONS.set(count);
    }

    /// Record a finished remediation cycle
    pub fn record_remediation(
        &self,
        action: RemediationAction,
        outcome: RemediationOutcome,
        duration_secs: f64,
    ) {
        let action = action.to_string();
        REMEDIATIONS
            .with_label_values(&[&action, &outcome.to_string()])
            .inc();
        REMEDIATION_DURATION
            .with_label_values(&[&action])
            .observe(duration_secs);
    }

    /// Render all registered metrics in the text exposition format
    pub fn render(&self) -> String {
        prometheus::TextEncoder::new()
            .encode_to_string(&prometheus::gather())
            .unwrap_or_default()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{FaultCategory, Node};

    #[test]
    fn test_metrics_registry() {
        let registry = MetricsRegistry::new();
        let record = FaultRecord::new(
            Node::new("gpu-metrics", "i-metrics"),
            FaultCategory::EccError,
            String::new(),
        );

        registry.inc_poll_cycle();
        registry.heartbeat("gpu-metrics-ok", "i-ok");
        registry.record_fault(&record);
        registry.inc_classifier_failure("unavailable");
        registry.inc_collect_failure("fetch");
        registry.inc_step_failure("cordon");
        registry.set_live_exclusions(3);
        registry.record_remediation(RemediationAction::Reboot, RemediationOutcome::Success, 42.0);

        let text = registry.render();
        assert!(text.contains("gfr_faults_total"));
        assert!(text.contains("ECC_ERROR"));
        assert!(text.contains("gfr_remediation_duration_seconds"));
    }
}
