//! Fault Monitor Loop
//!
//! Polls the monitored nodes at a fixed interval, classifies each one and
//! hands faults to the orchestrator. Remediations run as separate tasks so
//! polling continues while a node is being cycled.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::classifier::{Classifier, ClassifierError};
use crate::collector::{EvidenceCollector, MonitoredNode};
use crate::error::RemediationError;
use crate::exclusion::{self, ExclusionEntry};
use crate::fault::{FaultRecord, Node, RemediationAction, RemediationPolicy, Severity};
use crate::metrics::MetricsRegistry;
use crate::notify::{EventKind, NotificationEvent, Notifier};
use crate::remediation::{Orchestrator, RemediationResult};

pub type RemediationTask = Result<RemediationResult, RemediationError>;

/// What one poll cycle did
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Live exclusions found at startup
    pub in_flight: Vec<ExclusionEntry>,
    /// Skipped because a live exclusion exists
    pub excluded: Vec<String>,
    pub healthy: Vec<String>,
    /// Evidence or classification unavailable; retried next interval
    pub skipped: Vec<String>,
    /// Faults that do not warrant action
    pub observed: Vec<String>,
    /// Held for manual review
    pub held: Vec<String>,
    pub started: Vec<(String, RemediationAction)>,
    /// Finished remediations (single-pass mode only)
    pub results: Vec<RemediationResult>,
}

enum Evaluation {
    Excluded(String),
    Skipped(String),
    Classified(FaultRecord),
}

/// Fault monitor
pub struct FaultMonitor {
    collector: Arc<dyn EvidenceCollector>,
    classifier: Arc<dyn Classifier>,
    orchestrator: Arc<Orchestrator>,
    policy: RemediationPolicy,
    metrics: Arc<MetricsRegistry>,
    poll_interval: Duration,
}

impl FaultMonitor {
    pub fn new(
        collector: Arc<dyn EvidenceCollector>,
        classifier: Arc<dyn Classifier>,
        orchestrator: Arc<Orchestrator>,
        policy: RemediationPolicy,
        metrics: Arc<MetricsRegistry>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            collector,
            classifier,
            orchestrator,
            policy,
            metrics,
            poll_interval,
        }
    }

    /// Run the polling loop until shutdown
    ///
    /// In-flight remediations are awaited before returning; a started
    /// remediation is never cancelled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.poll_interval, "Starting fault monitor");

        self.surface_in_flight().await;

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut tasks: JoinSet<RemediationTask> = JoinSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.poll_cycle(&mut tasks).await;
                    debug!(
                        healthy = report.healthy.len(),
                        excluded = report.excluded.len(),
                        skipped = report.skipped.len(),
                        started = report.started.len(),
                        in_flight = tasks.len(),
                        "Poll cycle complete"
                    );
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    self.finished(joined);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(in_flight = tasks.len(), "Shutdown signal received, stopping monitor");
                        break;
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            self.finished(joined);
        }

        info!("Fault monitor stopped");
    }

    /// Run a single poll cycle and wait for the remediations it started
    pub async fn run_once(&self) -> CycleReport {
        info!("Running single poll cycle");

        let in_flight = self.surface_in_flight().await;
        let mut tasks: JoinSet<RemediationTask> = JoinSet::new();
        let mut report = self.poll_cycle(&mut tasks).await;
        report.in_flight = in_flight;

        while let Some(joined) = tasks.join_next().await {
            if let Some(result) = self.finished(joined) {
                report.results.push(result);
            }
        }

        report
    }

    /// Report exclusions left by a previous process
    ///
    /// Step position is not persisted, so these are not resumed.
    pub async fn surface_in_flight(&self) -> Vec<ExclusionEntry> {
        let store = self.orchestrator.store();
        let entries = match exclusion::run_blocking(store, |s| s.list_live()).await {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "Failed to read exclusion store");
                return Vec::new();
            }
        };

        self.metrics.set_live_exclusions(entries.len() as i64);

        for entry in &entries {
            warn!(
                node = %entry.node,
                reason = %entry.reason,
                inserted_at = %entry.inserted_at,
                expires_at = ?entry.expires_at,
                "Unresolved exclusion from a previous run, needs manual review"
            );

            let node = Node::new(&entry.node, entry.instance_id.clone().unwrap_or_default());
            let event = NotificationEvent::new(
                EventKind::ManualReview,
                Severity::Unknown,
                &node,
                &entry.reason,
                format!(
                    "Node excluded since {}; remediation is not resumed automatically",
                    entry.inserted_at
                ),
            )
            .with_step("restart");

            if let Err(e) = self.orchestrator.notifier().notify(&event).await {
                warn!(node = %entry.node, error = %e, "Failed to send notification");
            }
        }

        entries
    }

    /// Evaluate every monitored node once
    ///
    /// Remediations are spawned onto `tasks` and not awaited.
    pub async fn poll_cycle(&self, tasks: &mut JoinSet<RemediationTask>) -> CycleReport {
        self.metrics.inc_poll_cycle();
        let mut report = CycleReport::default();

        let store = self.orchestrator.store();
        let now = Utc::now();
        if let Err(e) = exclusion::run_blocking(store, move |s| s.sweep(now)).await {
            error!(error = %e, "Failed to sweep expired exclusions");
        }

        let targets = match self.collector.list_nodes().await {
            Ok(targets) => targets,
            Err(e) => {
                error!(error = %e, "Failed to list monitored nodes");
                self.metrics.inc_collect_failure("discovery");
                return report;
            }
        };
        debug!(count = targets.len(), "Evaluating monitored nodes");

        let evaluations =
            futures::future::join_all(targets.iter().map(|target| self.evaluate(target))).await;

        for evaluation in evaluations {
            match evaluation {
                Evaluation::Excluded(node) => report.excluded.push(node),
                Evaluation::Skipped(node) => report.skipped.push(node),
                Evaluation::Classified(record) => {
                    self.dispatch(record, tasks, &mut report).await;
                }
            }
        }

        match exclusion::run_blocking(store, |s| s.list_live()).await {
            Ok(live) => self.metrics.set_live_exclusions(live.len() as i64),
            Err(e) => warn!(error = %e, "Failed to count live exclusions"),
        }

        report
    }

    async fn evaluate(&self, target: &MonitoredNode) -> Evaluation {
        let name = target.node.name.clone();

        let node = name.clone();
        let excluded =
            exclusion::run_blocking(self.orchestrator.store(), move |s| s.is_excluded(&node)).await;
        match excluded {
            Ok(false) => {}
            Ok(true) => {
                debug!(node = %name, "Node excluded, skipping");
                return Evaluation::Excluded(name);
            }
            Err(e) => {
                error!(node = %name, error = %e, "Cannot read exclusion state, skipping node");
                return Evaluation::Skipped(name);
            }
        }

        let snapshot = match self.collector.collect(target).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(node = %name, error = %e, "Evidence collection failed, retrying next interval");
                self.metrics.inc_collect_failure("fetch");
                return Evaluation::Skipped(name);
            }
        };

        let verdict = match self.classifier.classify(&target.node, &snapshot.raw).await {
            Ok(verdict) => verdict,
            Err(e) => {
                let reason = match e {
                    ClassifierError::Unavailable(_) => "unavailable",
                    ClassifierError::Malformed(_) => "malformed",
                };
                warn!(node = %name, error = %e, "Classification failed, retrying next interval");
                self.metrics.inc_classifier_failure(reason);
                return Evaluation::Skipped(name);
            }
        };

        let record = FaultRecord::new(target.node.clone(), verdict.category, snapshot.raw)
            .with_error_count(verdict.error_count)
            .with_gpu(verdict.gpu_id);

        Evaluation::Classified(record)
    }

    async fn dispatch(
        &self,
        record: FaultRecord,
        tasks: &mut JoinSet<RemediationTask>,
        report: &mut CycleReport,
    ) {
        let node = record.node.clone();

        if record.category.is_healthy() {
            debug!(node = %node.name, "Node healthy");
            self.metrics.heartbeat(&node.name, &node.instance_id);
            report.healthy.push(node.name);
            return;
        }

        warn!(
            node = %node.name,
            instance = %node.instance_id,
            category = %record.category,
            severity = %record.severity,
            error_count = record.error_count,
            gpu = ?record.gpu_id,
            "Fault detected"
        );
        self.metrics.record_fault(&record);
        if let Err(e) = self
            .orchestrator
            .notifier()
            .notify(&NotificationEvent::fault_detected(&record))
            .await
        {
            warn!(node = %node.name, error = %e, "Failed to send notification");
        }

        if record.severity == Severity::Unknown {
            match self.orchestrator.hold_for_review(&record).await {
                Ok(_) => report.held.push(node.name),
                Err(RemediationError::AlreadyExcluded { .. }) => report.excluded.push(node.name),
                Err(e) => {
                    error!(node = %node.name, error = %e, "Failed to hold node for review");
                    report.skipped.push(node.name);
                }
            }
            return;
        }

        let action = self.policy.decide(&record);
        if action == RemediationAction::None {
            info!(node = %node.name, category = %record.category, "No action for this fault, observing");
            report.observed.push(node.name);
            return;
        }

        info!(node = %node.name, action = %action, "Dispatching remediation");
        let orchestrator = self.orchestrator.clone();
        let reason = record.category.to_string();
        report.started.push((node.name.clone(), action));
        tasks.spawn(async move { orchestrator.run(&node, action, &reason).await });
    }

    fn finished(
        &self,
        joined: Result<RemediationTask, JoinError>,
    ) -> Option<RemediationResult> {
        match joined {
            Ok(Ok(result)) => {
                info!(
                    node = %result.node.name,
                    action = %result.action,
                    outcome = %result.outcome,
                    "Remediation finished"
                );
                Some(result)
            }
            Ok(Err(RemediationError::AlreadyExcluded { node })) => {
                debug!(node = %node, "Remediation skipped, node already owned");
                None
            }
            Ok(Err(e)) => {
                error!(error = %e, "Remediation could not start");
                None
            }
            Err(e) => {
                error!(error = %e, "Remediation task failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classification;
    use crate::exclusion::{ExclusionStore, FileExclusionStore};
    use crate::fault::FaultCategory;
    use crate::mock::{
        MockInstanceActions, MockNodeController, RecordingNotifier, StaticClassifier,
        StaticCollector,
    };
    use crate::remediation::{RemediationConfig, RemediationOutcome};
    use tempfile::TempDir;
    use tokio::time::Instant;

    struct Fleet {
        _dir: TempDir,
        store: Arc<FileExclusionStore>,
        nodes: Arc<MockNodeController>,
        instances: Arc<MockInstanceActions>,
        notifier: Arc<RecordingNotifier>,
        collector: Arc<StaticCollector>,
        classifier: Arc<StaticClassifier>,
        monitor: FaultMonitor,
    }

    fn fleet(names: &[&str], classifier: StaticClassifier) -> Fleet {
        let nodes = names
            .iter()
            .map(|n| Node::new(*n, format!("i-{}", n)))
            .collect();
        fleet_with(StaticCollector::new(nodes), classifier)
    }

    fn fleet_with(collector: StaticCollector, classifier: StaticClassifier) -> Fleet {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileExclusionStore::new(dir.path().join("exclusions.json")));
        let nodes = Arc::new(MockNodeController::new());
        let instances = Arc::new(MockInstanceActions::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let collector = Arc::new(collector);
        let classifier = Arc::new(classifier);
        let metrics = Arc::new(MetricsRegistry::new());

        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            nodes.clone(),
            instances.clone(),
            notifier.clone(),
            metrics.clone(),
            RemediationConfig::default(),
        ));

        let monitor = FaultMonitor::new(
            collector.clone(),
            classifier.clone(),
            orchestrator,
            RemediationPolicy::default(),
            metrics,
            Duration::from_secs(30),
        );

        Fleet {
            _dir: dir,
            store,
            nodes,
            instances,
            notifier,
            collector,
            classifier,
            monitor,
        }
    }

    #[tokio::test]
    async fn test_healthy_never_cordons() {
        let f = fleet(&["gpu-01", "gpu-02"], StaticClassifier::new());

        let report = f.monitor.run_once().await;

        assert_eq!(report.healthy, vec!["gpu-01", "gpu-02"]);
        assert_eq!(f.classifier.call_count(), 2);
        assert!(f.nodes.calls().is_empty());
        assert!(f.notifier.events().is_empty());
    }

    #[tokio::test]
    async fn test_classifier_failure_skips_node() {
        let f = fleet(
            &["gpu-01", "gpu-02"],
            StaticClassifier::new().with_unavailable("gpu-01"),
        );

        let report = f.monitor.run_once().await;

        assert_eq!(report.skipped, vec!["gpu-01"]);
        assert_eq!(report.healthy, vec!["gpu-02"]);
        assert!(f.nodes.calls().is_empty());
        assert!(!f.store.is_excluded("gpu-01").unwrap());
    }

    #[tokio::test]
    async fn test_collect_failure_skips_node() {
        let collector = StaticCollector::new(vec![Node::new("gpu-01", "i-01")]).with_failing("gpu-01");
        let f = fleet_with(collector, StaticClassifier::new());

        let report = f.monitor.run_once().await;

        assert_eq!(report.skipped, vec!["gpu-01"]);
        assert_eq!(f.classifier.call_count(), 0);
    }

    #[tokio::test]
    async fn test_discovery_failure_ends_cycle() {
        let f = fleet(&["gpu-01"], StaticClassifier::new());
        f.collector.set_fail_discovery(true);

        let report = f.monitor.run_once().await;

        assert!(report.healthy.is_empty());
        assert_eq!(f.classifier.call_count(), 0);
    }

    #[tokio::test]
    async fn test_excluded_node_not_evaluated() {
        let f = fleet(&["gpu-01", "gpu-02"], StaticClassifier::new().with_verdict("gpu-01", "ECC_ERROR"));
        f.store
            .insert(ExclusionEntry::new("gpu-01", "MANUAL_PAUSE"))
            .unwrap();

        let report = f.monitor.run_once().await;

        assert_eq!(report.excluded, vec!["gpu-01"]);
        assert_eq!(f.collector.collected(), vec!["gpu-02"]);
        assert!(f.nodes.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_fault_remediated() {
        let f = fleet(
            &["gpu-03", "gpu-04"],
            StaticClassifier::new().with_verdict("gpu-03", "XID_CRITICAL_79"),
        );

        let report = f.monitor.run_once().await;

        assert_eq!(
            report.started,
            vec![("gpu-03".to_string(), RemediationAction::Reboot)]
        );
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].outcome, RemediationOutcome::Success);
        assert_eq!(report.results[0].reason, "XID_CRITICAL_79");
        assert!(!f.store.is_excluded("gpu-03").unwrap());

        let kinds: Vec<EventKind> = f.notifier.events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::FaultDetected, EventKind::RemediationSucceeded]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_policy_selected() {
        let classifier = StaticClassifier::new();
        classifier.set_verdict(
            "gpu-11",
            Classification {
                category: FaultCategory::XidCritical(94),
                error_count: 1,
                gpu_id: Some(2),
            },
        );
        let f = fleet(&["gpu-11"], classifier);

        let report = f.monitor.run_once().await;

        assert_eq!(
            report.started,
            vec![("gpu-11".to_string(), RemediationAction::Replace)]
        );
        assert!(report.results[0].success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_faulty_nodes_remediated_concurrently() {
        let f = fleet(
            &["gpu-03", "gpu-07"],
            StaticClassifier::new()
                .with_verdict("gpu-03", "XID_CRITICAL_79")
                .with_verdict("gpu-07", "ECC_ERROR"),
        );
        let start = Instant::now();

        let report = f.monitor.run_once().await;

        assert_eq!(report.results.len(), 2);
        assert!(report.results.iter().all(|r| r.success()));
        // Both reboot waits overlap.
        assert!(start.elapsed() < Duration::from_secs(600));
        assert_eq!(f.nodes.cordon_count(), 2);
    }

    #[tokio::test]
    async fn test_warning_observed_only() {
        let f = fleet(&["gpu-06"], StaticClassifier::new().with_verdict("gpu-06", "XID_WARNING_43"));

        let report = f.monitor.run_once().await;

        assert_eq!(report.observed, vec!["gpu-06"]);
        assert!(f.nodes.calls().is_empty());
        assert!(!f.store.is_excluded("gpu-06").unwrap());

        let events = f.notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::FaultDetected);
        assert_eq!(events[0].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn test_unknown_category_held_for_review() {
        let f = fleet(&["gpu-09"], StaticClassifier::new().with_verdict("gpu-09", "NVLINK_DEGRADED"));

        let report = f.monitor.run_once().await;

        assert_eq!(report.held, vec!["gpu-09"]);
        assert!(f.nodes.calls().is_empty());
        assert!(f.instances.calls().is_empty());
        assert_eq!(
            f.store.get("gpu-09").unwrap().unwrap().reason,
            "MANUAL_REVIEW_NVLINK_DEGRADED"
        );

        // Held node is skipped from now on.
        let report = f.monitor.run_once().await;
        assert_eq!(report.excluded, vec!["gpu-09"]);
    }

    #[tokio::test]
    async fn test_restart_surfaces_in_flight_exclusions() {
        let f = fleet(&["gpu-05"], StaticClassifier::new());
        f.store
            .insert(ExclusionEntry::new("gpu-05", "XID_CRITICAL_79").with_instance("i-gpu-05"))
            .unwrap();

        let report = f.monitor.run_once().await;

        assert_eq!(report.in_flight.len(), 1);
        assert_eq!(report.in_flight[0].node, "gpu-05");
        assert_eq!(report.excluded, vec!["gpu-05"]);
        assert!(f.nodes.calls().is_empty());

        let events = f.notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::ManualReview);
        assert_eq!(events[0].instance_id, "i-gpu-05");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_until_shutdown() {
        let f = fleet(&["gpu-01"], StaticClassifier::new());
        let collector = f.collector.clone();
        let monitor = Arc::new(f.monitor);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.run(rx).await }
        });

        tokio::time::sleep(Duration::from_secs(65)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        // Ticks at 0s, 30s and 60s.
        assert_eq!(collector.collected().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_remediation() {
        let f = fleet(&["gpu-03"], StaticClassifier::new().with_verdict("gpu-03", "XID_CRITICAL_79"));
        let store = f.store.clone();
        let nodes = f.nodes.clone();
        let monitor = Arc::new(f.monitor);
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.run(rx).await }
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(nodes
            .calls()
            .iter()
            .any(|c| matches!(c, crate::mock::NodeCall::Uncordon(_))));
        assert!(!store.is_excluded("gpu-03").unwrap());
    }
}
