//! Remediation Orchestrator
//!
//! Drives one node through a single remediation cycle:
//!
//! Idle → Excluding → Cordoning → Draining → EscalatedDraining → Acting →
//! Recovering → Verifying → Terminal(Success | Failed | ManualIntervention)
//!
//! - Excluding: compare-and-insert into the exclusion store; losing the race
//!   aborts the cycle with `AlreadyExcluded`
//! - Cordon failure: ManualIntervention, nothing else attempted
//! - Graceful drain failure or timeout: one forced drain; if that fails too
//!   the cycle continues to the action anyway
//! - Action failure: Failed
//! - Replace skips recovery; the node is retired
//! - Uncordon failure: ManualIntervention
//! - Verification reads are best effort; failures are recorded as unknown
//!
//! The exclusion is removed only on Success. Any other terminal outcome pins
//! it (clears its expiry) so the node is not retried until an operator
//! resumes it. Once cordon has started the cycle always runs to a terminal
//! state.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::control::{ControlError, DrainOptions, InstanceActions, NodeController};
use crate::error::RemediationError;
use crate::exclusion::{self, ExclusionEntry, ExclusionStore};
use crate::fault::{FaultRecord, Node, RemediationAction, Severity};
use crate::metrics::MetricsRegistry;
use crate::notify::{EventKind, NotificationEvent, Notifier};

/// Instance state recorded when it could not be read
pub const UNKNOWN_STATE: &str = "unknown";

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemediationState {
    Idle,
    Excluding,
    Cordoning,
    Draining,
    EscalatedDraining,
    Acting,
    Recovering,
    Verifying,
    Terminal(RemediationOutcome),
}

impl fmt::Display for RemediationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemediationState::Idle => write!(f, "IDLE"),
            RemediationState::Excluding => write!(f, "EXCLUDING"),
            RemediationState::Cordoning => write!(f, "CORDONING"),
            RemediationState::Draining => write!(f, "DRAINING"),
            RemediationState::EscalatedDraining => write!(f, "ESCALATED_DRAINING"),
            RemediationState::Acting => write!(f, "ACTING"),
            RemediationState::Recovering => write!(f, "RECOVERING"),
            RemediationState::Verifying => write!(f, "VERIFYING"),
            RemediationState::Terminal(outcome) => write!(f, "TERMINAL({})", outcome),
        }
    }
}

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationOutcome {
    Success,
    /// The action call failed
    Failed,
    /// Node left in an unknown state; a human has to look
    ManualIntervention,
}

impl RemediationOutcome {
    /// Process exit code for the remediation entrypoints
    pub fn exit_code(&self) -> u8 {
        match self {
            RemediationOutcome::Success => 0,
            RemediationOutcome::Failed | RemediationOutcome::ManualIntervention => 1,
        }
    }
}

impl fmt::Display for RemediationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemediationOutcome::Success => write!(f, "success"),
            RemediationOutcome::Failed => write!(f, "failed"),
            RemediationOutcome::ManualIntervention => write!(f, "manual_intervention"),
        }
    }
}

/// Remote operations performed during a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Cordon,
    Drain,
    ForcedDrain,
    Action,
    Uncordon,
    Verify,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Cordon => write!(f, "cordon"),
            Step::Drain => write!(f, "drain"),
            Step::ForcedDrain => write!(f, "forced_drain"),
            Step::Action => write!(f, "action"),
            Step::Uncordon => write!(f, "uncordon"),
            Step::Verify => write!(f, "verify"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum StepStatus {
    Ok,
    TimedOut,
    Failed(String),
}

impl StepStatus {
    fn of<T>(result: &Result<T, ControlError>) -> Self {
        match result {
            Ok(_) => StepStatus::Ok,
            Err(e) if e.is_timeout() => StepStatus::TimedOut,
            Err(e) => StepStatus::Failed(e.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, StepStatus::Ok)
    }
}

/// Outcome of one remote operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: Step,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Structured report emitted on every path that leaves the node excluded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub node: String,
    pub instance: String,
    pub step: String,
    pub error: String,
    pub reported_at: DateTime<Utc>,
}

impl FailureReport {
    pub fn new(node: &Node, step: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            node: node.name.clone(),
            instance: node.instance_id.clone(),
            step: step.into(),
            error: error.into(),
            reported_at: Utc::now(),
        }
    }
}

/// Step to record when manual review is requested without remediation
pub const REVIEW_STEP: &str = "classify";

/// Everything that happened in one cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationResult {
    pub node: Node,
    pub action: RemediationAction,
    /// Exclusion reason
    pub reason: String,
    pub steps: Vec<StepRecord>,
    /// States visited, in order
    pub transitions: Vec<RemediationState>,
    /// Ready condition after recovery; None if not read
    pub node_ready: Option<bool>,
    pub instance_state: String,
    pub outcome: RemediationOutcome,
    pub failure: Option<FailureReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RemediationResult {
    fn new(node: Node, action: RemediationAction, reason: &str) -> Self {
        Self {
            node,
            action,
            reason: reason.to_string(),
            steps: Vec::new(),
            transitions: vec![RemediationState::Idle],
            node_ready: None,
            instance_state: UNKNOWN_STATE.to_string(),
            outcome: RemediationOutcome::Failed,
            failure: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn success(&self) -> bool {
        self.outcome == RemediationOutcome::Success
    }

    pub fn step(&self, step: Step) -> Option<&StepRecord> {
        self.steps.iter().find(|r| r.step == step)
    }

    pub fn final_state(&self) -> RemediationState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(RemediationState::Idle)
    }

    /// Notification for the cycle's terminal state
    pub fn event(&self) -> NotificationEvent {
        match &self.failure {
            None => {
                let ready = match self.node_ready {
                    Some(true) => "ready",
                    Some(false) => "not ready",
                    None => "unknown",
                };
                NotificationEvent::new(
                    EventKind::RemediationSucceeded,
                    Severity::Healthy,
                    &self.node,
                    &self.reason,
                    format!(
                        "{} completed; instance {}, node {}",
                        self.action, self.instance_state, ready
                    ),
                )
            }
            Some(report) if report.step == REVIEW_STEP => NotificationEvent::new(
                EventKind::ManualReview,
                Severity::Unknown,
                &self.node,
                &self.reason,
                &report.error,
            )
            .with_step(&report.step),
            Some(report) => NotificationEvent::new(
                EventKind::RemediationFailed,
                Severity::Critical,
                &self.node,
                &self.reason,
                format!("{} ({})", report.error, self.outcome),
            )
            .with_step(&report.step),
        }
    }
}

/// Drain attempt settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainConfig {
    /// Grace period given to each evicted pod
    #[serde(with = "humantime_serde", default = "default_grace_period")]
    pub grace_period: Duration,

    /// Bound on the whole drain
    #[serde(with = "humantime_serde", default = "default_drain_timeout")]
    pub timeout: Duration,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
            timeout: default_drain_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForcedDrainConfig {
    #[serde(with = "humantime_serde", default = "default_forced_drain_timeout")]
    pub timeout: Duration,
}

impl Default for ForcedDrainConfig {
    fn default() -> Self {
        Self {
            timeout: default_forced_drain_timeout(),
        }
    }
}

/// Orchestrator timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationConfig {
    /// Bound on cordon, uncordon, action and read calls
    #[serde(with = "humantime_serde", default = "default_call_timeout")]
    pub call_timeout: Duration,

    /// Pause after cordon and after drain
    #[serde(with = "humantime_serde", default = "default_settle_wait")]
    pub settle_wait: Duration,

    #[serde(default)]
    pub drain: DrainConfig,

    #[serde(default)]
    pub forced_drain: ForcedDrainConfig,

    /// Wait after a reboot is acknowledged
    #[serde(with = "humantime_serde", default = "default_reboot_wait")]
    pub reboot_wait: Duration,

    /// Settle wait after a replacement is acknowledged
    #[serde(with = "humantime_serde", default = "default_replace_wait")]
    pub replace_wait: Duration,

    /// Wait after uncordon before reading state back
    #[serde(with = "humantime_serde", default = "default_verify_wait")]
    pub verify_wait: Duration,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            call_timeout: default_call_timeout(),
            settle_wait: default_settle_wait(),
            drain: DrainConfig::default(),
            forced_drain: ForcedDrainConfig::default(),
            reboot_wait: default_reboot_wait(),
            replace_wait: default_replace_wait(),
            verify_wait: default_verify_wait(),
        }
    }
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_settle_wait() -> Duration {
    Duration::from_secs(10)
}

fn default_grace_period() -> Duration {
    Duration::from_secs(60)
}

fn default_drain_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_forced_drain_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_reboot_wait() -> Duration {
    Duration::from_secs(300)
}

fn default_replace_wait() -> Duration {
    Duration::from_secs(30)
}

fn default_verify_wait() -> Duration {
    Duration::from_secs(30)
}

/// Run a remote call under a time bound
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, ControlError>>,
) -> Result<T, ControlError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(ControlError::Timeout(limit)))
}

/// Cycle bookkeeping
struct Cycle {
    result: RemediationResult,
    clock: tokio::time::Instant,
}

impl Cycle {
    fn new(node: Node, action: RemediationAction, reason: &str) -> Self {
        Self {
            result: RemediationResult::new(node, action, reason),
            clock: tokio::time::Instant::now(),
        }
    }

    fn node(&self) -> &Node {
        &self.result.node
    }

    fn enter(&mut self, state: RemediationState) {
        debug!(
            node = %self.result.node.name,
            from = %self.result.final_state(),
            to = %state,
            "Remediation state transition"
        );
        self.result.transitions.push(state);
    }

    fn record(&mut self, step: Step, started_at: DateTime<Utc>, status: StepStatus) {
        self.result.steps.push(StepRecord {
            step,
            status,
            started_at,
            finished_at: Utc::now(),
        });
    }
}

/// Remediation orchestrator
pub struct Orchestrator {
    store: Arc<dyn ExclusionStore>,
    nodes: Arc<dyn NodeController>,
    instances: Arc<dyn InstanceActions>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<MetricsRegistry>,
    config: RemediationConfig,
    exclusion_ttl: Option<Duration>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ExclusionStore>,
        nodes: Arc<dyn NodeController>,
        instances: Arc<dyn InstanceActions>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<MetricsRegistry>,
        config: RemediationConfig,
    ) -> Self {
        Self {
            store,
            nodes,
            instances,
            notifier,
            metrics,
            config,
            exclusion_ttl: None,
        }
    }

    /// Expire exclusions inserted by this orchestrator after `ttl`
    pub fn with_exclusion_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.exclusion_ttl = ttl;
        self
    }

    pub fn store(&self) -> &Arc<dyn ExclusionStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Remediate one node
    ///
    /// Returns `Err(AlreadyExcluded)` when another cycle owns the node and
    /// `Err(Exclusion)` when the store cannot be read or written. Every
    /// other path ends in `Ok` with the terminal outcome in the result.
    /// `RemediationAction::None` is a no-op.
    pub async fn run(
        &self,
        node: &Node,
        action: RemediationAction,
        reason: &str,
    ) -> Result<RemediationResult, RemediationError> {
        let mut cycle = Cycle::new(node.clone(), action, reason);

        if action == RemediationAction::None {
            debug!(node = %node.name, "No action decided, nothing to remediate");
            cycle.result.outcome = RemediationOutcome::Success;
            cycle.result.finished_at = Some(Utc::now());
            return Ok(cycle.result);
        }

        self.exclude(&mut cycle, self.exclusion_ttl).await?;

        info!(
            node = %node.name,
            instance = %node.instance_id,
            action = %action,
            reason = reason,
            "Starting remediation"
        );

        let driven = self.drive(&mut cycle).await;
        Ok(self.finish(cycle, driven).await)
    }

    /// Hold a node whose fault category is not understood
    ///
    /// The node is excluded without expiry, with reason
    /// `MANUAL_REVIEW_<category>`, and nothing is done to it.
    pub async fn hold_for_review(
        &self,
        record: &FaultRecord,
    ) -> Result<RemediationResult, RemediationError> {
        let reason = format!("MANUAL_REVIEW_{}", record.category);
        let mut cycle = Cycle::new(record.node.clone(), RemediationAction::None, &reason);

        self.exclude(&mut cycle, None).await?;

        let report = FailureReport::new(
            &record.node,
            REVIEW_STEP,
            format!("Unrecognized fault category '{}'", record.category),
        );
        error!(
            node = %report.node,
            instance = %report.instance,
            step = %report.step,
            error = %report.error,
            "Node held for manual review"
        );
        cycle.result.failure = Some(report);

        Ok(self
            .conclude(cycle, RemediationOutcome::ManualIntervention)
            .await)
    }

    async fn exclude(&self, cycle: &mut Cycle, ttl: Option<Duration>) -> Result<(), RemediationError> {
        cycle.enter(RemediationState::Excluding);

        let node = cycle.node();
        let entry = ExclusionEntry::new(&node.name, &cycle.result.reason)
            .with_instance(&node.instance_id)
            .with_ttl(ttl);

        exclusion::run_blocking(&self.store, move |store| store.insert(entry))
            .await
            .map_err(|e| {
                let err = RemediationError::from(e);
                match &err {
                    RemediationError::AlreadyExcluded { node } => {
                        debug!(node = %node, "Node owned by another remediation, skipping");
                    }
                    other => {
                        error!(node = %cycle.result.node.name, error = %other, "Exclusion store failure");
                    }
                }
                err
            })
    }

    async fn drive(&self, cycle: &mut Cycle) -> Result<(), RemediationError> {
        let node = cycle.node().clone();
        let action = cycle.result.action;

        cycle.enter(RemediationState::Cordoning);
        let started = Utc::now();
        let cordoned = bounded(self.config.call_timeout, self.nodes.cordon(&node.name)).await;
        self.note(cycle, Step::Cordon, started, &cordoned);
        if let Err(source) = cordoned {
            return Err(RemediationError::Cordon {
                node: node.name.clone(),
                source,
            });
        }
        info!(node = %node.name, "Node cordoned");
        self.pause(&node, "settle", self.config.settle_wait).await;

        self.drain(cycle, &node).await;
        self.pause(&node, "settle", self.config.settle_wait).await;

        cycle.enter(RemediationState::Acting);
        let started = Utc::now();
        let ack = match action {
            RemediationAction::Reboot => {
                bounded(self.config.call_timeout, self.instances.reboot(&node.instance_id)).await
            }
            RemediationAction::Replace => {
                bounded(self.config.call_timeout, self.instances.replace(&node.instance_id)).await
            }
            RemediationAction::None => Ok(()),
        };
        self.note(cycle, Step::Action, started, &ack);
        if let Err(source) = ack {
            return Err(RemediationError::Action {
                node: node.name.clone(),
                instance: node.instance_id.clone(),
                action,
                source,
            });
        }
        info!(node = %node.name, instance = %node.instance_id, action = %action, "Action acknowledged");

        if action == RemediationAction::Replace {
            self.pause(&node, "replacement settle", self.config.replace_wait)
                .await;
            // Replacement happens asynchronously on a new node.
            cycle.enter(RemediationState::Verifying);
            cycle.result.instance_state = UNKNOWN_STATE.to_string();
            cycle.result.node_ready = None;
            return Ok(());
        }

        self.pause(&node, "instance cycle", self.config.reboot_wait)
            .await;

        cycle.enter(RemediationState::Recovering);
        let started = Utc::now();
        let uncordoned = bounded(self.config.call_timeout, self.nodes.uncordon(&node.name)).await;
        self.note(cycle, Step::Uncordon, started, &uncordoned);
        if let Err(source) = uncordoned {
            return Err(RemediationError::Uncordon {
                node: node.name.clone(),
                source,
            });
        }
        info!(node = %node.name, "Node uncordoned");

        cycle.enter(RemediationState::Verifying);
        self.pause(&node, "scheduler settle", self.config.verify_wait)
            .await;
        self.verify(cycle, &node).await;

        Ok(())
    }

    /// Graceful drain, escalated once to a forced drain. Never fails the cycle.
    async fn drain(&self, cycle: &mut Cycle, node: &Node) {
        cycle.enter(RemediationState::Draining);
        let graceful = DrainOptions::graceful(
            self.config.drain.grace_period,
            self.config.drain.timeout,
        );
        let started = Utc::now();
        let drained = bounded(graceful.timeout, self.nodes.drain(&node.name, &graceful)).await;
        self.note(cycle, Step::Drain, started, &drained);

        let err = match drained {
            Ok(()) => {
                info!(node = %node.name, "Node drained");
                return;
            }
            Err(source) if source.is_timeout() => RemediationError::DrainTimeout {
                node: node.name.clone(),
                timeout: graceful.timeout,
            },
            Err(source) => RemediationError::DrainFailed {
                node: node.name.clone(),
                source,
            },
        };
        warn!(node = %node.name, error = %err, "Graceful drain failed, escalating to forced drain");

        cycle.enter(RemediationState::EscalatedDraining);
        let forced = DrainOptions::forced(self.config.forced_drain.timeout);
        let started = Utc::now();
        let drained = bounded(forced.timeout, self.nodes.drain(&node.name, &forced)).await;
        self.note(cycle, Step::ForcedDrain, started, &drained);

        match drained {
            Ok(()) => info!(node = %node.name, "Node drained (forced)"),
            Err(source) => {
                let err = RemediationError::DrainFailed {
                    node: node.name.clone(),
                    source,
                };
                error!(
                    node = %node.name,
                    error = %err,
                    "Forced drain failed, proceeding with action regardless"
                );
            }
        }
    }

    async fn verify(&self, cycle: &mut Cycle, node: &Node) {
        let started = Utc::now();
        let state = bounded(
            self.config.call_timeout,
            self.instances.read_state(&node.instance_id),
        )
        .await;
        let ready = bounded(self.config.call_timeout, self.nodes.read_ready(&node.name)).await;

        let mut problems = Vec::new();
        cycle.result.instance_state = match state {
            Ok(state) => state,
            Err(e) => {
                problems.push(format!("instance state: {}", e));
                UNKNOWN_STATE.to_string()
            }
        };
        cycle.result.node_ready = match ready {
            Ok(ready) => Some(ready),
            Err(e) => {
                problems.push(format!("node readiness: {}", e));
                None
            }
        };

        let status = if problems.is_empty() {
            StepStatus::Ok
        } else {
            let err = RemediationError::VerificationRead(problems.join("; "));
            warn!(node = %node.name, error = %err, "Verification incomplete, recording unknown");
            self.metrics.inc_step_failure(&Step::Verify.to_string());
            StepStatus::Failed(err.to_string())
        };
        cycle.record(Step::Verify, started, status);

        if cycle.result.node_ready == Some(false) {
            warn!(node = %node.name, "Node not Ready after remediation");
        }
        info!(
            node = %node.name,
            instance_state = %cycle.result.instance_state,
            node_ready = ?cycle.result.node_ready,
            "Verification complete"
        );
    }

    fn note<T>(
        &self,
        cycle: &mut Cycle,
        step: Step,
        started_at: DateTime<Utc>,
        result: &Result<T, ControlError>,
    ) {
        let status = StepStatus::of(result);
        if !status.is_ok() {
            self.metrics.inc_step_failure(&step.to_string());
        }
        cycle.record(step, started_at, status);
    }

    async fn pause(&self, node: &Node, what: &str, wait: Duration) {
        if wait.is_zero() {
            return;
        }
        debug!(node = %node.name, wait = ?wait, "Waiting for {}", what);
        tokio::time::sleep(wait).await;
    }

    async fn finish(
        &self,
        mut cycle: Cycle,
        driven: Result<(), RemediationError>,
    ) -> RemediationResult {
        let name = cycle.result.node.name.clone();
        let outcome = match driven {
            Ok(()) => {
                let node = name.clone();
                match exclusion::run_blocking(&self.store, move |store| store.remove(&node)).await {
                    Ok(_) => RemediationOutcome::Success,
                    Err(e) => {
                        let report = FailureReport::new(cycle.node(), "release", e.to_string());
                        error!(
                            node = %report.node,
                            error = %report.error,
                            "Remediation finished but exclusion could not be released"
                        );
                        cycle.result.failure = Some(report);
                        self.pin(&name).await;
                        RemediationOutcome::ManualIntervention
                    }
                }
            }
            Err(err) => {
                let outcome = match err {
                    RemediationError::Action { .. } => RemediationOutcome::Failed,
                    _ => RemediationOutcome::ManualIntervention,
                };
                if err.is_fatal() {
                    self.pin(&name).await;
                }
                let report = FailureReport::new(cycle.node(), err.step(), err.to_string());
                error!(
                    node = %report.node,
                    instance = %report.instance,
                    step = %report.step,
                    error = %report.error,
                    outcome = %outcome,
                    "Remediation stopped, node stays excluded"
                );
                cycle.result.failure = Some(report);
                outcome
            }
        };

        self.conclude(cycle, outcome).await
    }

    /// Keep the node excluded until an operator resumes it
    async fn pin(&self, name: &str) {
        let node = name.to_string();
        match exclusion::run_blocking(&self.store, move |store| store.pin(&node)).await {
            Ok(Some(_)) => {}
            Ok(None) => warn!(node = name, "No exclusion to pin"),
            Err(e) => error!(node = name, error = %e, "Failed to pin exclusion, it may expire"),
        }
    }

    async fn conclude(&self, mut cycle: Cycle, outcome: RemediationOutcome) -> RemediationResult {
        cycle.enter(RemediationState::Terminal(outcome));
        cycle.result.outcome = outcome;
        cycle.result.finished_at = Some(Utc::now());

        self.metrics.record_remediation(
            cycle.result.action,
            outcome,
            cycle.clock.elapsed().as_secs_f64(),
        );

        if outcome == RemediationOutcome::Success {
            info!(
                node = %cycle.result.node.name,
                action = %cycle.result.action,
                "Remediation succeeded, exclusion released"
            );
        }

        if let Err(e) = self.notifier.notify(&cycle.result.event()).await {
            warn!(node = %cycle.result.node.name, error = %e, "Failed to send notification");
        }

        cycle.result
    }
}
