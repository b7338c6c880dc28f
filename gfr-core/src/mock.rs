//! Mock capabilities for testing
//!
//! Each mock records the calls it receives and exposes switches to inject
//! failures and hangs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::classifier::{Classification, Classifier, ClassifierError};
use crate::collector::{CollectError, DiagnosticSnapshot, EvidenceCollector, MonitoredNode};
use crate::control::{ControlError, DrainOptions, InstanceActions, NodeController};
use crate::fault::{FaultCategory, Node};
use crate::notify::{NotificationEvent, Notifier, NotifyError};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Calls received by [`MockNodeController`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCall {
    Cordon(String),
    Drain { node: String, graceful: bool },
    Uncordon(String),
    ReadReady(String),
}

/// How a drain attempt behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainBehavior {
    Succeed,
    Fail,
    /// Never completes; the caller's timeout fires
    Hang,
}

/// Node controller with failure injection
pub struct MockNodeController {
    pub fail_cordon: AtomicBool,
    pub fail_uncordon: AtomicBool,
    pub fail_read_ready: AtomicBool,
    pub ready: AtomicBool,
    graceful_drain: Mutex<DrainBehavior>,
    forced_drain: Mutex<DrainBehavior>,
    calls: Mutex<Vec<NodeCall>>,
}

impl MockNodeController {
    pub fn new() -> Self {
        Self {
            fail_cordon: AtomicBool::new(false),
            fail_uncordon: AtomicBool::new(false),
            fail_read_ready: AtomicBool::new(false),
            ready: AtomicBool::new(true),
            graceful_drain: Mutex::new(DrainBehavior::Succeed),
            forced_drain: Mutex::new(DrainBehavior::Succeed),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_fail_cordon(&self, fail: bool) {
        self.fail_cordon.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_uncordon(&self, fail: bool) {
        self.fail_uncordon.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_read_ready(&self, fail: bool) {
        self.fail_read_ready.store(fail, Ordering::SeqCst);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_graceful_drain(&self, behavior: DrainBehavior) {
        *lock(&self.graceful_drain) = behavior;
    }

    pub fn set_forced_drain(&self, behavior: DrainBehavior) {
        *lock(&self.forced_drain) = behavior;
    }

    pub fn calls(&self) -> Vec<NodeCall> {
        lock(&self.calls).clone()
    }

    /// Number of drain attempts for a node
    pub fn drain_count(&self, node: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, NodeCall::Drain { node: n, .. } if n == node))
            .count()
    }

    pub fn cordon_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, NodeCall::Cordon(_)))
            .count()
    }

    fn record(&self, call: NodeCall) {
        lock(&self.calls).push(call);
    }
}

impl Default for MockNodeController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeController for MockNodeController {
    async fn cordon(&self, node: &str) -> Result<(), ControlError> {
        self.record(NodeCall::Cordon(node.to_string()));
        if self.fail_cordon.load(Ordering::SeqCst) {
            return Err(ControlError::Api("simulated cordon failure".to_string()));
        }
        Ok(())
    }

    async fn drain(&self, node: &str, options: &DrainOptions) -> Result<(), ControlError> {
        self.record(NodeCall::Drain {
            node: node.to_string(),
            graceful: options.graceful,
        });

        let behavior = if options.graceful {
            *lock(&self.graceful_drain)
        } else {
            *lock(&self.forced_drain)
        };

        match behavior {
            DrainBehavior::Succeed => Ok(()),
            DrainBehavior::Fail => Err(ControlError::Api("simulated drain failure".to_string())),
            DrainBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    async fn uncordon(&self, node: &str) -> Result<(), ControlError> {
        self.record(NodeCall::Uncordon(node.to_string()));
        if self.fail_uncordon.load(Ordering::SeqCst) {
            return Err(ControlError::Api("simulated uncordon failure".to_string()));
        }
        Ok(())
    }

    async fn read_ready(&self, node: &str) -> Result<bool, ControlError> {
        self.record(NodeCall::ReadReady(node.to_string()));
        if self.fail_read_ready.load(Ordering::SeqCst) {
            return Err(ControlError::Api("simulated read failure".to_string()));
        }
        Ok(self.ready.load(Ordering::SeqCst))
    }
}

/// Calls received by [`MockInstanceActions`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceCall {
    Reboot(String),
    Replace(String),
    ReadState(String),
}

/// Instance executor with failure injection
pub struct MockInstanceActions {
    pub fail_reboot: AtomicBool,
    pub fail_replace: AtomicBool,
    pub fail_read_state: AtomicBool,
    state: Mutex<String>,
    calls: Mutex<Vec<InstanceCall>>,
}

impl MockInstanceActions {
    pub fn new() -> Self {
        Self {
            fail_reboot: AtomicBool::new(false),
            fail_replace: AtomicBool::new(false),
            fail_read_state: AtomicBool::new(false),
            state: Mutex::new("running".to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_fail_reboot(&self, fail: bool) {
        self.fail_reboot.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_replace(&self, fail: bool) {
        self.fail_replace.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_read_state(&self, fail: bool) {
        self.fail_read_state.store(fail, Ordering::SeqCst);
    }

    pub fn set_state(&self, state: &str) {
        *lock(&self.state) = state.to_string();
    }

    pub fn calls(&self) -> Vec<InstanceCall> {
        lock(&self.calls).clone()
    }

    fn record(&self, call: InstanceCall) {
        lock(&self.calls).push(call);
    }
}

impl Default for MockInstanceActions {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstanceActions for MockInstanceActions {
    async fn reboot(&self, instance_id: &str) -> Result<(), ControlError> {
        self.record(InstanceCall::Reboot(instance_id.to_string()));
        if self.fail_reboot.load(Ordering::SeqCst) {
            return Err(ControlError::Command("simulated reboot failure".to_string()));
        }
        Ok(())
    }

    async fn replace(&self, instance_id: &str) -> Result<(), ControlError> {
        self.record(InstanceCall::Replace(instance_id.to_string()));
        if self.fail_replace.load(Ordering::SeqCst) {
            return Err(ControlError::Command("simulated replace failure".to_string()));
        }
        Ok(())
    }

    async fn read_state(&self, instance_id: &str) -> Result<String, ControlError> {
        self.record(InstanceCall::ReadState(instance_id.to_string()));
        if self.fail_read_state.load(Ordering::SeqCst) {
            return Err(ControlError::Command("simulated describe failure".to_string()));
        }
        Ok(lock(&self.state).clone())
    }
}

/// Classifier answering from a fixed table keyed by node name
///
/// Nodes without an entry are classified HEALTHY.
pub struct StaticClassifier {
    verdicts: Mutex<HashMap<String, Classification>>,
    unavailable: Mutex<HashSet<String>>,
    calls: AtomicU32,
}

impl StaticClassifier {
    pub fn new() -> Self {
        Self {
            verdicts: Mutex::new(HashMap::new()),
            unavailable: Mutex::new(HashSet::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_verdict(self, node: &str, tag: &str) -> Self {
        self.set_verdict(node, Classification::new(FaultCategory::parse(tag)));
        self
    }

    pub fn set_verdict(&self, node: &str, verdict: Classification) {
        lock(&self.verdicts).insert(node.to_string(), verdict);
    }

    /// Make classification of `node` fail as unavailable
    pub fn with_unavailable(self, node: &str) -> Self {
        lock(&self.unavailable).insert(node.to_string());
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for StaticClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Classifier for StaticClassifier {
    async fn classify(
        &self,
        node: &Node,
        _evidence: &str,
    ) -> Result<Classification, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if lock(&self.unavailable).contains(&node.name) {
            return Err(ClassifierError::Unavailable("simulated outage".to_string()));
        }

        Ok(lock(&self.verdicts)
            .get(&node.name)
            .cloned()
            .unwrap_or_else(Classification::healthy))
    }
}

/// Collector serving a fixed node list
pub struct StaticCollector {
    nodes: Vec<Node>,
    pub fail_discovery: AtomicBool,
    failing: Mutex<HashSet<String>>,
    collected: Mutex<Vec<String>>,
}

impl StaticCollector {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes,
            fail_discovery: AtomicBool::new(false),
            failing: Mutex::new(HashSet::new()),
            collected: Mutex::new(Vec::new()),
        }
    }

    pub fn set_fail_discovery(&self, fail: bool) {
        self.fail_discovery.store(fail, Ordering::SeqCst);
    }

    /// Make collection from `node` fail
    pub fn with_failing(self, node: &str) -> Self {
        lock(&self.failing).insert(node.to_string());
        self
    }

    /// Node names collected from, in order
    pub fn collected(&self) -> Vec<String> {
        lock(&self.collected).clone()
    }
}

#[async_trait]
impl EvidenceCollector for StaticCollector {
    async fn list_nodes(&self) -> Result<Vec<MonitoredNode>, CollectError> {
        if self.fail_discovery.load(Ordering::SeqCst) {
            return Err(CollectError::Discovery("simulated discovery failure".to_string()));
        }

        Ok(self
            .nodes
            .iter()
            .map(|node| MonitoredNode {
                node: node.clone(),
                source: format!("mock://{}", node.name),
            })
            .collect())
    }

    async fn collect(&self, target: &MonitoredNode) -> Result<DiagnosticSnapshot, CollectError> {
        let name = target.node.name.clone();
        lock(&self.collected).push(name.clone());

        if lock(&self.failing).contains(&name) {
            return Err(CollectError::Fetch {
                node: name,
                message: "simulated scrape failure".to_string(),
            });
        }

        Ok(DiagnosticSnapshot::new(
            target.node.clone(),
            format!("=== NODE_INFO ===\nNode: {}\n", name),
        ))
    }
}

/// Notifier that keeps every event it receives
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        lock(&self.events).clone()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        lock(&self.events).push(event.clone());
        Ok(())
    }
}
