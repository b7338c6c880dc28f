//! Exclusion Store
//!
//! Persistent dedup ledger of nodes currently owned by a remediation (or
//! held for manual review). `insert` is the exclusivity gate: it is a
//! compare-and-insert, so at most one live entry exists per node.
//!
//! Every operation loads, changes and saves the file while holding a
//! sidecar lock file (`<ledger>.lock`, created with `O_EXCL`), so a running
//! monitor, the `reboot`/`replace` entrypoints and the `exclusions`
//! subcommands share one ledger safely. Writes go to a per-write temporary
//! file and are renamed into place.
//!
//! Store calls do blocking file IO. Async callers go through
//! [`run_blocking`].
//!
//! Persisted format:
//!
//! ```json
//! {
//!   "gpu-03": {
//!     "reason": "XID_CRITICAL_79",
//!     "insertedAt": "2025-07-04T15:16:22Z",
//!     "expiresAt": "2025-07-04T21:16:22Z",
//!     "instanceId": "i-0f7e9fd6fa5227c7c"
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// How long a lock file may sit untouched before its holder is presumed dead
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(10);

const LOCK_RETRY: Duration = Duration::from_millis(5);

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// A live (or expired, not yet swept) exclusion for one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionEntry {
    pub node: String,
    pub reason: String,
    pub instance_id: Option<String>,
    pub inserted_at: DateTime<Utc>,
    /// None = never expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl ExclusionEntry {
    pub fn new(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            reason: reason.into(),
            instance_id: None,
            inserted_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn with_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    /// Set expiry relative to `inserted_at`
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| self.inserted_at + ttl);
        self
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires| now < expires)
    }

    /// Time left before expiry; None if the entry never expires
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at
            .map(|expires| (expires - now).to_std().unwrap_or(Duration::ZERO))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedEntry {
    reason: String,
    inserted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instance_id: Option<String>,
}

impl PersistedEntry {
    fn into_entry(self, node: String) -> ExclusionEntry {
        ExclusionEntry {
            node,
            reason: self.reason,
            instance_id: self.instance_id,
            inserted_at: self.inserted_at,
            expires_at: self.expires_at,
        }
    }
}

impl From<&ExclusionEntry> for PersistedEntry {
    fn from(entry: &ExclusionEntry) -> Self {
        Self {
            reason: entry.reason.clone(),
            inserted_at: entry.inserted_at,
            expires_at: entry.expires_at,
            instance_id: entry.instance_id.clone(),
        }
    }
}

/// Errors from the exclusion store
#[derive(Debug, Error)]
pub enum ExclusionError {
    /// Another remediation already owns this node
    #[error("Node {node} is already excluded: {reason}")]
    AlreadyExcluded { node: String, reason: String },

    #[error("Exclusion store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Exclusion store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Exclusion store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Shared dedup ledger
///
/// The only cross-node, cross-cycle mutable state in the system.
pub trait ExclusionStore: Send + Sync {
    /// Whether a live entry exists for the node
    fn is_excluded(&self, node: &str) -> Result<bool, ExclusionError>;

    /// Live entry for the node, if any
    fn get(&self, node: &str) -> Result<Option<ExclusionEntry>, ExclusionError>;

    /// Compare-and-insert. Fails with `AlreadyExcluded` if a live entry exists;
    /// an expired entry is replaced.
    fn insert(&self, entry: ExclusionEntry) -> Result<(), ExclusionError>;

    /// Remove the node's entry; no-op if absent
    fn remove(&self, node: &str) -> Result<Option<ExclusionEntry>, ExclusionError>;

    /// All live entries, oldest first
    fn list_live(&self) -> Result<Vec<ExclusionEntry>, ExclusionError>;

    /// Remove entries expired at `now`, returning them
    fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<ExclusionEntry>, ExclusionError>;

    /// Clear the node's expiry so only an operator can release it.
    /// Returns the pinned entry, or None if the node has no entry.
    fn pin(&self, node: &str) -> Result<Option<ExclusionEntry>, ExclusionError>;
}

/// Run a store operation on the blocking thread pool
pub async fn run_blocking<T, F>(
    store: &Arc<dyn ExclusionStore>,
    op: F,
) -> Result<T, ExclusionError>
where
    T: Send + 'static,
    F: FnOnce(&dyn ExclusionStore) -> Result<T, ExclusionError> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || op(store.as_ref())).await?
}

/// Cross-process guard on the ledger, released on drop
struct LedgerLock {
    path: PathBuf,
}

impl LedgerLock {
    fn acquire(path: PathBuf, stale_after: Duration) -> Result<Self, ExclusionError> {
        let started = Instant::now();
        loop {
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    // Holder pid, for whoever finds a leftover lock.
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if lock_age(&path).map_or(false, |age| age > stale_after) {
                        warn!(
                            path = ?path,
                            waited = ?started.elapsed(),
                            "Breaking stale exclusion ledger lock"
                        );
                        match fs::remove_file(&path) {
                            Ok(()) => continue,
                            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                            Err(e) => return Err(e.into()),
                        }
                    }
                    std::thread::sleep(LOCK_RETRY);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = ?self.path, error = %e, "Failed to release exclusion ledger lock");
        }
    }
}

fn lock_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    SystemTime::now().duration_since(modified).ok()
}

/// JSON-file backed exclusion store
pub struct FileExclusionStore {
    path: PathBuf,
    lock: Mutex<()>,
    lock_wait: Duration,
}

impl FileExclusionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    /// Age after which another holder's lock file is treated as abandoned
    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        sibling(&self.path, "lock")
    }

    /// Run `f` with exclusive access to the ledger contents
    fn with_ledger<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, ExclusionEntry>) -> Result<(T, bool), ExclusionError>,
    ) -> Result<T, ExclusionError> {
        // The guard protects no data, so a poisoned lock is still usable.
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.ensure_parent()?;
        let _file_lock = LedgerLock::acquire(self.lock_path(), self.lock_wait)?;

        let mut ledger = self.load()?;
        let (value, dirty) = f(&mut ledger)?;
        if dirty {
            self.save(&ledger)?;
        }
        Ok(value)
    }

    fn load(&self) -> Result<BTreeMap<String, ExclusionEntry>, ExclusionError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                // Nothing can be attributed to a node; keep the file for review.
                let aside = self.path.with_extension("corrupt");
                error!(
                    path = ?self.path,
                    moved_to = ?aside,
                    error = %e,
                    "Exclusion ledger unreadable, starting empty"
                );
                fs::rename(&self.path, &aside)?;
                return Ok(BTreeMap::new());
            }
        };

        let mut ledger = BTreeMap::new();
        for (node, value) in raw {
            match serde_json::from_value::<PersistedEntry>(value) {
                Ok(persisted) => {
                    ledger.insert(node.clone(), persisted.into_entry(node));
                }
                Err(e) => {
                    error!(node = %node, error = %e, "Dropping unreadable exclusion entry");
                }
            }
        }

        Ok(ledger)
    }

    fn ensure_parent(&self) -> Result<(), ExclusionError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    fn save(&self, ledger: &BTreeMap<String, ExclusionEntry>) -> Result<(), ExclusionError> {
        let persisted: BTreeMap<&str, PersistedEntry> = ledger
            .iter()
            .map(|(node, entry)| (node.as_str(), PersistedEntry::from(entry)))
            .collect();

        let bytes = serde_json::to_vec_pretty(&persisted)?;
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp_path = sibling(&self.path, &format!("{}.{}.tmp", std::process::id(), seq));
        if let Err(e) = fs::write(&tmp_path, bytes).and_then(|()| fs::rename(&tmp_path, &self.path)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

/// `<dir>/<file name>.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

impl ExclusionStore for FileExclusionStore {
    fn is_excluded(&self, node: &str) -> Result<bool, ExclusionError> {
        Ok(self.get(node)?.is_some())
    }

    fn get(&self, node: &str) -> Result<Option<ExclusionEntry>, ExclusionError> {
        let now = Utc::now();
        self.with_ledger(|ledger| {
            let entry = ledger.get(node).filter(|e| e.is_live(now)).cloned();
            Ok((entry, false))
        })
    }

    fn insert(&self, entry: ExclusionEntry) -> Result<(), ExclusionError> {
        let now = Utc::now();
        self.with_ledger(|ledger| {
            if let Some(existing) = ledger.get(&entry.node) {
                if existing.is_live(now) {
                    return Err(ExclusionError::AlreadyExcluded {
                        node: entry.node.clone(),
                        reason: existing.reason.clone(),
                    });
                }
                debug!(node = %entry.node, "Replacing expired exclusion");
            }

            info!(
                node = %entry.node,
                reason = %entry.reason,
                expires_at = ?entry.expires_at,
                "Node excluded"
            );
            ledger.insert(entry.node.clone(), entry);
            Ok(((), true))
        })
    }

    fn remove(&self, node: &str) -> Result<Option<ExclusionEntry>, ExclusionError> {
        self.with_ledger(|ledger| {
            let removed = ledger.remove(node);
            match &removed {
                Some(_) => info!(node = node, "Exclusion removed"),
                None => debug!(node = node, "No exclusion to remove"),
            }
            let dirty = removed.is_some();
            Ok((removed, dirty))
        })
    }

    fn list_live(&self) -> Result<Vec<ExclusionEntry>, ExclusionError> {
        let now = Utc::now();
        self.with_ledger(|ledger| {
            let mut live: Vec<ExclusionEntry> = ledger
                .values()
                .filter(|e| e.is_live(now))
                .cloned()
                .collect();
            live.sort_by_key(|e| e.inserted_at);
            Ok((live, false))
        })
    }

    fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<ExclusionEntry>, ExclusionError> {
        self.with_ledger(|ledger| {
            let expired: Vec<String> = ledger
                .iter()
                .filter(|(_, e)| !e.is_live(now))
                .map(|(node, _)| node.clone())
                .collect();

            let removed: Vec<ExclusionEntry> = expired
                .iter()
                .filter_map(|node| ledger.remove(node))
                .collect();

            for entry in &removed {
                warn!(
                    node = %entry.node,
                    reason = %entry.reason,
                    inserted_at = %entry.inserted_at,
                    "Exclusion expired, node returns to monitoring"
                );
            }

            let dirty = !removed.is_empty();
            Ok((removed, dirty))
        })
    }

    fn pin(&self, node: &str) -> Result<Option<ExclusionEntry>, ExclusionError> {
        self.with_ledger(|ledger| {
            let Some(entry) = ledger.get_mut(node) else {
                return Ok((None, false));
            };
            let dirty = entry.expires_at.take().is_some();
            if dirty {
                info!(node = node, reason = %entry.reason, "Exclusion pinned until released by an operator");
            }
            Ok((Some(entry.clone()), dirty))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn store_in(dir: &tempfile::TempDir) -> FileExclusionStore {
        FileExclusionStore::new(dir.path().join("state").join("exclusions.json"))
    }

    #[test]
    fn test_insert_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.insert(ExclusionEntry::new("gpu-05", "XID_CRITICAL_79")).unwrap();
        let second = store.insert(ExclusionEntry::new("gpu-05", "ECC_ERROR"));
        assert!(matches!(
            second,
            Err(ExclusionError::AlreadyExcluded { ref reason, .. }) if reason == "XID_CRITICAL_79"
        ));
        assert!(store.is_excluded("gpu-05").unwrap());
        assert!(!store.is_excluded("gpu-06").unwrap());
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        assert!(store.remove("gpu-01").unwrap().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_concurrent_inserts_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(&dir));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .insert(ExclusionEntry::new("gpu-05", format!("cycle-{i}")))
                        .is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_separate_stores_on_one_file_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("exclusions.json");
        let stores = [
            Arc::new(FileExclusionStore::new(path.clone())),
            Arc::new(FileExclusionStore::new(path.clone())),
        ];

        for round in 0..200 {
            let node = format!("gpu-{round}");
            let barrier = Arc::new(std::sync::Barrier::new(stores.len()));
            let handles: Vec<_> = stores
                .iter()
                .map(|store| {
                    let store = store.clone();
                    let barrier = barrier.clone();
                    let node = node.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        store.insert(ExclusionEntry::new(node, "XID_CRITICAL_79")).is_ok()
                    })
                })
                .collect();

            let winners = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(winners, 1, "round {round}");
        }

        assert_eq!(stores[0].list_live().unwrap().len(), 200);
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|name| name != "exclusions.json")
            .collect();
        assert!(leftovers.is_empty(), "unexpected files: {leftovers:?}");
    }

    #[test]
    fn test_abandoned_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).with_lock_wait(Duration::from_millis(50));
        let lock = store.lock_path();
        fs::create_dir_all(lock.parent().unwrap()).unwrap();
        fs::write(&lock, "4242\n").unwrap();

        store.insert(ExclusionEntry::new("gpu-01", "ECC_ERROR")).unwrap();
        assert!(store.is_excluded("gpu-01").unwrap());
        assert!(!lock.exists());
    }

    #[test]
    fn test_pin_clears_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .insert(ExclusionEntry::new("gpu-02", "XID_CRITICAL_79").with_ttl(Some(Duration::from_secs(60))))
            .unwrap();

        let pinned = store.pin("gpu-02").unwrap().unwrap();
        assert!(pinned.expires_at.is_none());
        assert!(store.pin("gpu-09").unwrap().is_none());

        let removed = store.sweep(Utc::now() + chrono::Duration::days(2)).unwrap();
        assert!(removed.is_empty());
        assert!(store_in(&dir).is_excluded("gpu-02").unwrap());
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ExclusionStore> = Arc::new(store_in(&dir));

        run_blocking(&store, |s| s.insert(ExclusionEntry::new("gpu-04", "ECC_ERROR")))
            .await
            .unwrap();
        let excluded = run_blocking(&store, |s| s.is_excluded("gpu-04")).await.unwrap();
        assert!(excluded);
    }

    #[test]
    fn test_round_trip_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![
            ExclusionEntry::new("gpu-03", "XID_CRITICAL_79")
                .with_instance("i-03")
                .with_ttl(Some(Duration::from_secs(3600))),
            ExclusionEntry::new("gpu-07", "ECC_ERROR"),
            ExclusionEntry::new("gpu-11", "MANUAL_PAUSE").with_instance("i-11"),
        ];

        {
            let store = store_in(&dir);
            for entry in &entries {
                store.insert(entry.clone()).unwrap();
            }
        }

        let reloaded = store_in(&dir);
        let live: HashSet<_> = reloaded
            .list_live()
            .unwrap()
            .into_iter()
            .map(|e| serde_json::to_string(&e).unwrap())
            .collect();
        let expected: HashSet<_> = entries
            .iter()
            .map(|e| serde_json::to_string(e).unwrap())
            .collect();
        assert_eq!(live, expected);
    }

    #[test]
    fn test_persisted_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .insert(ExclusionEntry::new("gpu-03", "XID_CRITICAL_79").with_instance("i-03"))
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        let entry = &raw["gpu-03"];
        assert_eq!(entry["reason"], "XID_CRITICAL_79");
        assert_eq!(entry["instanceId"], "i-03");
        assert!(entry["insertedAt"].is_string());
        assert!(entry.get("expiresAt").is_none());
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .insert(ExclusionEntry::new("short", "A").with_ttl(Some(Duration::from_secs(60))))
            .unwrap();
        store
            .insert(ExclusionEntry::new("long", "B").with_ttl(Some(Duration::from_secs(7200))))
            .unwrap();
        store.insert(ExclusionEntry::new("forever", "C")).unwrap();

        let later = Utc::now() + chrono::Duration::minutes(10);
        let removed = store.sweep(later).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].node, "short");

        let mut nodes: Vec<_> = store.list_live().unwrap().into_iter().map(|e| e.node).collect();
        nodes.sort();
        assert_eq!(nodes, vec!["forever", "long"]);
    }

    #[test]
    fn test_expired_entry_can_be_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut stale = ExclusionEntry::new("gpu-01", "OLD");
        stale.inserted_at = Utc::now() - chrono::Duration::hours(2);
        let stale = stale.with_ttl(Some(Duration::from_secs(60)));
        store.insert(stale).unwrap();

        assert!(!store.is_excluded("gpu-01").unwrap());
        store.insert(ExclusionEntry::new("gpu-01", "NEW")).unwrap();
        assert_eq!(store.get("gpu-01").unwrap().unwrap().reason, "NEW");
    }

    #[test]
    fn test_corrupt_entry_dropped_others_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(
            store.path(),
            r#"{
                "gpu-01": {"reason": "XID_ERROR", "insertedAt": "2025-07-04T15:16:22Z"},
                "gpu-02": {"reason": 17},
                "gpu-03": {"reason": "ECC_ERROR", "insertedAt": "not-a-date"}
            }"#,
        )
        .unwrap();

        let live = store.list_live().unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].node, "gpu-01");
        assert!(store.is_excluded("gpu-01").unwrap());
        assert!(!store.is_excluded("gpu-02").unwrap());
    }

    #[test]
    fn test_unparseable_file_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{ not json").unwrap();

        assert!(store.list_live().unwrap().is_empty());
        assert!(store.path().with_extension("corrupt").exists());

        store.insert(ExclusionEntry::new("gpu-01", "ECC_ERROR")).unwrap();
        assert!(store.is_excluded("gpu-01").unwrap());
    }

    #[test]
    fn test_remaining() {
        let entry = ExclusionEntry::new("gpu-01", "A").with_ttl(Some(Duration::from_secs(600)));
        let remaining = entry.remaining(entry.inserted_at).unwrap();
        assert_eq!(remaining, Duration::from_secs(600));
        let past = entry.inserted_at + chrono::Duration::hours(1);
        assert_eq!(entry.remaining(past), Some(Duration::ZERO));
        assert!(ExclusionEntry::new("n", "r").remaining(Utc::now()).is_none());
    }
}
