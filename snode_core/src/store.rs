//! Process wide topology state: snode pool, swarms, onion paths, guard
//! set, message hash bookkeeping and fork info.
//!
//! All mutation funnels through [`NetworkTopologyStore`] behind one lock,
//! and every mutation is followed by a persist so a restart resumes from
//! the last good state instead of an empty cache. Failure counters are kept
//! in memory only and start from zero on every restart.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex as StdMutex;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::onion::path::OnionPath;
use crate::snode::Snode;

/// Consecutive failures after which a snode is evicted from the pool.
pub const SNODE_FAILURE_THRESHOLD: u32 = 3;
/// Failures after which a whole path is dropped and rebuilt.
pub const PATH_FAILURE_THRESHOLD: u32 = 3;

/// Hardfork/softfork version pair reported by the network. Ordered so that
/// a newer fork compares greater.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct ForkInfo {
    pub hard: u32,
    pub soft: u32,
}

/// The durable part of the topology state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub snode_pool: HashSet<Snode>,
    pub swarms: HashMap<String, HashSet<Snode>>,
    pub paths: Vec<OnionPath>,
    pub guard_snodes: HashSet<Snode>,
    /// Paging cursor per `(snode, public key, namespace)`.
    pub last_message_hashes: HashMap<String, String>,
    /// Seen message hashes per `(public key, namespace)`.
    pub received_message_hashes: HashMap<String, HashSet<String>>,
    pub fork_info: ForkInfo,
}

/// Where topology snapshots go between restarts.
pub trait TopologyPersistence: Send + Sync {
    /// Load the last saved snapshot, if any.
    fn load(&self) -> Option<TopologySnapshot>;
    /// Save a snapshot. Failures are logged, not propagated; losing a
    /// snapshot costs a re-bootstrap, nothing more.
    fn save(&self, snapshot: &TopologySnapshot);
}

/// JSON file backed persistence.
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FilePersistence { path: path.into() }
    }
}

impl TopologyPersistence for FilePersistence {
    fn load(&self) -> Option<TopologySnapshot> {
        let data = fs::read(&self.path).ok()?;
        match serde_json::from_slice(&data) {
            Ok(snapshot) => Some(snapshot),
            Err(error) => {
                warn!("Discarding unreadable topology snapshot: {}.", error);
                None
            }
        }
    }

    fn save(&self, snapshot: &TopologySnapshot) {
        let data = match serde_json::to_vec(snapshot) {
            Ok(data) => data,
            Err(error) => {
                error!("Couldn't serialize topology snapshot: {}.", error);
                return;
            }
        };
        // Write-then-rename so a crash mid-save can't truncate the old
        // snapshot.
        let tmp = self.path.with_extension("tmp");
        let result = fs::write(&tmp, data).and_then(|_| fs::rename(&tmp, &self.path));
        if let Err(error) = result {
            error!("Couldn't persist topology snapshot: {}.", error);
        }
    }
}

/// In-memory persistence, for tests and ephemeral clients.
#[derive(Default)]
pub struct MemoryPersistence {
    snapshot: StdMutex<Option<TopologySnapshot>>,
}

impl TopologyPersistence for MemoryPersistence {
    fn load(&self) -> Option<TopologySnapshot> {
        self.snapshot.lock().unwrap().clone()
    }

    fn save(&self, snapshot: &TopologySnapshot) {
        *self.snapshot.lock().unwrap() = Some(snapshot.clone());
    }
}

struct TopologyState {
    snapshot: TopologySnapshot,
    snode_failure_count: HashMap<Snode, u32>,
    path_failure_count: HashMap<OnionPath, u32>,
}

/// Owner of all shared topology state.
pub struct NetworkTopologyStore {
    state: RwLock<TopologyState>,
    persistence: Box<dyn TopologyPersistence>,
}

impl NetworkTopologyStore {
    /// Create a store, warm-started from whatever the persistence layer
    /// still has.
    pub fn new(persistence: Box<dyn TopologyPersistence>) -> Self {
        let snapshot = persistence.load().unwrap_or_default();
        NetworkTopologyStore {
            state: RwLock::new(TopologyState {
                snapshot,
                snode_failure_count: HashMap::new(),
                path_failure_count: HashMap::new(),
            }),
            persistence,
        }
    }

    /// A store that persists to memory only.
    pub fn in_memory() -> Self {
        Self::new(Box::<MemoryPersistence>::default())
    }

    fn persist(&self, state: &TopologyState) {
        self.persistence.save(&state.snapshot);
    }

    // region snode pool

    pub async fn snode_pool(&self) -> HashSet<Snode> {
        self.state.read().await.snapshot.snode_pool.clone()
    }

    pub async fn set_snode_pool(&self, pool: HashSet<Snode>) {
        let mut state = self.state.write().await;
        state.snapshot.snode_pool = pool;
        self.persist(&state);
    }

    /// Count one failure against `snode`. Returns true when the failure
    /// threshold was reached, in which case the snode has been evicted
    /// from the pool and its counter reset.
    pub async fn record_snode_failure(&self, snode: &Snode) -> bool {
        let mut state = self.state.write().await;
        let count = state.snode_failure_count.entry(snode.clone()).or_insert(0);
        *count += 1;
        let count = *count;
        debug!("Couldn't reach snode at {}; setting failure count to {}.", snode, count);
        if count < SNODE_FAILURE_THRESHOLD {
            return false;
        }
        debug!("Failure threshold reached for {}; dropping it.", snode);
        state.snode_failure_count.remove(snode);
        state.snapshot.snode_pool.remove(snode);
        self.persist(&state);
        true
    }

    /// Forget accumulated failures for `snode`.
    pub async fn reset_snode_failures(&self, snode: &Snode) {
        self.state.write().await.snode_failure_count.remove(snode);
    }

    // endregion

    // region swarms

    pub async fn swarm(&self, public_key: &str) -> Option<HashSet<Snode>> {
        self.state.read().await.snapshot.swarms.get(public_key).cloned()
    }

    pub async fn set_swarm(&self, public_key: &str, swarm: HashSet<Snode>) {
        let mut state = self.state.write().await;
        state.snapshot.swarms.insert(public_key.to_owned(), swarm);
        self.persist(&state);
    }

    /// Remove a snode from a cached swarm, e.g. after the network said the
    /// node is no longer associated with the key.
    pub async fn drop_snode_from_swarm(&self, public_key: &str, snode: &Snode) {
        let mut state = self.state.write().await;
        if let Some(swarm) = state.snapshot.swarms.get_mut(public_key) {
            if swarm.remove(snode) {
                self.persist(&state);
            }
        }
    }

    // endregion

    // region paths and guards

    pub async fn paths(&self) -> Vec<OnionPath> {
        self.state.read().await.snapshot.paths.clone()
    }

    pub async fn set_paths(&self, paths: Vec<OnionPath>) {
        let mut state = self.state.write().await;
        state.snapshot.paths = paths;
        self.persist(&state);
    }

    pub async fn guard_snodes(&self) -> HashSet<Snode> {
        self.state.read().await.snapshot.guard_snodes.clone()
    }

    pub async fn set_guard_snodes(&self, guards: HashSet<Snode>) {
        let mut state = self.state.write().await;
        state.snapshot.guard_snodes = guards;
        self.persist(&state);
    }

    pub async fn drop_guard_snode(&self, snode: &Snode) {
        let mut state = self.state.write().await;
        if state.snapshot.guard_snodes.remove(snode) {
            self.persist(&state);
        }
    }

    /// Count one failure against a whole path. Returns true when the path
    /// failure threshold was reached; the counter is reset and the caller
    /// is expected to drop the path.
    pub async fn record_path_failure(&self, path: &OnionPath) -> bool {
        let mut state = self.state.write().await;
        let count = state.path_failure_count.entry(path.clone()).or_insert(0);
        *count += 1;
        if *count < PATH_FAILURE_THRESHOLD {
            return false;
        }
        state.path_failure_count.remove(path);
        true
    }

    /// A request over `path` succeeded; clear its failure counter.
    pub async fn reset_path_failures(&self, path: &OnionPath) {
        self.state.write().await.path_failure_count.remove(path);
    }

    // endregion

    // region message hashes

    fn last_hash_key(snode: &Snode, public_key: &str, namespace: i32) -> String {
        format!("{}:{}:{}", snode.ed25519_key, public_key, namespace)
    }

    fn received_key(public_key: &str, namespace: i32) -> String {
        format!("{}:{}", public_key, namespace)
    }

    pub async fn last_message_hash(
        &self,
        snode: &Snode,
        public_key: &str,
        namespace: i32,
    ) -> Option<String> {
        let key = Self::last_hash_key(snode, public_key, namespace);
        self.state.read().await.snapshot.last_message_hashes.get(&key).cloned()
    }

    pub async fn set_last_message_hash(
        &self,
        snode: &Snode,
        public_key: &str,
        namespace: i32,
        hash: String,
    ) {
        let key = Self::last_hash_key(snode, public_key, namespace);
        let mut state = self.state.write().await;
        state.snapshot.last_message_hashes.insert(key, hash);
        self.persist(&state);
    }

    pub async fn received_message_hashes(
        &self,
        public_key: &str,
        namespace: i32,
    ) -> HashSet<String> {
        let key = Self::received_key(public_key, namespace);
        self.state
            .read()
            .await
            .snapshot
            .received_message_hashes
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn set_received_message_hashes(
        &self,
        public_key: &str,
        namespace: i32,
        hashes: HashSet<String>,
    ) {
        let key = Self::received_key(public_key, namespace);
        let mut state = self.state.write().await;
        state.snapshot.received_message_hashes.insert(key, hashes);
        self.persist(&state);
    }

    // endregion

    pub async fn fork_info(&self) -> ForkInfo {
        self.state.read().await.snapshot.fork_info
    }

    /// Update fork info if `new_fork_info` is newer than what we have.
    pub async fn update_fork_info(&self, new_fork_info: ForkInfo) {
        let mut state = self.state.write().await;
        if new_fork_info > state.snapshot.fork_info {
            debug!(
                "Setting new fork info new: {:?}, old: {:?}",
                new_fork_info, state.snapshot.fork_info
            );
            state.snapshot.fork_info = new_fork_info;
            self.persist(&state);
        } else if new_fork_info < state.snapshot.fork_info {
            warn!(
                "Got fork info {:?}, older than current known {:?}",
                new_fork_info, state.snapshot.fork_info
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onion::path::tests::{test_path, test_snode};

    #[tokio::test]
    async fn snode_eviction_threshold() {
        let store = NetworkTopologyStore::in_memory();
        let snode = test_snode(1);
        store.set_snode_pool([snode.clone(), test_snode(2)].into()).await;

        for _ in 0..SNODE_FAILURE_THRESHOLD - 1 {
            assert!(!store.record_snode_failure(&snode).await);
        }
        assert!(store.snode_pool().await.contains(&snode));

        assert!(store.record_snode_failure(&snode).await);
        assert!(!store.snode_pool().await.contains(&snode));

        // The counter was reset along with the eviction.
        assert!(!store.record_snode_failure(&snode).await);
    }

    #[tokio::test]
    async fn path_failure_threshold_and_reset() {
        let store = NetworkTopologyStore::in_memory();
        let path = test_path(1, 2, 3);

        for _ in 0..PATH_FAILURE_THRESHOLD - 1 {
            assert!(!store.record_path_failure(&path).await);
        }
        // A success in between resets the counter.
        store.reset_path_failures(&path).await;
        for _ in 0..PATH_FAILURE_THRESHOLD - 1 {
            assert!(!store.record_path_failure(&path).await);
        }
        assert!(store.record_path_failure(&path).await);
    }

    #[tokio::test]
    async fn swarm_member_removal_persists() {
        let store = NetworkTopologyStore::in_memory();
        let snode = test_snode(1);
        store
            .set_swarm("05aa", [snode.clone(), test_snode(2), test_snode(3)].into())
            .await;
        store.drop_snode_from_swarm("05aa", &snode).await;
        let swarm = store.swarm("05aa").await.unwrap();
        assert_eq!(swarm.len(), 2);
        assert!(!swarm.contains(&snode));
    }

    #[tokio::test]
    async fn fork_info_is_monotonic() {
        let store = NetworkTopologyStore::in_memory();
        store.update_fork_info(ForkInfo { hard: 18, soft: 1 }).await;
        store.update_fork_info(ForkInfo { hard: 17, soft: 9 }).await;
        assert_eq!(store.fork_info().await, ForkInfo { hard: 18, soft: 1 });
    }

    #[tokio::test]
    async fn snapshot_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.json");

        let store = NetworkTopologyStore::new(Box::new(FilePersistence::new(&path)));
        store.set_snode_pool([test_snode(1), test_snode(2)].into()).await;
        store.set_paths(vec![test_path(1, 2, 3)]).await;
        store
            .set_last_message_hash(&test_snode(1), "05aa", 0, "hash1".into())
            .await;
        drop(store);

        let reloaded = NetworkTopologyStore::new(Box::new(FilePersistence::new(&path)));
        assert_eq!(reloaded.snode_pool().await.len(), 2);
        assert_eq!(reloaded.paths().await, vec![test_path(1, 2, 3)]);
        assert_eq!(
            reloaded.last_message_hash(&test_snode(1), "05aa", 0).await.as_deref(),
            Some("hash1")
        );
    }
}
