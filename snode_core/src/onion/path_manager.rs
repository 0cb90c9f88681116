//! Path lifecycle: building, selecting, repairing and dropping onion paths.

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::IteratorRandom;
use rand::thread_rng;
use tokio::sync::Mutex;

use crate::directory::SnodeDirectory;
use crate::error::Error;
use crate::onion::path::OnionPath;
use crate::snode::Snode;
use crate::store::NetworkTopologyStore;

/// Number of paths kept alive. Doubles as the guard snode count since every
/// path has its own guard.
pub const TARGET_PATH_COUNT: usize = 2;

/// Error message prefix a snode reports when it can't reach the next hop.
const NEXT_NODE_NOT_FOUND_PREFIX: &str = "Next node not found: ";

/// Owns the path set. Requests borrow a path through [`path_excluding`];
/// transport failures come back through [`register_failure`] so the manager
/// can repair a single hop or tear the whole path down.
///
/// [`path_excluding`]: PathManager::path_excluding
/// [`register_failure`]: PathManager::register_failure
pub struct PathManager {
    store: Arc<NetworkTopologyStore>,
    directory: Arc<SnodeDirectory>,
    /// Serializes path building so concurrent requests don't each build
    /// their own set.
    build_lock: Mutex<()>,
}

impl PathManager {
    pub fn new(store: Arc<NetworkTopologyStore>, directory: Arc<SnodeDirectory>) -> Self {
        PathManager {
            store,
            directory,
            build_lock: Mutex::new(()),
        }
    }

    /// A random path that doesn't contain `excluding`, building the path
    /// set first if it fell below the target count.
    pub async fn path_excluding(&self, excluding: Option<&Snode>) -> Result<OnionPath, Error> {
        let paths = self.ensure_paths().await?;
        paths
            .iter()
            .filter(|path| excluding.map_or(true, |snode| !path.contains(snode)))
            .choose(&mut thread_rng())
            .cloned()
            .ok_or(Error::InsufficientSnodes)
    }

    async fn ensure_paths(&self) -> Result<Vec<OnionPath>, Error> {
        let paths = self.store.paths().await;
        if paths.len() >= TARGET_PATH_COUNT {
            return Ok(paths);
        }
        let _guard = self.build_lock.lock().await;
        // Someone else may have finished building while we waited.
        let paths = self.store.paths().await;
        if paths.len() >= TARGET_PATH_COUNT {
            return Ok(paths);
        }
        self.build_paths(paths).await
    }

    async fn build_paths(&self, mut paths: Vec<OnionPath>) -> Result<Vec<OnionPath>, Error> {
        info!("Building onion paths.");
        // Ensures the pool is populated before we draw from it.
        self.directory.random_snode().await?;
        let pool = self.store.snode_pool().await;
        let known_guards = self.store.guard_snodes().await;

        let mut used: HashSet<Snode> = paths
            .iter()
            .flat_map(|path| path.nodes().iter().cloned())
            .collect();
        while paths.len() < TARGET_PATH_COUNT {
            // Prefer a guard that already proved itself.
            let guard = known_guards
                .iter()
                .filter(|snode| !used.contains(*snode) && pool.contains(*snode))
                .choose(&mut thread_rng())
                .or_else(|| {
                    pool.iter()
                        .filter(|snode| !used.contains(*snode))
                        .choose(&mut thread_rng())
                })
                .cloned()
                .ok_or(Error::InsufficientSnodes)?;
            used.insert(guard.clone());
            let mut relays = Vec::with_capacity(2);
            for _ in 0..2 {
                let relay = pool
                    .iter()
                    .filter(|snode| !used.contains(*snode))
                    .choose(&mut thread_rng())
                    .cloned()
                    .ok_or(Error::InsufficientSnodes)?;
                used.insert(relay.clone());
                relays.push(relay);
            }
            let path = OnionPath::new([guard, relays.remove(0), relays.remove(0)]);
            debug!("Built new onion path: {:?}.", path);
            paths.push(path);
        }

        self.store.set_paths(paths.clone()).await;
        self.sync_guards(&paths).await;
        Ok(paths)
    }

    async fn sync_guards(&self, paths: &[OnionPath]) {
        let guards = paths.iter().map(|path| path.guard().clone()).collect();
        self.store.set_guard_snodes(guards).await;
    }

    /// Record a successful round trip over `path`.
    pub async fn register_success(&self, path: &OnionPath) {
        self.store.reset_path_failures(path).await;
        for snode in path.nodes() {
            self.store.reset_snode_failures(snode).await;
        }
    }

    /// Record a failed round trip over `path`. When the guard reported
    /// which hop failed, only that hop is penalized and eventually swapped
    /// out; otherwise the failure counts against the path as a whole.
    pub async fn register_failure(&self, path: &OnionPath, message: Option<&str>) {
        if let Some(ed25519_key) =
            message.and_then(|message| message.strip_prefix(NEXT_NODE_NOT_FOUND_PREFIX))
        {
            if let Some(index) = path.position_of_key(ed25519_key.trim()) {
                let snode = path.nodes()[index].clone();
                debug!("Unreachable snode on path: {}.", snode);
                let evicted = self.store.record_snode_failure(&snode).await;
                if evicted {
                    self.repair_path(path, index).await;
                }
                return;
            }
        }

        let exhausted = self.store.record_path_failure(path).await;
        if exhausted {
            warn!("Onion path failed too many times, dropping it.");
            self.store.drop_guard_snode(path.guard()).await;
            for snode in path.nodes() {
                self.directory.record_bad_snode(snode, None).await;
            }
            self.drop_path(path).await;
        }
    }

    /// Swap the hop at `index` for an unused snode, keeping the rest of the
    /// path intact. Falls back to dropping the path when the pool has no
    /// spare.
    async fn repair_path(&self, path: &OnionPath, index: usize) {
        let pool = self.store.snode_pool().await;
        let paths = self.store.paths().await;
        let used: HashSet<&Snode> = paths.iter().flat_map(OnionPath::nodes).collect();
        let replacement = pool
            .iter()
            .filter(|snode| !used.contains(*snode))
            .choose(&mut thread_rng())
            .cloned();
        match replacement {
            Some(replacement) => {
                debug!("Replacing path hop with: {}.", replacement);
                let repaired = path.with_replacement(index, replacement);
                let updated: Vec<OnionPath> = paths
                    .into_iter()
                    .map(|existing| if &existing == path { repaired.clone() } else { existing })
                    .collect();
                self.store.set_paths(updated.clone()).await;
                self.sync_guards(&updated).await;
            }
            None => self.drop_path(path).await,
        }
    }

    async fn drop_path(&self, path: &OnionPath) {
        let remaining: Vec<OnionPath> = self
            .store
            .paths()
            .await
            .into_iter()
            .filter(|existing| existing != path)
            .collect();
        self.store.set_paths(remaining.clone()).await;
        self.sync_guards(&remaining).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onion::path::tests::{test_path, test_snode};
    use crate::onion::path::PATH_SIZE;
    use crate::store::{PATH_FAILURE_THRESHOLD, SNODE_FAILURE_THRESHOLD};

    fn manager(store: Arc<NetworkTopologyStore>) -> PathManager {
        let directory = Arc::new(SnodeDirectory::new(
            store.clone(),
            reqwest::Client::new(),
            false,
        ));
        PathManager::new(store, directory)
    }

    async fn store_with_pool(size: u8) -> Arc<NetworkTopologyStore> {
        let store = Arc::new(NetworkTopologyStore::in_memory());
        store.set_snode_pool((1..=size).map(test_snode).collect()).await;
        store
    }

    #[tokio::test]
    async fn builds_disjoint_paths_from_pool() {
        let store = store_with_pool(12).await;
        let manager = manager(store.clone());

        let path = manager.path_excluding(None).await.unwrap();
        assert_eq!(path.nodes().len(), PATH_SIZE);

        let paths = store.paths().await;
        assert_eq!(paths.len(), TARGET_PATH_COUNT);
        let all: Vec<&Snode> = paths.iter().flat_map(OnionPath::nodes).collect();
        let distinct: HashSet<&Snode> = all.iter().copied().collect();
        assert_eq!(all.len(), distinct.len());
        assert_eq!(store.guard_snodes().await.len(), TARGET_PATH_COUNT);
    }

    #[tokio::test]
    async fn exclusion_avoids_paths_containing_snode() {
        let store = store_with_pool(12).await;
        store.set_paths(vec![test_path(1, 2, 3), test_path(4, 5, 6)]).await;
        let manager = manager(store);

        for _ in 0..8 {
            let path = manager.path_excluding(Some(&test_snode(2))).await.unwrap();
            assert!(!path.contains(&test_snode(2)));
        }
    }

    #[tokio::test]
    async fn unreachable_hop_is_replaced_after_threshold() {
        let store = store_with_pool(12).await;
        let path = test_path(1, 2, 3);
        store.set_paths(vec![path.clone(), test_path(4, 5, 6)]).await;
        let manager = manager(store.clone());

        let message = format!("Next node not found: {}", test_snode(2).ed25519_key);
        for _ in 0..SNODE_FAILURE_THRESHOLD {
            manager.register_failure(&path, Some(&message)).await;
        }

        let paths = store.paths().await;
        assert_eq!(paths.len(), TARGET_PATH_COUNT);
        let repaired = paths
            .iter()
            .find(|candidate| candidate.guard() == &test_snode(1))
            .unwrap();
        assert!(!repaired.contains(&test_snode(2)));
        // The unreachable snode also left the pool.
        assert!(!store.snode_pool().await.contains(&test_snode(2)));
    }

    #[tokio::test]
    async fn below_threshold_the_path_survives() {
        let store = store_with_pool(12).await;
        let path = test_path(1, 2, 3);
        store.set_paths(vec![path.clone(), test_path(4, 5, 6)]).await;
        let manager = manager(store.clone());

        let message = format!("Next node not found: {}", test_snode(2).ed25519_key);
        manager.register_failure(&path, Some(&message)).await;
        assert!(store.paths().await.contains(&path));
    }

    #[tokio::test]
    async fn repeated_unspecific_failures_drop_the_path() {
        let store = store_with_pool(12).await;
        let path = test_path(1, 2, 3);
        store.set_paths(vec![path.clone(), test_path(4, 5, 6)]).await;
        store.set_guard_snodes([test_snode(1), test_snode(4)].into()).await;
        let manager = manager(store.clone());

        for _ in 0..PATH_FAILURE_THRESHOLD {
            manager.register_failure(&path, None).await;
        }

        let paths = store.paths().await;
        assert!(!paths.contains(&path));
        assert!(!store.guard_snodes().await.contains(&test_snode(1)));
    }

    #[tokio::test]
    async fn success_resets_failure_counters() {
        let store = store_with_pool(12).await;
        let path = test_path(1, 2, 3);
        store.set_paths(vec![path.clone(), test_path(4, 5, 6)]).await;
        let manager = manager(store.clone());

        for _ in 0..PATH_FAILURE_THRESHOLD - 1 {
            manager.register_failure(&path, None).await;
        }
        manager.register_success(&path).await;
        // The counter starts over, so the next failures still stay below
        // the threshold until they add up again.
        for _ in 0..PATH_FAILURE_THRESHOLD - 1 {
            manager.register_failure(&path, None).await;
        }
        assert!(store.paths().await.contains(&path));
    }
}
