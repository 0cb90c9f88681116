//! Snode directory: the global pool of known service nodes and the seed
//! node bootstrap that refills it.

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::{IteratorRandom, SliceRandom};
use rand::thread_rng;
use serde_json::{json, Value};

use crate::error::Error;
use crate::snode::Snode;
use crate::store::NetworkTopologyStore;

/// Below this pool size the pool is considered depleted and gets
/// repopulated from a seed node before use.
pub const MIN_SNODE_POOL_COUNT: usize = 12;
/// A swarm with fewer members than this is treated as stale and refetched.
pub const MIN_SWARM_SNODE_COUNT: usize = 3;

const MAINNET_SEED_POOL: &[&str] = &[
    "https://seed1.getsession.org:4443",
    "https://seed2.getsession.org:4443",
    "https://seed3.getsession.org:4443",
];
const TESTNET_SEED_POOL: &[&str] = &["http://public.loki.foundation:38157"];

/// Maintains the snode pool and per-snode failure accounting. Swarm
/// fetching lives in the swarm RPC client since it needs an onion round
/// trip; the directory only owns the caches and the error bookkeeping.
pub struct SnodeDirectory {
    store: Arc<NetworkTopologyStore>,
    http: reqwest::Client,
    seed_pool: Vec<String>,
}

impl SnodeDirectory {
    pub fn new(store: Arc<NetworkTopologyStore>, http: reqwest::Client, testnet: bool) -> Self {
        let seeds = if testnet { TESTNET_SEED_POOL } else { MAINNET_SEED_POOL };
        SnodeDirectory {
            store,
            http,
            seed_pool: seeds.iter().map(|seed| (*seed).to_owned()).collect(),
        }
    }

    /// A random snode from the pool, repopulating the pool from a seed
    /// node first when it is depleted.
    pub async fn random_snode(&self) -> Result<Snode, Error> {
        let pool = self.store.snode_pool().await;
        let pool = if pool.len() < MIN_SNODE_POOL_COUNT {
            self.populate_pool().await?
        } else {
            pool
        };
        pool.into_iter().choose(&mut thread_rng()).ok_or(Error::Generic)
    }

    async fn populate_pool(&self) -> Result<HashSet<Snode>, Error> {
        let seed = self
            .seed_pool
            .choose(&mut thread_rng())
            .expect("seed pool is never empty");
        debug!("Populating snode pool using: {}.", seed);
        let request = json!({
            "method": "get_n_service_nodes",
            "params": {
                "active_only": true,
                "limit": 256,
                "fields": {
                    "public_ip": true,
                    "storage_port": true,
                    "pubkey_x25519": true,
                    "pubkey_ed25519": true,
                },
            },
        });
        let response = self
            .http
            .post(format!("{}/json_rpc", seed))
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                warn!("Couldn't reach seed node {}: {}.", seed, error);
                Error::Generic
            })?;
        let json: Value = response.json().await.map_err(|_| Error::Generic)?;

        let states = json
            .get("result")
            .and_then(|result| result.get("service_node_states"))
            .and_then(Value::as_array)
            .ok_or_else(|| {
                warn!("Failed to update snode pool from: {}.", seed);
                Error::Generic
            })?;

        let pool: HashSet<Snode> = states.iter().filter_map(parse_seed_snode).collect();
        debug!("Persisting snode pool of {} nodes.", pool.len());
        self.store.set_snode_pool(pool.clone()).await;
        if pool.is_empty() {
            warn!("Got an empty snode pool from: {}.", seed);
            return Err(Error::Generic);
        }
        Ok(pool)
    }

    /// Classify an error status reported for `snode` and update the
    /// topology accordingly. Returns an error the caller should surface
    /// instead of the raw status, if any.
    pub async fn handle_snode_error(
        &self,
        status: u16,
        json: Option<&Value>,
        snode: &Snode,
        public_key: Option<&str>,
    ) -> Option<Error> {
        match status {
            // Usually indicates that the snode isn't up to date.
            400 | 500 | 502 | 503 => {
                self.record_bad_snode(snode, public_key).await;
                None
            }
            406 | 425 => {
                debug!("The user's clock is out of sync with the service node network.");
                Some(Error::ClockOutOfSync)
            }
            421 => {
                // The snode is no longer associated with the given public
                // key. The response may carry the fresh swarm.
                match public_key {
                    Some(public_key) => {
                        let snodes = json.map(parse_swarm_snodes).unwrap_or_default();
                        if snodes.is_empty() {
                            debug!("Invalidating swarm for: {}.", public_key);
                            self.store.drop_snode_from_swarm(public_key, snode).await;
                        } else {
                            self.store
                                .set_swarm(public_key, snodes.into_iter().collect())
                                .await;
                        }
                    }
                    None => debug!("Got a 421 without an associated public key."),
                }
                None
            }
            404 => Some(Error::Generic),
            _ => {
                self.record_bad_snode(snode, public_key).await;
                debug!("Unhandled response code: {}.", status);
                Some(Error::Generic)
            }
        }
    }

    /// Count a failure against `snode`, evicting it from the pool (and the
    /// relevant swarm) once it crosses the failure threshold.
    pub async fn record_bad_snode(&self, snode: &Snode, public_key: Option<&str>) {
        let evicted = self.store.record_snode_failure(snode).await;
        if evicted {
            if let Some(public_key) = public_key {
                self.store.drop_snode_from_swarm(public_key, snode).await;
            }
        }
    }
}

fn parse_seed_snode(raw: &Value) -> Option<Snode> {
    let address = raw.get("public_ip")?.as_str()?;
    let port = raw.get("storage_port")?.as_u64()?;
    let ed25519_key = raw.get("pubkey_ed25519")?.as_str()?;
    let x25519_key = raw.get("pubkey_x25519")?.as_str()?;
    if address == "0.0.0.0" {
        return None;
    }
    Some(Snode::new(
        format!("https://{}", address),
        u16::try_from(port).ok()?,
        ed25519_key.to_owned(),
        x25519_key.to_owned(),
    ))
}

/// Parse the `snodes` list carried by swarm responses and 421 redirects.
/// Ports come as strings there, unlike the seed node format.
pub fn parse_swarm_snodes(json: &Value) -> Vec<Snode> {
    let raw_snodes = match json.get("snodes").and_then(Value::as_array) {
        Some(raw_snodes) => raw_snodes,
        None => {
            debug!("Failed to parse snodes from: {}.", json);
            return Vec::new();
        }
    };
    raw_snodes
        .iter()
        .filter_map(|raw| {
            let address = raw.get("ip")?.as_str()?;
            let port: u16 = raw.get("port")?.as_str()?.parse().ok()?;
            let ed25519_key = raw.get("pubkey_ed25519")?.as_str()?;
            let x25519_key = raw.get("pubkey_x25519")?.as_str()?;
            if address == "0.0.0.0" {
                debug!("Failed to parse snode from: {}.", raw);
                return None;
            }
            Some(Snode::new(
                format!("https://{}", address),
                port,
                ed25519_key.to_owned(),
                x25519_key.to_owned(),
            ))
        })
        .collect()
}
