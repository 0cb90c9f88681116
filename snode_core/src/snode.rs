//! Service node identity and request addressing types.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A storage node, identified by its key material. Two snodes advertising
/// the same keys from different addresses are the same node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snode {
    /// Scheme plus host, e.g. `https://116.203.217.101`.
    pub address: String,
    /// Storage port.
    pub port: u16,
    /// Hex encoded ed25519 public key.
    pub ed25519_key: String,
    /// Hex encoded x25519 public key.
    pub x25519_key: String,
}

impl Snode {
    /// Create a new `Snode`.
    pub fn new(address: String, port: u16, ed25519_key: String, x25519_key: String) -> Self {
        Snode { address, port, ed25519_key, x25519_key }
    }

    /// Base URL of the node's public HTTP endpoint.
    pub fn base_url(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// The node's x25519 key as raw bytes, if well formed.
    pub fn x25519_key_bytes(&self) -> Option<[u8; 32]> {
        decode_key(&self.x25519_key)
    }

    /// The node's ed25519 key as raw bytes, if well formed.
    pub fn ed25519_key_bytes(&self) -> Option<[u8; 32]> {
        decode_key(&self.ed25519_key)
    }
}

pub(crate) fn decode_key(hex_key: &str) -> Option<[u8; 32]> {
    hex::decode(hex_key).ok()?.try_into().ok()
}

impl PartialEq for Snode {
    fn eq(&self, other: &Self) -> bool {
        self.ed25519_key == other.ed25519_key && self.x25519_key == other.x25519_key
    }
}

impl Eq for Snode {}

impl Hash for Snode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ed25519_key.hash(state);
        self.x25519_key.hash(state);
    }
}

impl fmt::Display for Snode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Storage RPC methods understood by snodes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    GetSwarm,
    Retrieve,
    Store,
    Delete,
    DeleteAll,
    Expire,
    GetExpiries,
    Info,
    OxenDaemonRpcCall,
    Batch,
    Sequence,
}

impl Method {
    /// Wire name of the method.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::GetSwarm => "get_swarm",
            Method::Retrieve => "retrieve",
            Method::Store => "store",
            Method::Delete => "delete",
            Method::DeleteAll => "delete_all",
            Method::Expire => "expire",
            Method::GetExpiries => "get_expiries",
            Method::Info => "info",
            Method::OxenDaemonRpcCall => "oxen_daemon_rpc_call",
            Method::Batch => "batch",
            Method::Sequence => "sequence",
        }
    }
}

/// Onion request protocol versions still spoken on the network.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Version {
    V2,
    V3,
    V4,
}

impl Version {
    /// The lsrpc target path announced to intermediate hops for server
    /// destinations.
    pub fn path(self) -> &'static str {
        match self {
            Version::V2 => "/loki/v2/lsrpc",
            Version::V3 => "/loki/v3/lsrpc",
            Version::V4 => "/oxen/v4/lsrpc",
        }
    }
}

/// Where an onion route terminates.
#[derive(Clone, Debug)]
pub enum Destination {
    /// The route ends at a storage node.
    Snode(Snode),
    /// The route ends at an external HTTPS server (file server, open group
    /// server) that speaks the onion request protocol.
    Server {
        host: String,
        target: String,
        x25519_public_key: String,
        scheme: String,
        port: u16,
    },
}

impl Destination {
    /// Human readable description used in destination error messages.
    pub fn description(&self) -> String {
        match self {
            Destination::Snode(snode) => format!("Service node {}", snode),
            Destination::Server { host, .. } => host.clone(),
        }
    }

    /// The x25519 key the final payload is encrypted for.
    pub fn x25519_key_bytes(&self) -> Option<[u8; 32]> {
        match self {
            Destination::Snode(snode) => snode.x25519_key_bytes(),
            Destination::Server { x25519_public_key, .. } => decode_key(x25519_public_key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn snode_equality_by_key_material() {
        let a = Snode::new("https://1.2.3.4".into(), 1234, "aa".into(), "bb".into());
        let b = Snode::new("https://5.6.7.8".into(), 5678, "aa".into(), "bb".into());
        let c = Snode::new("https://1.2.3.4".into(), 1234, "cc".into(), "bb".into());
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn method_wire_names() {
        assert_eq!(Method::GetSwarm.as_str(), "get_swarm");
        assert_eq!(Method::Store.as_str(), "store");
        assert_eq!(Method::OxenDaemonRpcCall.as_str(), "oxen_daemon_rpc_call");
    }

    #[test]
    fn version_paths() {
        assert_eq!(Version::V4.path(), "/oxen/v4/lsrpc");
        assert_eq!(Version::V2.path(), "/loki/v2/lsrpc");
    }
}
