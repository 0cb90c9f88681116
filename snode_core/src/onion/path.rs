//! Onion path definition.

use serde::{Deserialize, Serialize};

use crate::snode::Snode;

/// Number of snodes in a path, guard included.
pub const PATH_SIZE: usize = 3;

/// An ordered sequence of exactly [`PATH_SIZE`] snodes used to route one
/// onion request. The first node is the guard, the only node the client
/// ever contacts directly. Paths are value types: repair never mutates a
/// path in place, it builds a replacement.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct OnionPath {
    nodes: [Snode; PATH_SIZE],
}

impl OnionPath {
    /// Create a new path from a guard and two relays.
    pub fn new(nodes: [Snode; PATH_SIZE]) -> Self {
        OnionPath { nodes }
    }

    /// The first hop.
    pub fn guard(&self) -> &Snode {
        &self.nodes[0]
    }

    /// All hops, guard first.
    pub fn nodes(&self) -> &[Snode] {
        &self.nodes
    }

    /// Whether `snode` is one of the hops.
    pub fn contains(&self, snode: &Snode) -> bool {
        self.nodes.iter().any(|node| node == snode)
    }

    /// Find a hop by its ed25519 key.
    pub fn position_of_key(&self, ed25519_key: &str) -> Option<usize> {
        self.nodes.iter().position(|node| node.ed25519_key == ed25519_key)
    }

    /// A copy of this path with the hop at `index` swapped out. The guard
    /// stays in place when an interior hop is replaced.
    pub fn with_replacement(&self, index: usize, snode: Snode) -> Self {
        let mut nodes = self.nodes.clone();
        nodes[index] = snode;
        OnionPath { nodes }
    }
}
