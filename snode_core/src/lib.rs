/*!
Client side of the onion routed swarm storage protocol.

Requests to storage nodes ("snodes") are wrapped in three layers of
encryption and sent through a path of snodes so that no single node learns
both who is asking and what is being asked. The crate maintains the snode
pool, per-account swarms and onion paths, repairs them when nodes fail, and
exposes signed storage RPCs (retrieve/store/delete/expire, batched) on top.
*/

#![forbid(unsafe_code)]

#[macro_use]
extern crate log;

pub mod directory;
pub mod error;
pub mod onion;
pub mod snode;
pub mod store;
pub mod swarm;
pub mod time;
