//! Onion routing.
//!
//! Requests to storage nodes and external servers go through three-hop
//! onion paths so that no single snode learns both who is asking and what
//! is being asked. The submodules split the work up: path selection and
//! repair, layered encryption, response framing, and the dispatcher that
//! ties them together.

pub mod codec;
pub mod dispatcher;
pub mod encryption;
pub mod path;
pub mod path_manager;
