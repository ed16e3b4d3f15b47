//! Node integration module
//!
//! This module provides the pool of ledger node connections, the wire types exchanged
//! with nodes, and the correlator that turns the pool's broadcast-and-observe delivery
//! into request/reply calls.

/// Websocket connection to a single node
mod client;
/// Request/reply correlation
mod correlator;
/// Connection pool and observer delivery
mod pool;
/// Request documents and node errors
mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::NodeConnection;
pub use correlator::{CallOptions, Correlator};
pub use pool::{Delivery, NodeHandle, NodeId, NodeObserver, NodePool, ObserverId};
pub use types::*;
