//! Pool of node connections with observer-based delivery.
//!
//! The pool fans outgoing requests out to connected nodes and delivers every inbound
//! payload to all registered observers. Observers may be added or removed from any
//! thread while delivery is in progress: `deliver` works on a snapshot of the
//! registrations taken under a short read lock.

use super::types::{NodeError, Request};

use parking_lot::RwLock;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A payload handed from a connection to the pool's observers.
#[derive(Debug)]
pub enum Delivery<'a> {
	/// A reply to a request that was sent through the pool.
	Reply {
		request: &'a Request,
		payload: &'a [u8],
	},
	/// An unsolicited push from a node.
	Notification { payload: &'a [u8] },
	/// The connection to `node` went away before answering this request.
	Dropped { node: NodeId, request: &'a Request },
}

/// Trait for receiving node deliveries.
///
/// Called on the connection's receive task, so implementations must not block.
pub trait NodeObserver: Send + Sync {
	fn observe(&self, delivery: &Delivery<'_>);

	/// Name used in logs.
	fn name(&self) -> &'static str;
}

/// Handle returned by [`NodePool::add_observer`], used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Identity of an attached node, assigned by [`NodePool::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

/// The pool's end of a node connection.
#[derive(Debug, Clone)]
pub struct NodeHandle {
	name: String,
	outbound: mpsc::UnboundedSender<Request>,
	connected: Arc<AtomicBool>,
}

impl NodeHandle {
	pub fn new(
		name: String,
		outbound: mpsc::UnboundedSender<Request>,
		connected: Arc<AtomicBool>,
	) -> Self {
		Self {
			name,
			outbound,
			connected,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn is_connected(&self) -> bool {
		self.connected.load(Ordering::Acquire) && !self.outbound.is_closed()
	}

	fn send(&self, request: Request) -> bool {
		self.outbound.send(request).is_ok()
	}
}

#[derive(Default)]
pub struct NodePool {
	nodes: RwLock<Vec<(NodeId, NodeHandle)>>,
	observers: RwLock<Vec<(ObserverId, Arc<dyn NodeObserver>)>>,
	next_node_id: AtomicU64,
	next_observer_id: AtomicU64,
}

impl NodePool {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add a node connection to the pool.
	pub fn attach(&self, node: NodeHandle) -> NodeId {
		let id = NodeId(self.next_node_id.fetch_add(1, Ordering::Relaxed));
		debug!("Attaching node {} as {:?}", node.name(), id);
		self.nodes.write().push((id, node));
		id
	}

	/// Number of nodes currently able to accept requests.
	pub fn connected_count(&self) -> usize {
		self.nodes
			.read()
			.iter()
			.filter(|(_, n)| n.is_connected())
			.count()
	}

	/// Send a request to every connected node.
	pub fn broadcast(&self, request: Request) -> Result<(), NodeError> {
		let nodes = self.nodes.read();
		let mut delivered = 0usize;
		for (_, node) in nodes.iter().filter(|(_, n)| n.is_connected()) {
			if node.send(request.clone()) {
				delivered += 1;
			} else {
				warn!("Node {} rejected broadcast", node.name());
			}
		}

		if delivered == 0 {
			return Err(NodeError::TransportUnavailable);
		}
		debug!("Broadcast request to {} node(s)", delivered);
		Ok(())
	}

	/// Queue a request on one connected node, chosen at random.
	///
	/// `route` is told which node is about to receive the request before it is sent, and
	/// again for every node tried after a rejection.
	pub fn enqueue<F>(&self, request: Request, mut route: F) -> Result<NodeId, NodeError>
	where
		F: FnMut(NodeId),
	{
		let nodes = self.nodes.read();
		let mut candidates: Vec<&(NodeId, NodeHandle)> =
			nodes.iter().filter(|(_, n)| n.is_connected()).collect();

		while !candidates.is_empty() {
			let pick = rand::rng().random_range(0..candidates.len());
			let (id, node) = candidates.swap_remove(pick);
			route(*id);
			if node.send(request.clone()) {
				debug!("Queued request on node {}", node.name());
				return Ok(*id);
			}
			warn!("Node {} rejected request, trying another", node.name());
		}

		Err(NodeError::TransportUnavailable)
	}

	pub fn add_observer(&self, observer: Arc<dyn NodeObserver>) -> ObserverId {
		let id = ObserverId(self.next_observer_id.fetch_add(1, Ordering::Relaxed));
		debug!("Registering observer {} as {:?}", observer.name(), id);
		self.observers.write().push((id, observer));
		id
	}

	/// Remove an observer. Returns false if it was not registered.
	pub fn remove_observer(&self, id: ObserverId) -> bool {
		let mut observers = self.observers.write();
		let before = observers.len();
		observers.retain(|(registered, _)| *registered != id);
		observers.len() != before
	}

	pub fn observer_count(&self) -> usize {
		self.observers.read().len()
	}

	/// Hand a payload to every registered observer.
	pub fn deliver(&self, delivery: &Delivery<'_>) {
		let snapshot: Vec<Arc<dyn NodeObserver>> = self
			.observers
			.read()
			.iter()
			.map(|(_, observer)| observer.clone())
			.collect();

		for observer in snapshot {
			observer.observe(delivery);
		}
	}
}
