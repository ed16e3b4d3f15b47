//! Request/reply correlation over the broadcast node pool.
//!
//! Nodes answer asynchronously and every reply is delivered to every observer. The
//! correlator registers a single observer holding a table keyed by the request bytes;
//! each in-flight `call` owns a one-shot slot in that table and suspends on it until a
//! reply tagged with a byte-equal request arrives.

use super::pool::{Delivery, NodeId, NodeObserver, NodePool, ObserverId};
use super::types::{NodeError, Request};

use futures::future::{AbortRegistration, Abortable};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

type ReplySlot = oneshot::Sender<Result<Vec<u8>, NodeError>>;

/// Per-call options.
#[derive(Debug, Default)]
pub struct CallOptions {
	/// Overrides the correlator's default timeout.
	pub timeout: Option<Duration>,
	/// Aborting the paired handle fails the call with `NodeError::Cancelled`.
	pub cancel: Option<AbortRegistration>,
}

struct Waiter {
	id: u64,
	/// Node the request was handed to; unset until routed.
	node: Option<NodeId>,
	slot: ReplySlot,
}

#[derive(Default)]
struct WaiterTable {
	next_id: AtomicU64,
	pending: Mutex<HashMap<Request, Vec<Waiter>>>,
}

impl WaiterTable {
	fn register(self: &Arc<Self>, request: &Request) -> PendingCall {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = oneshot::channel();
		self.pending
			.lock()
			.entry(request.clone())
			.or_default()
			.push(Waiter {
				id,
				node: None,
				slot: tx,
			});

		PendingCall {
			table: self.clone(),
			request: request.clone(),
			id,
			receiver: rx,
		}
	}

	fn route(&self, request: &Request, id: u64, node: NodeId) {
		if let Some(waiter) = self
			.pending
			.lock()
			.get_mut(request)
			.and_then(|waiters| waiters.iter_mut().find(|w| w.id == id))
		{
			waiter.node = Some(node);
		}
	}

	/// Hand `payload` to every caller waiting on `request`. Returns the number woken.
	fn resolve(&self, request: &Request, payload: &[u8]) -> usize {
		let waiters = match self.pending.lock().remove(request) {
			Some(waiters) => waiters,
			None => return 0,
		};

		let woken = waiters.len();
		for waiter in waiters {
			// The receiver may already be gone if the caller timed out concurrently.
			let _ = waiter.slot.send(Ok(payload.to_vec()));
		}
		woken
	}

	/// Fail the callers whose `request` was sent on `node`. Returns the number woken.
	fn fail(&self, request: &Request, node: NodeId) -> usize {
		let failed: Vec<Waiter> = {
			let mut pending = self.pending.lock();
			let Some(waiters) = pending.get_mut(request) else {
				return 0;
			};
			let (failed, kept): (Vec<Waiter>, Vec<Waiter>) = std::mem::take(waiters)
				.into_iter()
				.partition(|w| w.node == Some(node));
			*waiters = kept;
			if waiters.is_empty() {
				pending.remove(request);
			}
			failed
		};

		let woken = failed.len();
		for waiter in failed {
			let _ = waiter.slot.send(Err(NodeError::TransportUnavailable));
		}
		woken
	}

	fn forget(&self, request: &Request, id: u64) {
		let mut pending = self.pending.lock();
		if let Some(waiters) = pending.get_mut(request) {
			waiters.retain(|waiter| waiter.id != id);
			if waiters.is_empty() {
				pending.remove(request);
			}
		}
	}

	fn len(&self) -> usize {
		self.pending.lock().values().map(Vec::len).sum()
	}
}

impl NodeObserver for WaiterTable {
	fn observe(&self, delivery: &Delivery<'_>) {
		match delivery {
			Delivery::Reply { request, payload } => {
				let woken = self.resolve(request, payload);
				if woken > 0 {
					debug!("Reply matched {} waiting call(s)", woken);
				}
			}
			Delivery::Dropped { node, request } => {
				let woken = self.fail(request, *node);
				if woken > 0 {
					warn!("Connection dropped with {} call(s) in flight", woken);
				}
			}
			Delivery::Notification { .. } => {}
		}
	}

	fn name(&self) -> &'static str {
		"Correlator"
	}
}

/// One in-flight call. Deregisters itself from the table when dropped.
struct PendingCall {
	table: Arc<WaiterTable>,
	request: Request,
	id: u64,
	receiver: oneshot::Receiver<Result<Vec<u8>, NodeError>>,
}

impl PendingCall {
	fn route(&self, node: NodeId) {
		self.table.route(&self.request, self.id, node);
	}

	async fn recv(&mut self) -> Result<Vec<u8>, NodeError> {
		match (&mut self.receiver).await {
			Ok(result) => result,
			Err(_) => Err(NodeError::TransportUnavailable),
		}
	}
}

impl Drop for PendingCall {
	fn drop(&mut self) {
		self.table.forget(&self.request, self.id);
	}
}

/// Turns "send and observe" into "send and wait for the matching reply".
pub struct Correlator {
	pool: Arc<NodePool>,
	table: Arc<WaiterTable>,
	observer: ObserverId,
	default_timeout: Option<Duration>,
}

impl Correlator {
	/// Create a correlator and register it with the pool.
	///
	/// With `default_timeout` set to `None` a call waits until a matching reply
	/// arrives, however long that takes.
	pub fn new(pool: Arc<NodePool>, default_timeout: Option<Duration>) -> Self {
		let table = Arc::new(WaiterTable::default());
		let observer = pool.add_observer(table.clone());
		Self {
			pool,
			table,
			observer,
			default_timeout,
		}
	}

	/// Send `request` and wait for the first reply tagged with a byte-equal request.
	pub async fn call(&self, request: Request) -> Result<Vec<u8>, NodeError> {
		self.call_with(request, CallOptions::default()).await
	}

	pub async fn call_with(
		&self,
		request: Request,
		options: CallOptions,
	) -> Result<Vec<u8>, NodeError> {
		// Register and route before sending so a fast reply or drop cannot slip past us.
		let mut pending = self.table.register(&request);
		self.pool.enqueue(request, |node| pending.route(node))?;

		let CallOptions { timeout, cancel } = options;
		let wait = async {
			match cancel {
				Some(registration) => Abortable::new(pending.recv(), registration)
					.await
					.unwrap_or(Err(NodeError::Cancelled)),
				None => pending.recv().await,
			}
		};

		match timeout.or(self.default_timeout) {
			Some(limit) => tokio::time::timeout(limit, wait)
				.await
				.map_err(|_| NodeError::Timeout(limit))?,
			None => wait.await,
		}
	}

	/// Number of calls currently waiting for a reply.
	pub fn pending_count(&self) -> usize {
		self.table.len()
	}
}

impl Drop for Correlator {
	fn drop(&mut self) {
		self.pool.remove_observer(self.observer);
	}
}
