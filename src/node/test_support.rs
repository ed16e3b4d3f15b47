//! In-process stand-in for a node connection, for tests.

use super::pool::{Delivery, NodeHandle, NodeId, NodePool};
use super::types::Request;

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub(crate) struct FakeNode {
	id: NodeId,
	pool: Arc<NodePool>,
	outbound: mpsc::UnboundedReceiver<Request>,
	connected: Arc<AtomicBool>,
}

impl FakeNode {
	pub fn attach(pool: &Arc<NodePool>, name: &str) -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		let connected = Arc::new(AtomicBool::new(true));
		let id = pool.attach(NodeHandle::new(name.to_string(), tx, connected.clone()));
		Self {
			id,
			pool: pool.clone(),
			outbound: rx,
			connected,
		}
	}

	/// Stop the pool from routing new requests here.
	pub fn go_offline(&self) {
		self.connected.store(false, Ordering::Release);
	}

	pub async fn next_request(&mut self) -> Request {
		self.outbound.recv().await.expect("pool closed")
	}

	pub fn reply(&self, request: &Request, payload: &str) {
		self.pool.deliver(&Delivery::Reply {
			request,
			payload: payload.as_bytes(),
		});
	}

	pub fn notify(&self, payload: &str) {
		self.pool.deliver(&Delivery::Notification {
			payload: payload.as_bytes(),
		});
	}

	pub fn drop_request(&self, request: &Request) {
		self.pool.deliver(&Delivery::Dropped {
			node: self.id,
			request,
		});
	}

	/// Answer every query with `answer`; answers of `None` are left unreplied.
	pub fn respond_with<F>(self, answer: F) -> JoinHandle<()>
	where
		F: Fn(&Value) -> Option<String> + Send + 'static,
	{
		self.serve(answer, Arc::new(Mutex::new(Vec::new())))
	}

	/// Like `respond_with`, also recording fire-and-forget submissions.
	pub fn serve<F>(mut self, answer: F, submitted: Arc<Mutex<Vec<Value>>>) -> JoinHandle<()>
	where
		F: Fn(&Value) -> Option<String> + Send + 'static,
	{
		tokio::spawn(async move {
			while let Some(request) = self.outbound.recv().await {
				let document = request.document().expect("request is json");
				if !request.expects_reply() {
					submitted.lock().push(document);
					continue;
				}
				if let Some(reply) = answer(&document) {
					self.reply(&request, &reply);
				}
			}
		})
	}
}
