//!
//! Websocket connection to a single ledger node.
//!
//! Each connection runs on its own task: it drains the request queue the pool writes to,
//! tags requests that expect a reply with a connection-local id, and turns inbound frames
//! into pool deliveries. Frames carrying a known id are replies; everything else is an
//! unsolicited notification. The connection reconnects with exponential backoff and
//! reports requests lost with a dropped socket so correlated callers do not wait forever.

use super::pool::{Delivery, NodeHandle, NodeId, NodePool};
use super::types::{NodeError, Request};

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Websocket node connection
pub struct NodeConnection {
	/// The websocket URL of the node.
	url: String,
	node: NodeId,
	pool: Arc<NodePool>,
	outbound: mpsc::UnboundedReceiver<Request>,
	connected: Arc<AtomicBool>,
	/// Requests awaiting a reply on the current socket, by id.
	in_flight: HashMap<u64, Request>,
	next_id: u64,
}

enum SessionEnd {
	/// The pool side of the queue is gone; stop for good.
	Closed,
	/// The socket failed; reconnect.
	Lost,
}

impl NodeConnection {
	/// Attach a connection for `url` to the pool and start it.
	///
	/// # Returns
	/// The task driving the connection. Aborting it disconnects the node.
	pub fn spawn(url: String, pool: Arc<NodePool>) -> JoinHandle<()> {
		let (tx, rx) = mpsc::unbounded_channel();
		let connected = Arc::new(AtomicBool::new(false));
		let node = pool.attach(NodeHandle::new(url.clone(), tx, connected.clone()));

		let connection = Self {
			url,
			node,
			pool,
			outbound: rx,
			connected,
			in_flight: HashMap::new(),
			next_id: 0,
		};
		tokio::spawn(connection.run())
	}

	async fn run(mut self) {
		let mut backoff = ExponentialBackoff {
			max_elapsed_time: None,
			..ExponentialBackoff::default()
		};

		loop {
			let ended = self.session().await;
			let had_connected = self.connected.swap(false, Ordering::AcqRel);
			match ended {
				Ok(SessionEnd::Closed) => {
					info!("Request queue for {} closed, stopping", self.url);
					self.fail_in_flight();
					return;
				}
				Ok(SessionEnd::Lost) => warn!("Connection to {} lost", self.url),
				Err(e) => error!("Connection to {} failed: {}", self.url, e),
			}

			self.fail_in_flight();

			let delay = reconnect_delay(&mut backoff, had_connected);
			debug!("Reconnecting to {} in {:?}", self.url, delay);
			tokio::time::sleep(delay).await;
		}
	}

	async fn session(&mut self) -> Result<SessionEnd, NodeError> {
		debug!("Attempting WebSocket connection to: {}", self.url);
		let (ws_stream, response) = connect_async(self.url.as_str()).await?;
		info!(
			"Connected to node {}, response status: {}",
			self.url,
			response.status()
		);
		let (mut ws_sender, mut ws_receiver) = ws_stream.split();
		self.connected.store(true, Ordering::Release);

		loop {
			tokio::select! {
				outbound = self.outbound.recv() => {
					let Some(request) = outbound else {
						return Ok(SessionEnd::Closed);
					};
					match self.frame(&request) {
						Ok(frame) => ws_sender.send(Message::Text(frame)).await?,
						Err(e) => {
							warn!("Dropping unencodable request for {}: {}", self.url, e);
							self.pool.deliver(&Delivery::Dropped {
								node: self.node,
								request: &request,
							});
						}
					}
				}
				inbound = ws_receiver.next() => {
					match inbound {
						Some(Ok(Message::Text(text))) => self.dispatch(&text),
						Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Lost),
						Some(Ok(_)) => debug!("Ignoring non-text frame from {}", self.url),
						Some(Err(e)) => return Err(e.into()),
					}
				}
			}
		}
	}

	/// Wrap a request in the transport envelope.
	fn frame(&mut self, request: &Request) -> Result<String, NodeError> {
		let body = request.document()?;
		if !request.expects_reply() {
			return Ok(json!({ "request": body }).to_string());
		}

		let id = self.next_id;
		self.next_id += 1;
		self.in_flight.insert(id, request.clone());
		Ok(json!({ "id": id, "request": body }).to_string())
	}

	fn dispatch(&mut self, text: &str) {
		let parsed: Option<Value> = serde_json::from_str(text).ok();
		let id = parsed
			.as_ref()
			.and_then(|frame| frame.get("id"))
			.and_then(Value::as_u64);

		if let Some(request) = id.and_then(|id| self.in_flight.remove(&id)) {
			let reply = parsed
				.as_ref()
				.and_then(|frame| frame.get("reply"))
				.map(Value::to_string)
				.unwrap_or_default();
			self.pool.deliver(&Delivery::Reply {
				request: &request,
				payload: reply.as_bytes(),
			});
			return;
		}

		self.pool.deliver(&Delivery::Notification {
			payload: text.as_bytes(),
		});
	}

	fn fail_in_flight(&mut self) {
		for (_, request) in self.in_flight.drain() {
			self.pool.deliver(&Delivery::Dropped {
				node: self.node,
				request: &request,
			});
		}
	}
}

/// Delay before the next connection attempt. A session that got connected starts the
/// schedule over, however it ended.
fn reconnect_delay(backoff: &mut ExponentialBackoff, had_connected: bool) -> std::time::Duration {
	if had_connected {
		backoff.reset();
	}
	backoff.next_backoff().unwrap_or(backoff.max_interval)
}
