//! Pipeline for pushed block notifications.
//!
//! Nodes push every newly confirmed block to every connected client. The pipeline drops
//! repeats, keeps only send blocks, and for sends destined to one of our addresses
//! queues the block hash on that address for claiming. Decisions are taken in this order:
//! duplicate check, block type, destination ownership, then hash extraction.
//!
//! Notifications arrive in a few shapes; the block body may be an object or a JSON
//! document embedded as a string:
//!
//! ```text
//! {"hash": "...", "block": "{\"type\": \"send\", \"destination\": \"xrb_...\", ...}"}
//! {"topic": "confirmation", "message": {"hash": "...", "block": {"type": "send", ...}}}
//! ```

use super::registry::AddressRegistry;
use super::seen_blocks::{SeenBlockCache, digest};
use super::types::WalletEvent;
use crate::node::{Delivery, NodeObserver};

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What happened to one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
	/// Already processed recently.
	Duplicate,
	/// Not JSON, or missing a field needed to classify it.
	Malformed,
	/// Not a send block.
	Ignored,
	/// A send to an address this wallet does not hold.
	NotOurs,
	/// Queued for claiming on `address`.
	Recorded { address: String, hash: String },
}

/// A parsed notification; fields are read on demand so each decision only looks at
/// what it needs.
struct BlockNotice {
	message: Value,
	block: Value,
}

impl BlockNotice {
	fn parse(normalized: &str) -> Result<Self, serde_json::Error> {
		let outer: Value = serde_json::from_str(normalized)?;
		let message = match outer.get("message") {
			Some(message @ Value::Object(_)) => message.clone(),
			_ => outer.clone(),
		};
		let block = match message.get("block") {
			Some(Value::String(embedded)) => serde_json::from_str(embedded)?,
			Some(block @ Value::Object(_)) => block.clone(),
			_ => message.clone(),
		};
		Ok(Self { message, block })
	}

	fn block_type(&self) -> Option<&str> {
		self.block.get("type").and_then(Value::as_str)
	}

	fn destination(&self) -> Option<&str> {
		self.block.get("destination").and_then(Value::as_str)
	}

	fn hash(&self) -> Option<&str> {
		self.message
			.get("hash")
			.or_else(|| self.block.get("hash"))
			.and_then(Value::as_str)
			.filter(|hash| !hash.is_empty())
	}
}

pub struct BlockNotificationPipeline {
	registry: Arc<AddressRegistry>,
	seen: Mutex<SeenBlockCache>,
	events: broadcast::Sender<WalletEvent>,
}

impl BlockNotificationPipeline {
	pub fn new(registry: Arc<AddressRegistry>, seen_capacity: usize) -> Self {
		let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
		Self {
			registry,
			seen: Mutex::new(SeenBlockCache::new(seen_capacity)),
			events,
		}
	}

	/// Receive wallet events emitted from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
		self.events.subscribe()
	}

	/// Process one raw notification payload.
	pub fn process(&self, payload: &str) -> BlockOutcome {
		let normalized: String = payload.chars().filter(|c| !c.is_whitespace()).collect();

		let key = digest(&normalized);
		{
			let mut seen = self.seen.lock();
			if !seen.insert(key) {
				debug!(
					"Already seen notification {} ({} remembered)",
					hex::encode(key),
					seen.len()
				);
				return BlockOutcome::Duplicate;
			}
		}

		let notice = match BlockNotice::parse(&normalized) {
			Ok(notice) => notice,
			Err(e) => {
				warn!("Dropping unparseable block notification: {}", e);
				return BlockOutcome::Malformed;
			}
		};

		match notice.block_type() {
			Some("send") => {}
			Some(_) => return BlockOutcome::Ignored,
			None => {
				debug!("Notification has no block type, ignoring");
				return BlockOutcome::Malformed;
			}
		}

		let Some(destination) = notice.destination() else {
			warn!("Send notification has no destination, ignoring");
			return BlockOutcome::Malformed;
		};
		if !self.registry.owns(destination) {
			return BlockOutcome::NotOurs;
		}
		info!("Address belongs to us: {}", destination);

		let Some(hash) = notice.hash() else {
			warn!("Send notification for {} has no hash, ignoring", destination);
			return BlockOutcome::Malformed;
		};

		match self.registry.record_unclaimed(destination, hash) {
			Ok(true) => {
				info!("Queued block {} for {}", hash, destination);
				// No subscribers is fine.
				let _ = self.events.send(WalletEvent::IncomingBlock {
					address: destination.to_string(),
					hash: hash.to_string(),
				});
			}
			Ok(false) => debug!("Block {} already queued for {}", hash, destination),
			Err(e) => {
				warn!("Could not queue block {}: {}", hash, e);
				return BlockOutcome::Malformed;
			}
		}

		BlockOutcome::Recorded {
			address: destination.to_string(),
			hash: hash.to_string(),
		}
	}
}

impl NodeObserver for BlockNotificationPipeline {
	fn observe(&self, delivery: &Delivery<'_>) {
		if let Delivery::Notification { payload } = delivery {
			match std::str::from_utf8(payload) {
				Ok(text) => {
					let outcome = self.process(text);
					debug!("Block notification outcome: {:?}", outcome);
				}
				Err(e) => warn!("Dropping non-UTF-8 block notification: {}", e),
			}
		}
	}

	fn name(&self) -> &'static str {
		"BlockNotificationPipeline"
	}
}
