//! Read queries against the node pool.
//!
//! Each query builds its request document, waits for the correlated reply and picks out
//! the fields it needs. Replies missing those fields fail with `NodeError::MalformedReply`.

use crate::node::{self, Correlator, NodeError, PENDING_COUNT, Request};

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of a previous-hash lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviousHash {
	/// The account has no blocks yet.
	Unopened,
	/// Hash of the account's frontier block.
	Block(String),
}

impl PreviousHash {
	/// The hash, or the empty string for an unopened account.
	pub fn as_str(&self) -> &str {
		match self {
			PreviousHash::Unopened => "",
			PreviousHash::Block(hash) => hash,
		}
	}
}

#[derive(Clone)]
pub struct NodeQueries {
	correlator: Arc<Correlator>,
}

impl NodeQueries {
	pub fn new(correlator: Arc<Correlator>) -> Self {
		Self { correlator }
	}

	async fn ask(&self, document: &Value) -> Result<Value, NodeError> {
		let reply = self.correlator.call(Request::query(document)).await?;
		serde_json::from_slice(&reply)
			.map_err(|e| NodeError::MalformedReply(format!("reply is not JSON: {}", e)))
	}

	/// Confirmed and pending balance of `address`, in raw.
	pub async fn get_balance(&self, address: &str) -> Result<(u128, u128), NodeError> {
		let reply = self.ask(&node::account_balance(address)).await?;
		let balance = raw_field(&reply, "balance")?;
		let pending = raw_field(&reply, "pending")?;
		debug!("Balance of {}: {} raw ({} raw pending)", address, balance, pending);
		Ok((balance, pending))
	}

	/// Hash of the block the next block on `address` must reference.
	pub async fn get_previous_frontier_hash(&self, address: &str) -> Result<PreviousHash, NodeError> {
		let reply = self.ask(&node::frontiers(address)).await?;
		let frontiers = reply
			.get("frontiers")
			.ok_or_else(|| NodeError::MalformedReply("missing frontiers".to_string()))?;

		// The node answers with the next account at or after the one asked for, so an
		// unopened account shows up as an entry for some other account, or none at all.
		let entries = match frontiers {
			Value::Object(entries) => entries,
			Value::String(s) if s.is_empty() => {
				info!("{} needs to be opened", address);
				return Ok(PreviousHash::Unopened);
			}
			other => {
				return Err(NodeError::MalformedReply(format!(
					"frontiers is not an object: {}",
					other
				)));
			}
		};

		match entries.get(address) {
			Some(Value::String(hash)) if !hash.is_empty() => Ok(PreviousHash::Block(hash.clone())),
			Some(Value::String(_)) => {
				info!("{} needs to be opened", address);
				Ok(PreviousHash::Unopened)
			}
			Some(other) => Err(NodeError::MalformedReply(format!(
				"frontier hash for {} is not a hash: {}",
				address, other
			))),
			None => {
				info!("{} needs to be opened", address);
				Ok(PreviousHash::Unopened)
			}
		}
	}

	/// Up to ten hashes of blocks sent to `address` that have not been received yet.
	pub async fn get_unclaimed_for_address(&self, address: &str) -> Result<Vec<String>, NodeError> {
		let reply = self.ask(&node::pending(address)).await?;
		let blocks = reply
			.get("blocks")
			.ok_or_else(|| NodeError::MalformedReply("missing blocks".to_string()))?;

		let mut hashes = match blocks {
			// Nodes send an empty string rather than an empty array.
			Value::String(s) if s.is_empty() => Vec::new(),
			Value::Array(items) => items
				.iter()
				.map(|item| {
					item.as_str().map(str::to_string).ok_or_else(|| {
						NodeError::MalformedReply(format!("pending entry is not a hash: {}", item))
					})
				})
				.collect::<Result<Vec<_>, _>>()?,
			// With `source` or `threshold` set, blocks are keyed by hash.
			Value::Object(entries) => entries.keys().cloned().collect(),
			other => {
				return Err(NodeError::MalformedReply(format!(
					"blocks has unexpected shape: {}",
					other
				)));
			}
		};

		hashes.truncate(PENDING_COUNT);
		Ok(hashes)
	}
}

fn raw_field(reply: &Value, field: &str) -> Result<u128, NodeError> {
	let value = reply
		.get(field)
		.ok_or_else(|| NodeError::MalformedReply(format!("missing {}", field)))?;
	let text = match value {
		Value::String(s) => s.as_str(),
		other => {
			return Err(NodeError::MalformedReply(format!(
				"{} is not a decimal string: {}",
				field, other
			)));
		}
	};
	text.parse::<u128>()
		.map_err(|e| NodeError::MalformedReply(format!("{} {:?} is not an amount: {}", field, text, e)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::node::NodePool;
	use crate::node::test_support::FakeNode;

	fn queries_answering<F>(answer: F) -> NodeQueries
	where
		F: Fn(&Value) -> Option<String> + Send + 'static,
	{
		let pool = Arc::new(NodePool::new());
		FakeNode::attach(&pool, "node-a").respond_with(answer);
		NodeQueries::new(Arc::new(Correlator::new(pool, None)))
	}

	#[tokio::test]
	async fn test_balance_reply_is_parsed() {
		let queries = queries_answering(|request| {
			assert_eq!(request["action"], "account_balance");
			Some(r#"{"balance":"100","pending":"0"}"#.to_string())
		});

		assert_eq!(queries.get_balance("xrb_1abc").await.unwrap(), (100, 0));
	}

	#[tokio::test]
	async fn test_balance_handles_full_raw_range() {
		let queries = queries_answering(|_| {
			Some(
				r#"{"balance":"340282366920938463463374607431768211455","pending":"1"}"#
					.to_string(),
			)
		});

		assert_eq!(queries.get_balance("xrb_1abc").await.unwrap(), (u128::MAX, 1));
	}

	#[tokio::test]
	async fn test_balance_missing_field_is_malformed() {
		let queries = queries_answering(|_| Some(r#"{"balance":"100"}"#.to_string()));

		assert!(matches!(
			queries.get_balance("xrb_1abc").await,
			Err(NodeError::MalformedReply(_))
		));
	}

	#[tokio::test]
	async fn test_balance_non_json_is_malformed() {
		let queries = queries_answering(|_| Some("not json".to_string()));

		assert!(matches!(
			queries.get_balance("xrb_1abc").await,
			Err(NodeError::MalformedReply(_))
		));
	}

	#[tokio::test]
	async fn test_frontier_for_queried_account() {
		let queries = queries_answering(|request| {
			assert_eq!(request["count"], "1");
			Some(r#"{"frontiers":{"xrb_1abc":"000D1BAEC8EC208142C99059B393051BAC8380F9B5A2E6B2489A277D81789F3F"}}"#.to_string())
		});

		assert_eq!(
			queries.get_previous_frontier_hash("xrb_1abc").await.unwrap(),
			PreviousHash::Block(
				"000D1BAEC8EC208142C99059B393051BAC8380F9B5A2E6B2489A277D81789F3F".to_string()
			)
		);
	}

	#[tokio::test]
	async fn test_frontier_for_other_account_means_unopened() {
		let queries =
			queries_answering(|_| Some(r#"{"frontiers":{"xrb_1zzz":"ABCDEF"}}"#.to_string()));

		let previous = queries.get_previous_frontier_hash("xrb_1abc").await.unwrap();
		assert_eq!(previous, PreviousHash::Unopened);
		assert_eq!(previous.as_str(), "");
	}

	#[tokio::test]
	async fn test_empty_frontier_entry_means_unopened() {
		let queries = queries_answering(|_| Some(r#"{"frontiers":{"xrb_1abc":""}}"#.to_string()));

		assert_eq!(
			queries.get_previous_frontier_hash("xrb_1abc").await.unwrap(),
			PreviousHash::Unopened
		);
	}

	#[tokio::test]
	async fn test_frontier_entry_of_wrong_type_is_malformed() {
		let queries = queries_answering(|_| Some(r#"{"frontiers":{"xrb_1abc":42}}"#.to_string()));

		assert!(matches!(
			queries.get_previous_frontier_hash("xrb_1abc").await,
			Err(NodeError::MalformedReply(_))
		));
	}

	#[tokio::test]
	async fn test_frontier_missing_is_malformed() {
		let queries = queries_answering(|_| Some(r#"{"error":"Bad account number"}"#.to_string()));

		assert!(matches!(
			queries.get_previous_frontier_hash("xrb_1abc").await,
			Err(NodeError::MalformedReply(_))
		));
	}

	#[tokio::test]
	async fn test_pending_array_is_capped() {
		let queries = queries_answering(|request| {
			assert_eq!(request["count"], "10");
			let hashes: Vec<String> = (0..12).map(|i| format!("H{}", i)).collect();
			Some(serde_json::json!({ "blocks": hashes }).to_string())
		});

		let unclaimed = queries.get_unclaimed_for_address("xrb_1abc").await.unwrap();
		assert_eq!(unclaimed.len(), 10);
		assert_eq!(unclaimed[0], "H0");
	}

	#[tokio::test]
	async fn test_pending_empty_string_is_empty() {
		let queries = queries_answering(|_| Some(r#"{"blocks":""}"#.to_string()));

		assert!(
			queries
				.get_unclaimed_for_address("xrb_1abc")
				.await
				.unwrap()
				.is_empty()
		);
	}

	#[tokio::test]
	async fn test_pending_keyed_by_hash() {
		let queries = queries_answering(|_| {
			Some(r#"{"blocks":{"AAA":{"amount":"1"},"BBB":{"amount":"2"}}}"#.to_string())
		});

		let mut unclaimed = queries.get_unclaimed_for_address("xrb_1abc").await.unwrap();
		unclaimed.sort();
		assert_eq!(unclaimed, vec!["AAA".to_string(), "BBB".to_string()]);
	}
}
