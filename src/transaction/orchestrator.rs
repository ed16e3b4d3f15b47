//! Send and change-representative flows.
//!
//! Both flows need two independent inputs before a block can be built: proof-of-work for
//! the account's next block and the hash of its current frontier. They are awaited
//! together, and the finished block is broadcast to every connected node.

use super::builder::{BlockBuilder, BlockKind, LedgerBlock};
use super::signer::BlockSigner;
use super::work::WorkProvider;
use crate::node::NodePool;
use crate::utils::format_raw_amount;
use crate::wallet::{AddressRegistry, BalanceRefresh, NodeQueries, PreviousHash, WalletError};

use std::sync::Arc;
use tracing::{debug, info};

pub struct TransactionOrchestrator {
	queries: NodeQueries,
	pool: Arc<NodePool>,
	registry: Arc<AddressRegistry>,
	work: Arc<dyn WorkProvider>,
	signer: Arc<dyn BlockSigner>,
	refresher: Arc<dyn BalanceRefresh>,
}

impl TransactionOrchestrator {
	pub fn new(
		queries: NodeQueries,
		pool: Arc<NodePool>,
		registry: Arc<AddressRegistry>,
		work: Arc<dyn WorkProvider>,
		signer: Arc<dyn BlockSigner>,
		refresher: Arc<dyn BalanceRefresh>,
	) -> Self {
		Self {
			queries,
			pool,
			registry,
			work,
			signer,
			refresher,
		}
	}

	/// Send `raw_amount` from `from` to `to`.
	///
	/// Fails with `InsufficientFunds` before touching the network when the last known
	/// balance of `from` does not cover the amount.
	pub async fn send(&self, from: &str, to: &str, raw_amount: u128) -> Result<LedgerBlock, WalletError> {
		let sender = self
			.registry
			.snapshot(from)
			.ok_or_else(|| WalletError::UnknownAddress(from.to_string()))?;
		let remaining = sender
			.balance
			.checked_sub(raw_amount)
			.ok_or(WalletError::InsufficientFunds {
				available: sender.balance,
				requested: raw_amount,
			})?;

		info!(
			"Sending {} from {} to {}",
			format_raw_amount(raw_amount),
			from,
			to
		);

		let (previous, work) = self.frontier_and_work(from).await?;
		let block = BlockBuilder::new()
			.with_account(from)
			.with_kind(BlockKind::Send {
				destination: to.to_string(),
				balance: remaining,
			})
			.with_previous(&previous)
			.with_work(&work)
			.with_signer(self.signer.clone())
			.build()?;

		self.submit(&block)?;
		self.refresher.request_refresh(from);
		info!(
			"Send submitted, {} left on {}",
			format_raw_amount(remaining),
			from
		);
		Ok(block)
	}

	/// Delegate the voting weight of `address` to `representative`.
	pub async fn change_representative(
		&self,
		address: &str,
		representative: &str,
	) -> Result<LedgerBlock, WalletError> {
		self.registry.set_representative(address, representative)?;
		info!("Changing representative of {} to {}", address, representative);

		let (previous, work) = self.frontier_and_work(address).await?;
		let block = BlockBuilder::new()
			.with_account(address)
			.with_kind(BlockKind::Change {
				representative: representative.to_string(),
			})
			.with_previous(&previous)
			.with_work(&work)
			.with_signer(self.signer.clone())
			.build()?;

		self.submit(&block)?;
		Ok(block)
	}

	/// Frontier hash and work for `address`'s next block, fetched concurrently.
	///
	/// The first failure abandons the other fetch.
	async fn frontier_and_work(&self, address: &str) -> Result<(String, String), WalletError> {
		let (previous, work) =
			tokio::try_join!(self.previous_block(address), self.work.work_for(address))?;
		debug!("Next block on {} follows {} with work {}", address, previous, work);
		Ok((previous, work))
	}

	async fn previous_block(&self, address: &str) -> Result<String, WalletError> {
		match self.queries.get_previous_frontier_hash(address).await? {
			PreviousHash::Block(hash) => Ok(hash),
			PreviousHash::Unopened => Err(WalletError::UnopenedAccount(address.to_string())),
		}
	}

	fn submit(&self, block: &LedgerBlock) -> Result<(), WalletError> {
		self.pool.broadcast(block.process_request())?;
		debug!(
			"Broadcast {} block for {} to {} node(s)",
			block.kind.type_name(),
			block.account,
			self.pool.connected_count()
		);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::node::test_support::FakeNode;
	use crate::node::{Correlator, NodeError};
	use crate::transaction::TransactionError;
	use crate::wallet::WatchList;
	use async_trait::async_trait;
	use parking_lot::Mutex;
	use serde_json::{Map, Value};
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	const FROM: &str = "xrb_1from";
	const TO: &str = "xrb_1to";
	const FRONTIER: &str = "991CF190094C00F0B68E2E5F75F6BEE95A2E0BD93CEAA4A6734DB9F19B728948";

	struct FixedWork {
		calls: AtomicUsize,
	}

	#[async_trait]
	impl WorkProvider for FixedWork {
		async fn work_for(&self, _address: &str) -> Result<String, WalletError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			Ok("2bf29ef00786a6bc".to_string())
		}
	}

	struct TypeSigner;

	impl BlockSigner for TypeSigner {
		fn sign(&self, account: &str, block: &Map<String, Value>) -> Result<String, TransactionError> {
			Ok(format!("{}:{}", account, block["type"].as_str().unwrap_or_default()))
		}
	}

	#[derive(Default)]
	struct RecordingRefresh {
		requested: Mutex<Vec<String>>,
	}

	impl BalanceRefresh for RecordingRefresh {
		fn request_refresh(&self, address: &str) {
			self.requested.lock().push(address.to_string());
		}
	}

	struct Harness {
		orchestrator: TransactionOrchestrator,
		registry: Arc<AddressRegistry>,
		work: Arc<FixedWork>,
		refresher: Arc<RecordingRefresh>,
		submitted: Arc<Mutex<Vec<Value>>>,
		queries_seen: Arc<AtomicUsize>,
	}

	fn harness(frontiers: &'static str) -> Harness {
		let pool = Arc::new(NodePool::new());
		let submitted = Arc::new(Mutex::new(Vec::new()));
		let queries_seen = Arc::new(AtomicUsize::new(0));
		let counter = queries_seen.clone();
		FakeNode::attach(&pool, "node-a").serve(
			move |request| {
				counter.fetch_add(1, Ordering::SeqCst);
				assert_eq!(request["action"], "frontiers");
				Some(frontiers.to_string())
			},
			submitted.clone(),
		);

		let registry = Arc::new(AddressRegistry::new());
		registry
			.add_account(Box::new(WatchList::new(vec![FROM.to_string()])))
			.unwrap();
		registry.set_balance(FROM, 100, 0).unwrap();

		let work = Arc::new(FixedWork {
			calls: AtomicUsize::new(0),
		});
		let refresher = Arc::new(RecordingRefresh::default());
		let correlator = Arc::new(Correlator::new(pool.clone(), Some(Duration::from_secs(5))));
		let orchestrator = TransactionOrchestrator::new(
			NodeQueries::new(correlator),
			pool,
			registry.clone(),
			work.clone(),
			Arc::new(TypeSigner),
			refresher.clone(),
		);

		Harness {
			orchestrator,
			registry,
			work,
			refresher,
			submitted,
			queries_seen,
		}
	}

	async fn wait_for_submission(submitted: &Arc<Mutex<Vec<Value>>>) -> Value {
		for _ in 0..100 {
			if let Some(document) = submitted.lock().first() {
				return document.clone();
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		panic!("no block was submitted");
	}

	const OPENED: &str = r#"{"frontiers":{"xrb_1from":"991CF190094C00F0B68E2E5F75F6BEE95A2E0BD93CEAA4A6734DB9F19B728948"}}"#;

	#[tokio::test]
	async fn test_insufficient_funds_makes_no_network_call() {
		let h = harness(OPENED);

		let result = h.orchestrator.send(FROM, TO, 150).await;

		assert!(matches!(
			result,
			Err(WalletError::InsufficientFunds {
				available: 100,
				requested: 150
			})
		));
		assert_eq!(h.queries_seen.load(Ordering::SeqCst), 0);
		assert_eq!(h.work.calls.load(Ordering::SeqCst), 0);
		assert!(h.submitted.lock().is_empty());
		assert!(h.refresher.requested.lock().is_empty());
	}

	#[tokio::test]
	async fn test_send_broadcasts_signed_block() {
		let h = harness(OPENED);

		let block = h.orchestrator.send(FROM, TO, 40).await.unwrap();

		assert_eq!(block.previous, FRONTIER);
		assert_eq!(block.work, "2bf29ef00786a6bc");
		assert_eq!(block.signature, "xrb_1from:send");
		assert_eq!(
			block.kind,
			BlockKind::Send {
				destination: TO.to_string(),
				balance: 60
			}
		);

		let document = wait_for_submission(&h.submitted).await;
		assert_eq!(document["action"], "process");
		let embedded: Value = serde_json::from_str(document["block"].as_str().unwrap()).unwrap();
		assert_eq!(embedded, block.to_json());
		assert_eq!(*h.refresher.requested.lock(), vec![FROM.to_string()]);
	}

	#[tokio::test]
	async fn test_send_of_entire_balance_is_allowed() {
		let h = harness(OPENED);

		let block = h.orchestrator.send(FROM, TO, 100).await.unwrap();

		assert!(matches!(block.kind, BlockKind::Send { balance: 0, .. }));
	}

	#[tokio::test]
	async fn test_send_from_unknown_address() {
		let h = harness(OPENED);

		assert!(matches!(
			h.orchestrator.send("xrb_1nobody", TO, 1).await,
			Err(WalletError::UnknownAddress(_))
		));
	}

	#[tokio::test]
	async fn test_send_from_unopened_account() {
		let h = harness(r#"{"frontiers":{"xrb_1zzz":"ABCDEF"}}"#);

		assert!(matches!(
			h.orchestrator.send(FROM, TO, 10).await,
			Err(WalletError::UnopenedAccount(address)) if address == FROM
		));
		assert!(h.submitted.lock().is_empty());
	}

	struct StalledWork;

	#[async_trait]
	impl WorkProvider for StalledWork {
		async fn work_for(&self, _address: &str) -> Result<String, WalletError> {
			std::future::pending().await
		}
	}

	#[tokio::test]
	async fn test_unopened_account_does_not_wait_for_work() {
		let pool = Arc::new(NodePool::new());
		FakeNode::attach(&pool, "node-a")
			.respond_with(|_| Some(r#"{"frontiers":{"xrb_1zzz":"ABCDEF"}}"#.to_string()));
		let registry = Arc::new(AddressRegistry::new());
		registry
			.add_account(Box::new(WatchList::new(vec![FROM.to_string()])))
			.unwrap();
		registry.set_balance(FROM, 100, 0).unwrap();
		let orchestrator = TransactionOrchestrator::new(
			NodeQueries::new(Arc::new(Correlator::new(pool.clone(), None))),
			pool,
			registry,
			Arc::new(StalledWork),
			Arc::new(TypeSigner),
			Arc::new(RecordingRefresh::default()),
		);

		let result = tokio::time::timeout(Duration::from_secs(5), orchestrator.send(FROM, TO, 10))
			.await
			.expect("send waited for work after the frontier lookup failed");
		assert!(matches!(result, Err(WalletError::UnopenedAccount(_))));
	}

	#[tokio::test]
	async fn test_change_representative_records_and_broadcasts() {
		let h = harness(OPENED);

		let block = h
			.orchestrator
			.change_representative(FROM, "xrb_1rep")
			.await
			.unwrap();

		assert_eq!(
			h.registry.snapshot(FROM).unwrap().representative.as_deref(),
			Some("xrb_1rep")
		);
		assert_eq!(block.signature, "xrb_1from:change");
		let document = wait_for_submission(&h.submitted).await;
		let embedded: Value = serde_json::from_str(document["block"].as_str().unwrap()).unwrap();
		assert_eq!(embedded["representative"], "xrb_1rep");
		assert_eq!(embedded["previous"], FRONTIER);
	}

	#[tokio::test]
	async fn test_send_without_nodes_is_transport_unavailable() {
		let pool = Arc::new(NodePool::new());
		let registry = Arc::new(AddressRegistry::new());
		registry
			.add_account(Box::new(WatchList::new(vec![FROM.to_string()])))
			.unwrap();
		registry.set_balance(FROM, 100, 0).unwrap();
		let orchestrator = TransactionOrchestrator::new(
			NodeQueries::new(Arc::new(Correlator::new(pool.clone(), None))),
			pool,
			registry,
			Arc::new(FixedWork {
				calls: AtomicUsize::new(0),
			}),
			Arc::new(TypeSigner),
			Arc::new(RecordingRefresh::default()),
		);

		assert!(matches!(
			orchestrator.send(FROM, TO, 10).await,
			Err(WalletError::Node(NodeError::TransportUnavailable))
		));
	}
}
