use super::balance::{BalanceUpdater, BalanceUpdaterHandle};
use super::notifications::BlockNotificationPipeline;
use super::queries::NodeQueries;
use super::registry::{AddressRegistry, WatchList};
use super::types::{WalletError, WalletEvent};
use crate::config::WalletConfig;
use crate::node::{Correlator, NodeConnection, NodePool};
use crate::transaction::{BlockSigner, LedgerBlock, RemoteWorkServer, TransactionOrchestrator};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A running wallet: node connections, notification pipeline, balance loop and the
/// transaction flows, wired together.
pub struct WalletService {
	pool: Arc<NodePool>,
	registry: Arc<AddressRegistry>,
	queries: NodeQueries,
	pipeline: Arc<BlockNotificationPipeline>,
	orchestrator: TransactionOrchestrator,
	balances: BalanceUpdaterHandle,
	tasks: Vec<JoinHandle<()>>,
}

impl WalletService {
	/// Connect to the configured nodes and wait for the first balance check.
	///
	/// Fails with `StartupFailure` when no node connects, or the first balance check does
	/// not finish, within the configured startup timeout.
	pub async fn start(config: WalletConfig, signer: Arc<dyn BlockSigner>) -> Result<Self, WalletError> {
		config.validate()?;
		if config.accounts.is_empty() {
			return Err(WalletError::StartupFailure("No accounts configured".to_string()));
		}

		let registry = Arc::new(AddressRegistry::new());
		for account in &config.accounts {
			let position = registry.add_account(Box::new(WatchList::new(account.addresses.clone())))?;
			for index in 1..account.addresses.len() {
				registry.address_for_index(position, index as u32)?;
			}
		}
		info!(
			"Watching {} address(es) across {} account(s)",
			registry.addresses().len(),
			registry.account_count()
		);

		let work = Arc::new(RemoteWorkServer::new(&config.work_server, config.work_timeout())?);

		let pool = Arc::new(NodePool::new());
		let pipeline = Arc::new(BlockNotificationPipeline::new(
			registry.clone(),
			config.seen_block_capacity,
		));
		pool.add_observer(pipeline.clone());

		let mut tasks: Vec<JoinHandle<()>> = config
			.nodes
			.iter()
			.map(|node| NodeConnection::spawn(node.url.clone(), pool.clone()))
			.collect();

		let correlator = Arc::new(Correlator::new(pool.clone(), config.call_timeout()));
		let queries = NodeQueries::new(correlator);
		let (updater, balances) =
			BalanceUpdater::new(queries.clone(), registry.clone(), config.balance_refresh());

		let startup = async {
			while pool.connected_count() == 0 {
				tokio::time::sleep(CONNECT_POLL_INTERVAL).await;
			}
			info!("Connected to {} node(s)", pool.connected_count());
			tasks.push(tokio::spawn(updater.run()));
			balances.wait_initial_pass().await;
		};

		if tokio::time::timeout(config.startup_timeout(), startup).await.is_err() {
			error!(
				"Startup did not complete within {:?}",
				config.startup_timeout()
			);
			for task in &tasks {
				task.abort();
			}
			return Err(WalletError::StartupFailure(format!(
				"No balances received within {:?}",
				config.startup_timeout()
			)));
		}

		let orchestrator = TransactionOrchestrator::new(
			queries.clone(),
			pool.clone(),
			registry.clone(),
			work,
			signer,
			Arc::new(balances.clone()),
		);

		info!("Wallet service started");
		Ok(Self {
			pool,
			registry,
			queries,
			pipeline,
			orchestrator,
			balances,
			tasks,
		})
	}

	pub fn pool(&self) -> &Arc<NodePool> {
		&self.pool
	}

	pub fn registry(&self) -> &Arc<AddressRegistry> {
		&self.registry
	}

	pub fn queries(&self) -> &NodeQueries {
		&self.queries
	}

	pub fn orchestrator(&self) -> &TransactionOrchestrator {
		&self.orchestrator
	}

	pub fn balances(&self) -> &BalanceUpdaterHandle {
		&self.balances
	}

	/// Receive wallet events emitted from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
		self.pipeline.subscribe()
	}

	pub async fn send(&self, from: &str, to: &str, raw_amount: u128) -> Result<LedgerBlock, WalletError> {
		self.orchestrator.send(from, to, raw_amount).await
	}

	pub async fn change_representative(
		&self,
		address: &str,
		representative: &str,
	) -> Result<LedgerBlock, WalletError> {
		self.orchestrator
			.change_representative(address, representative)
			.await
	}

	/// Stop the node connections and the balance loop.
	pub fn shutdown(self) {
		info!("Shutting down wallet service");
	}
}

impl Drop for WalletService {
	fn drop(&mut self) {
		for task in &self.tasks {
			task.abort();
		}
	}
}
