//! Balance refresh loop.
//!
//! Keeps the registry's balances current: every address is refreshed on a fixed interval
//! and individual addresses can be refreshed on demand, e.g. right after a send. When a
//! node reports a pending balance the pending block hashes are fetched and merged into
//! the address's unclaimed queue, so blocks pushed while we were offline are not lost.

use super::queries::NodeQueries;
use super::registry::AddressRegistry;
use crate::node::NodeError;
use crate::utils::format_raw_amount;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Something that can schedule a balance refresh for an address.
pub trait BalanceRefresh: Send + Sync {
	fn request_refresh(&self, address: &str);
}

pub struct BalanceUpdater {
	queries: NodeQueries,
	registry: Arc<AddressRegistry>,
	interval: Duration,
	requests: mpsc::UnboundedReceiver<String>,
	initial_pass: watch::Sender<bool>,
}

/// Cloneable handle to a running [`BalanceUpdater`].
#[derive(Clone)]
pub struct BalanceUpdaterHandle {
	requests: mpsc::UnboundedSender<String>,
	initial_pass: watch::Receiver<bool>,
}

impl BalanceUpdater {
	pub fn new(
		queries: NodeQueries,
		registry: Arc<AddressRegistry>,
		interval: Duration,
	) -> (Self, BalanceUpdaterHandle) {
		let (requests_tx, requests_rx) = mpsc::unbounded_channel();
		let (pass_tx, pass_rx) = watch::channel(false);
		(
			Self {
				queries,
				registry,
				interval,
				requests: requests_rx,
				initial_pass: pass_tx,
			},
			BalanceUpdaterHandle {
				requests: requests_tx,
				initial_pass: pass_rx,
			},
		)
	}

	/// Run until every handle is dropped.
	pub async fn run(mut self) {
		self.refresh_all().await;
		self.initial_pass.send_replace(true);
		info!("Initial balance check complete");

		let mut ticker = tokio::time::interval(self.interval);
		// The first tick completes immediately and the initial pass already ran.
		ticker.tick().await;

		loop {
			tokio::select! {
				_ = ticker.tick() => self.refresh_all().await,
				request = self.requests.recv() => match request {
					Some(address) => self.refresh_logged(&address).await,
					None => {
						debug!("All balance refresh handles dropped, stopping");
						return;
					}
				},
			}
		}
	}

	async fn refresh_all(&self) {
		for address in self.registry.addresses() {
			self.refresh_logged(&address).await;
		}
	}

	async fn refresh_logged(&self, address: &str) {
		if let Err(e) = self.refresh(address).await {
			warn!("Failed to refresh balance of {}: {}", address, e);
		}
	}

	async fn refresh(&self, address: &str) -> Result<(), NodeError> {
		let (balance, pending) = self.queries.get_balance(address).await?;
		if let Err(e) = self.registry.set_balance(address, balance, pending) {
			warn!("Balance for untracked address {}: {}", address, e);
			return Ok(());
		}
		debug!(
			"{} holds {} ({} pending)",
			address,
			format_raw_amount(balance),
			format_raw_amount(pending)
		);

		if pending > 0 {
			for hash in self.queries.get_unclaimed_for_address(address).await? {
				if let Ok(true) = self.registry.record_unclaimed(address, &hash) {
					info!("Found unclaimed block {} for {}", hash, address);
				}
			}
		}
		Ok(())
	}
}

impl BalanceUpdaterHandle {
	/// Wait until the updater has checked every address once.
	pub async fn wait_initial_pass(&self) {
		let mut initial_pass = self.initial_pass.clone();
		// An error means the updater stopped; nothing left to wait for.
		let _ = initial_pass.wait_for(|done| *done).await;
	}

	pub fn has_initially_checked(&self) -> bool {
		*self.initial_pass.borrow()
	}
}

impl BalanceRefresh for BalanceUpdaterHandle {
	fn request_refresh(&self, address: &str) {
		if self.requests.send(address.to_string()).is_err() {
			warn!("Balance updater stopped; refresh of {} dropped", address);
		}
	}
}
