//! Wallet configuration, read from a TOML file.
//!
//! ```toml
//! work_server = "http://localhost:7076"
//! call_timeout_secs = 30
//!
//! [[nodes]]
//! url = "wss://node.example.org"
//!
//! [[accounts]]
//! addresses = ["xrb_1...", "xrb_3..."]
//! ```

use crate::wallet::{SEEN_BLOCK_CAPACITY, WalletError};

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// A node to keep a connection open to
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NodeConfig {
	pub url: String,
}

/// A watched account and the addresses derived from it, in index order
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AccountConfig {
	pub addresses: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WalletConfig {
	pub nodes: Vec<NodeConfig>,
	/// Proof-of-work server endpoint
	pub work_server: String,
	/// How long to wait for a node reply. Unset waits indefinitely.
	pub call_timeout_secs: Option<u64>,
	/// How long startup may take to fetch initial balances
	pub startup_timeout_secs: u64,
	/// Interval between full balance refreshes
	pub balance_refresh_secs: u64,
	/// Number of block notifications remembered for duplicate detection
	pub seen_block_capacity: usize,
	/// Upper bound on retrying the work server
	pub work_timeout_secs: u64,
	pub accounts: Vec<AccountConfig>,
}

impl Default for WalletConfig {
	fn default() -> Self {
		Self {
			nodes: Vec::new(),
			work_server: "http://localhost:7076".to_string(),
			call_timeout_secs: Some(30),
			startup_timeout_secs: 60,
			balance_refresh_secs: 60,
			seen_block_capacity: SEEN_BLOCK_CAPACITY,
			work_timeout_secs: 120,
			accounts: Vec::new(),
		}
	}
}

impl WalletConfig {
	/// Load and validate a configuration file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, WalletError> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path)
			.map_err(|e| WalletError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
		let config: Self = toml::from_str(&text)
			.map_err(|e| WalletError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), WalletError> {
		if self.nodes.is_empty() {
			return Err(WalletError::Config("No nodes configured".to_string()));
		}
		if self.accounts.iter().any(|account| account.addresses.is_empty()) {
			return Err(WalletError::Config(
				"Every account needs at least one address".to_string(),
			));
		}
		if self.seen_block_capacity == 0 {
			return Err(WalletError::Config(
				"seen_block_capacity must be positive".to_string(),
			));
		}
		if self.balance_refresh_secs == 0 {
			return Err(WalletError::Config(
				"balance_refresh_secs must be positive".to_string(),
			));
		}
		Ok(())
	}

	pub fn call_timeout(&self) -> Option<Duration> {
		self.call_timeout_secs.map(Duration::from_secs)
	}

	pub fn startup_timeout(&self) -> Duration {
		Duration::from_secs(self.startup_timeout_secs)
	}

	pub fn balance_refresh(&self) -> Duration {
		Duration::from_secs(self.balance_refresh_secs)
	}

	pub fn work_timeout(&self) -> Duration {
		Duration::from_secs(self.work_timeout_secs)
	}
}
