use crate::node::NodeError;
use crate::transaction::builder::TransactionError;

/// Events emitted by the wallet core for interested consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
	/// A send block destined for one of our addresses was seen and queued for claiming
	IncomingBlock { address: String, hash: String },
}

/// Error types for wallet operations
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
	#[error("Node error: {0}")]
	Node(#[from] NodeError),

	#[error("Transaction error: {0}")]
	Transaction(#[from] TransactionError),

	#[error("Insufficient funds: {requested} raw requested, {available} raw available")]
	InsufficientFunds { available: u128, requested: u128 },

	#[error("Address {0} is not held by this wallet")]
	UnknownAddress(String),

	#[error("Account {0} has not been opened yet")]
	UnopenedAccount(String),

	#[error("Derivation error: {0}")]
	Derivation(String),

	#[error("Proof-of-work error: {0}")]
	Work(String),

	#[error("Startup failure: {0}")]
	StartupFailure(String),

	#[error("Config error: {0}")]
	Config(String),
}
