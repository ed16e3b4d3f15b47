//! Block signing seam.
//!
//! Key material lives outside this crate. A signer receives the unsigned block contents
//! and returns the hex signature to attach.

use super::builder::TransactionError;

use serde_json::{Map, Value};

pub trait BlockSigner: Send + Sync {
	fn sign(&self, account: &str, block: &Map<String, Value>) -> Result<String, TransactionError>;
}

/// Signer for a wallet that only watches its addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOnly;

impl BlockSigner for WatchOnly {
	fn sign(&self, account: &str, _block: &Map<String, Value>) -> Result<String, TransactionError> {
		Err(TransactionError::SigningUnavailable(account.to_string()))
	}
}
