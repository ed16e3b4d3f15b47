//! Ledger block builder
//!
//! This module provides a builder pattern for assembling the send and change blocks the
//! wallet submits to nodes.

use super::signer::BlockSigner;
use crate::node::Request;

use serde_json::{Map, Value, json};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum TransactionError {
	#[error("Block is missing {0}")]
	MissingField(&'static str),

	#[error("No signing key available for {0}")]
	SigningUnavailable(String),
}

/// What a block does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
	/// Move funds to `destination`, leaving `balance` raw on the sending account.
	Send { destination: String, balance: u128 },
	/// Delegate the account's voting weight to `representative`.
	Change { representative: String },
}

impl BlockKind {
	pub fn type_name(&self) -> &'static str {
		match self {
			BlockKind::Send { .. } => "send",
			BlockKind::Change { .. } => "change",
		}
	}
}

/// A signed block ready for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerBlock {
	pub account: String,
	pub kind: BlockKind,
	pub previous: String,
	pub work: String,
	pub signature: String,
}

impl LedgerBlock {
	/// The block contents as a JSON object, without the signature.
	pub fn contents(&self) -> Map<String, Value> {
		unsigned_contents(&self.kind, &self.previous, &self.work)
	}

	pub fn to_json(&self) -> Value {
		let mut contents = self.contents();
		contents.insert("signature".to_string(), Value::String(self.signature.clone()));
		Value::Object(contents)
	}

	/// Wrap the block in a fire-and-forget `process` submission.
	pub fn process_request(&self) -> Request {
		Request::submit(&json!({
			"action": "process",
			"block": self.to_json().to_string(),
		}))
	}
}

fn unsigned_contents(kind: &BlockKind, previous: &str, work: &str) -> Map<String, Value> {
	let mut contents = Map::new();
	contents.insert("type".to_string(), Value::String(kind.type_name().to_string()));
	contents.insert("previous".to_string(), Value::String(previous.to_string()));
	match kind {
		BlockKind::Send {
			destination,
			balance,
		} => {
			contents.insert("destination".to_string(), Value::String(destination.clone()));
			contents.insert(
				"balance".to_string(),
				Value::String(format!("{:032X}", balance)),
			);
		}
		BlockKind::Change { representative } => {
			contents.insert(
				"representative".to_string(),
				Value::String(representative.clone()),
			);
		}
	}
	contents.insert("work".to_string(), Value::String(work.to_string()));
	contents
}

/// Builder for ledger blocks
#[derive(Default)]
pub struct BlockBuilder {
	account: Option<String>,
	kind: Option<BlockKind>,
	previous: Option<String>,
	work: Option<String>,
	signer: Option<Arc<dyn BlockSigner>>,
}

impl BlockBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the account the block belongs to
	pub fn with_account(mut self, account: &str) -> Self {
		self.account = Some(account.to_string());
		self
	}

	pub fn with_kind(mut self, kind: BlockKind) -> Self {
		self.kind = Some(kind);
		self
	}

	/// Sets the frontier hash this block follows
	pub fn with_previous(mut self, previous: &str) -> Self {
		self.previous = Some(previous.to_string());
		self
	}

	pub fn with_work(mut self, work: &str) -> Self {
		self.work = Some(work.to_string());
		self
	}

	pub fn with_signer(mut self, signer: Arc<dyn BlockSigner>) -> Self {
		self.signer = Some(signer);
		self
	}

	/// Assemble and sign the block
	pub fn build(self) -> Result<LedgerBlock, TransactionError> {
		let account = self.account.ok_or(TransactionError::MissingField("account"))?;
		let kind = self.kind.ok_or(TransactionError::MissingField("kind"))?;
		let previous = self
			.previous
			.ok_or(TransactionError::MissingField("previous"))?;
		let work = self.work.ok_or(TransactionError::MissingField("work"))?;
		let signer = self.signer.ok_or(TransactionError::MissingField("signer"))?;

		let contents = unsigned_contents(&kind, &previous, &work);
		let signature = signer.sign(&account, &contents)?;
		debug!("Built {} block for {}", kind.type_name(), account);

		Ok(LedgerBlock {
			account,
			kind,
			previous,
			work,
			signature,
		})
	}
}
