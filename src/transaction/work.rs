//!
//! Proof-of-work retrieval.
//!
//! Work is computed elsewhere; the wallet only needs to wait for a value it can attach
//! to an account's next block. `RemoteWorkServer` asks an HTTP work server for it,
//! retrying transient failures with exponential backoff.

use crate::wallet::WalletError;

use async_trait::async_trait;
use backoff::{ExponentialBackoff, future::retry};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

/// Source of proof-of-work values for an account's next block
#[async_trait]
pub trait WorkProvider: Send + Sync {
	/// Wait until work for `address`'s next block is available.
	async fn work_for(&self, address: &str) -> Result<String, WalletError>;
}

/// Remote work server client
pub struct RemoteWorkServer {
	url: reqwest::Url,
	client: reqwest::Client,
	max_elapsed: Duration,
}

impl RemoteWorkServer {
	/// Creates a new work server client
	pub fn new(url: &str, max_elapsed: Duration) -> Result<Self, WalletError> {
		let url = reqwest::Url::parse(url)
			.map_err(|e| WalletError::Config(format!("Invalid work server URL {}: {}", url, e)))?;
		let client = reqwest::Client::builder()
			.pool_idle_timeout(None)
			.build()
			.map_err(|e| WalletError::StartupFailure(format!("Failed to create HTTP client: {}", e)))?;

		Ok(Self {
			url,
			client,
			max_elapsed,
		})
	}

	async fn request_work(&self, address: &str) -> Result<Value, backoff::Error<reqwest::Error>> {
		let resp = self
			.client
			.post(self.url.clone())
			.json(&json!({
				"action": "work_generate",
				"account": address,
			}))
			.send()
			.await
			.map_err(|e| {
				warn!("Work server send error: {:?}", e);
				backoff::Error::transient(e)
			})?;

		let resp = resp.error_for_status().map_err(|e| {
			warn!("Work server response error: {:?}", e);
			backoff::Error::transient(e)
		})?;

		resp.json::<Value>().await.map_err(backoff::Error::permanent)
	}
}

#[async_trait]
impl WorkProvider for RemoteWorkServer {
	async fn work_for(&self, address: &str) -> Result<String, WalletError> {
		let policy = ExponentialBackoff {
			max_elapsed_time: Some(self.max_elapsed),
			..ExponentialBackoff::default()
		};

		let reply = retry(policy, || self.request_work(address))
			.await
			.map_err(|e| WalletError::Work(format!("Work server unreachable: {}", e)))?;

		let work = parse_work(&reply)?;
		debug!("Received work {} for {}", work, address);
		Ok(work)
	}
}

fn parse_work(reply: &Value) -> Result<String, WalletError> {
	if let Some(error) = reply.get("error").and_then(Value::as_str) {
		return Err(WalletError::Work(error.to_string()));
	}
	reply
		.get("work")
		.and_then(Value::as_str)
		.filter(|work| !work.is_empty())
		.map(str::to_string)
		.ok_or_else(|| WalletError::Work(format!("Reply has no work field: {}", reply)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_work() {
		assert_eq!(
			parse_work(&json!({"work": "2bf29ef00786a6bc"})).unwrap(),
			"2bf29ef00786a6bc"
		);
		assert!(matches!(
			parse_work(&json!({"error": "Cancelled"})),
			Err(WalletError::Work(message)) if message == "Cancelled"
		));
		assert!(parse_work(&json!({"work": ""})).is_err());
		assert!(parse_work(&json!({})).is_err());
	}

	#[test]
	fn test_rejects_invalid_url() {
		assert!(matches!(
			RemoteWorkServer::new("not a url", Duration::from_secs(1)),
			Err(WalletError::Config(_))
		));
	}
}
