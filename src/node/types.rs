//! Wire types for talking to ledger nodes.

use serde_json::{Value, json};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

/// Number of frontiers requested when looking up an account's previous hash.
pub const FRONTIER_COUNT: u32 = 1;
/// Number of pending blocks requested per account.
pub const PENDING_COUNT: usize = 10;

/// A request sent to the node pool.
///
/// The body is the exact byte sequence handed to the transport. It doubles as the
/// correlation key: two requests are equal when their bodies are byte-equal,
/// regardless of whether a reply is expected.
#[derive(Debug, Clone)]
pub struct Request {
    body: Arc<[u8]>,
    expects_reply: bool,
}

impl Request {
    /// A query whose reply is correlated back to the caller.
    pub fn query(document: &Value) -> Self {
        Self {
            body: document.to_string().into_bytes().into(),
            expects_reply: true,
        }
    }

    /// A fire-and-forget submission; no reply is awaited.
    pub fn submit(document: &Value) -> Self {
        Self {
            body: document.to_string().into_bytes().into(),
            expects_reply: false,
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn expects_reply(&self) -> bool {
        self.expects_reply
    }

    /// Parse the body back into a JSON document.
    pub fn document(&self) -> Result<Value, NodeError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.body == other.body
    }
}

impl Eq for Request {}

impl Hash for Request {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.body.hash(state);
    }
}

/// `{"action": "account_balance", "account": ...}`
pub fn account_balance(account: &str) -> Value {
    json!({
        "action": "account_balance",
        "account": account,
    })
}

/// `{"action": "frontiers", "account": ..., "count": "1"}`
pub fn frontiers(account: &str) -> Value {
    json!({
        "action": "frontiers",
        "account": account,
        "count": FRONTIER_COUNT.to_string(),
    })
}

/// `{"action": "pending", "account": ..., "count": "10"}`
pub fn pending(account: &str) -> Value {
    json!({
        "action": "pending",
        "account": account,
        "count": PENDING_COUNT.to_string(),
    })
}

/// Error types for node transport and reply handling
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("No connected node available")]
    TransportUnavailable,

    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    #[error("No matching reply within {0:?}")]
    Timeout(Duration),

    #[error("Call cancelled")]
    Cancelled,

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}
