/// Ledger block builder for send and change blocks
pub mod builder;
/// Send and change-representative flows
pub mod orchestrator;
/// Block signing seam
pub mod signer;
/// Proof-of-work retrieval
pub mod work;

pub use builder::{BlockBuilder, BlockKind, LedgerBlock, TransactionError};
pub use orchestrator::TransactionOrchestrator;
pub use signer::{BlockSigner, WatchOnly};
pub use work::{RemoteWorkServer, WorkProvider};

/// Number of decimal places of one unit, in raw.
pub const RAW_DECIMALS: u32 = 30;
