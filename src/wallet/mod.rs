pub mod balance;
pub mod notifications;
pub mod queries;
pub mod registry;
mod seen_blocks;
pub mod service;
pub mod types;

pub use balance::{BalanceRefresh, BalanceUpdater, BalanceUpdaterHandle};
pub use notifications::{BlockNotificationPipeline, BlockOutcome};
pub use queries::{NodeQueries, PreviousHash};
pub use registry::{Address, AddressDerivation, AddressRegistry, WatchList};
pub use seen_blocks::SEEN_BLOCK_CAPACITY;
pub use service::WalletService;
pub use types::*;
