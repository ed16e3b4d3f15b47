//! Client-side coordination core of a RaiBlocks wallet.
//!
//! Talks to ledger nodes over websockets, correlates their replies back to the queries
//! that caused them, tracks balances and incoming sends for the wallet's addresses, and
//! builds and broadcasts send and change-representative blocks.

pub mod cli;
pub mod config;
pub mod node;
pub mod transaction;
pub mod utils;
pub mod wallet;
