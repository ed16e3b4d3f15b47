use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "wallet.toml";

#[derive(Debug, Parser)]
#[command(name = "rai-wallet-sync", about = "Track and spend from a RaiBlocks wallet")]
pub struct Opt {
	#[arg(short, long, default_value = DEFAULT_CONFIG_PATH, help = "Path to the wallet configuration")]
	pub config: PathBuf,

	/// Watching when unset.
	#[command(subcommand)]
	pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
	#[command(name = "watch", about = "Follow balances and incoming blocks until interrupted")]
	Watch,
	#[command(name = "send", about = "Send raw from one of the wallet's addresses")]
	Send {
		#[arg(help = "Sending address, held by this wallet")]
		from: String,
		#[arg(help = "Destination address")]
		to: String,
		#[arg(help = "Amount in raw")]
		amount: u128,
	},
	#[command(name = "change-representative", about = "Delegate an address's voting weight")]
	ChangeRepresentative {
		#[arg(help = "Address held by this wallet")]
		address: String,
		#[arg(help = "New representative")]
		representative: String,
	},
}
