use clap::Parser;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use rai_wallet_sync::cli::{Command, Opt};
use rai_wallet_sync::config::WalletConfig;
use rai_wallet_sync::transaction::WatchOnly;
use rai_wallet_sync::utils::format_raw_amount;
use rai_wallet_sync::wallet::{WalletEvent, WalletService};

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let opt = Opt::parse();
	let config = match WalletConfig::load(&opt.config) {
		Ok(config) => config,
		Err(e) => {
			error!("Failed to load configuration: {}", e);
			return;
		}
	};
	info!("Loaded configuration from {}", opt.config.display());

	// Keys stay outside this process; blocks are built but signing is refused.
	let service = match WalletService::start(config, Arc::new(WatchOnly)).await {
		Ok(service) => service,
		Err(e) => {
			error!("Failed to start wallet service: {}", e);
			return;
		}
	};

	for address in service.registry().addresses() {
		if let Some(state) = service.registry().snapshot(&address) {
			info!(
				"{}: {} ({} pending, {} unclaimed block(s))",
				address,
				format_raw_amount(state.balance),
				format_raw_amount(state.pending_balance),
				state.unclaimed.len()
			);
		}
	}

	match opt.command.unwrap_or(Command::Watch) {
		Command::Watch => watch(&service).await,
		Command::Send { from, to, amount } => match service.send(&from, &to, amount).await {
			Ok(block) => info!("Submitted send block: {}", block.to_json()),
			Err(e) => error!("Failed to send from {}: {}", from, e),
		},
		Command::ChangeRepresentative {
			address,
			representative,
		} => match service.change_representative(&address, &representative).await {
			Ok(block) => info!("Submitted change block: {}", block.to_json()),
			Err(e) => error!("Failed to change representative of {}: {}", address, e),
		},
	}

	service.shutdown();
}

async fn watch(service: &WalletService) {
	let mut events = service.subscribe();
	loop {
		tokio::select! {
			event = events.recv() => match event {
				Ok(WalletEvent::IncomingBlock { address, hash }) => {
					info!("Incoming block {} for {}", hash, address);
				}
				Err(RecvError::Lagged(missed)) => warn!("Missed {} wallet event(s)", missed),
				Err(RecvError::Closed) => break,
			},
			_ = tokio::signal::ctrl_c() => {
				info!("Interrupted");
				break;
			}
		}
	}
}
