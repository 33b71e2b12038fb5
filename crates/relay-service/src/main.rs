//! Main entry point for the bridge relay.
//!
//! The `relay` binary deploys the bridge contract, watches the bridge
//! contracts of the configured networks for events, and reports the state
//! of submitted transactions.

use clap::{Parser, Subcommand};
use relay_config::Config;
use relay_types::{Bytes, CancelToken, TransactionHash};
use std::path::PathBuf;
use std::time::Duration;

mod factory_registry;
mod relay;
mod sink;

use relay::Relay;

/// Command-line arguments for the relay.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Watch the bridge contracts until interrupted
	Watch {
		/// Stop after this many seconds
		#[arg(long)]
		duration_secs: Option<u64>,
	},
	/// Deploy the bridge contract to a network
	Deploy {
		#[arg(long)]
		network: String,
		/// File holding the hex-encoded creation bytecode
		#[arg(long)]
		bytecode: PathBuf,
		#[arg(long)]
		gas_limit: Option<u64>,
	},
	/// Show the current state of a transaction
	Status {
		#[arg(long)]
		network: String,
		#[arg(long)]
		hash: TransactionHash,
	},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let config = Config::from_file(&args.config).await?;
	tracing::info!("Loaded configuration [{}]", config.relay.id);

	let storage = factory_registry::build_storage(&config)?;
	let account = factory_registry::build_account(&config)?;
	let clients = factory_registry::build_chain_clients(&config)?;
	let relay = Relay::new(config, storage, account, clients);

	match args.command {
		Command::Watch { duration_secs } => {
			let stats = relay.watch(shutdown_signal(duration_secs)).await?;
			println!("{}", serde_json::json!({
				"delivered": stats.delivered,
				"duplicates": stats.duplicates,
			}));
		},
		Command::Deploy {
			network,
			bytecode,
			gas_limit,
		} => {
			let content = tokio::fs::read_to_string(&bytecode).await?;
			let code = parse_bytecode(&content)?;

			let cancel = CancelToken::new();
			let on_interrupt = cancel.clone();
			tokio::spawn(async move {
				if tokio::signal::ctrl_c().await.is_ok() {
					tracing::warn!("Interrupted, abandoning confirmation wait");
					on_interrupt.cancel();
				}
			});

			let deployment = relay.deploy(&network, code, gas_limit, &cancel).await?;
			println!("{}", serde_json::to_string_pretty(&deployment)?);
		},
		Command::Status { network, hash } => {
			let outcome = relay.status(&network, hash).await?;
			println!("{}", serde_json::to_string_pretty(&outcome)?);
		},
	}

	Ok(())
}

/// Completes on Ctrl-C or once `duration_secs` have elapsed.
async fn shutdown_signal(duration_secs: Option<u64>) {
	let ctrl_c = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!("Failed to listen for Ctrl-C: {}", e);
			std::future::pending::<()>().await;
		}
	};

	match duration_secs {
		Some(secs) => tokio::select! {
			_ = ctrl_c => {},
			_ = tokio::time::sleep(Duration::from_secs(secs)) => {},
		},
		None => ctrl_c.await,
	}
	tracing::info!("Shutting down");
}

/// Parses hex bytecode, with or without `0x` and surrounding whitespace.
fn parse_bytecode(content: &str) -> Result<Bytes, String> {
	let trimmed = content.trim();
	let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
	if digits.is_empty() {
		return Err("Bytecode file is empty".to_string());
	}
	hex::decode(digits)
		.map(Bytes::from)
		.map_err(|e| format!("Invalid bytecode: {}", e))
}
