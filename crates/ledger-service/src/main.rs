//! Main entry point for the ledger client CLI.
//!
//! Builds a `LedgerClient` from a configuration file, runs one command
//! against it and prints the result as JSON on stdout. Logs go to stderr.

use clap::{Parser, Subcommand};
use ledger_config::Config;
use ledger_core::LedgerClient;
use ledger_types::{format_tokens, TransactionId, TransferArgs};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

mod factory_registry;

use factory_registry::build_client_from_config;

/// Command-line arguments for the ledger client.
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

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
	/// Submit a transfer
	Transfer {
		/// Destination account
		#[arg(long)]
		to: String,
		/// Amount in e8s
		#[arg(long)]
		amount: u64,
		/// Fee in e8s
		#[arg(long)]
		fee: u64,
		/// Correlation value stored with the transaction
		#[arg(long, default_value_t = 0)]
		memo: u64,
		/// Wait until the transfer is confirmed or fails
		#[arg(long)]
		wait: bool,
	},
	/// Show one transaction
	Show {
		/// Transaction id, e.g. `123` or `local-0`
		id: TransactionId,
	},
	/// List transactions waiting for confirmation
	Pending,
	/// List every recorded transaction
	History,
	/// Query the balance of an account
	Balance {
		account: String,
	},
	/// Delete the transaction history
	Clear,
}

/// Main entry point for the ledger client.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging to stderr
/// 3. Loads configuration from file
/// 4. Builds and initializes the client
/// 5. Runs the command and tears the client down
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr)
		.with_target(true)
		.init();

	let config = Config::from_file(&args.config).await?;
	tracing::info!("Loaded configuration [{}]", config.client.id);
	let poll_interval = config.monitor.poll_interval();

	let (client, identity) = build_client_from_config(config)?;
	client.initialize(&identity).await?;

	let result = run(&client, args.command, poll_interval).await;
	client.destroy().await;

	let output = result?;
	println!("{}", serde_json::to_string_pretty(&output)?);
	Ok(())
}

/// Runs one command and returns its JSON output.
async fn run(
	client: &LedgerClient,
	command: Command,
	poll_interval: Duration,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
	let output = match command {
		Command::Transfer {
			to,
			amount,
			fee,
			memo,
			wait,
		} => {
			let args = TransferArgs::new(to, amount, fee).with_memo(memo);
			let id = client.transfer(args).await?;
			if wait {
				wait_for_settlement(client, &id, poll_interval).await;
			}
			serde_json::to_value(client.get_transaction(&id).await)?
		},
		Command::Show { id } => match client.get_transaction(&id).await {
			Some(record) => serde_json::to_value(record)?,
			None => return Err(format!("Transaction {} not found", id).into()),
		},
		Command::Pending => serde_json::to_value(client.get_pending_transactions().await)?,
		Command::History => serde_json::to_value(client.get_transactions().await)?,
		Command::Balance { account } => {
			let balance = client.get_balance(&account).await?;
			json!({
				"account": account,
				"e8s": balance.e8s.to_string(),
				"tokens": format_tokens(balance.e8s),
			})
		},
		Command::Clear => {
			client.clear_history().await?;
			json!({ "cleared": true })
		},
	};
	Ok(output)
}

/// Polls the record until it leaves the pending state.
async fn wait_for_settlement(client: &LedgerClient, id: &TransactionId, poll_interval: Duration) {
	tracing::info!(tx_id = %id, "Waiting for settlement");
	loop {
		match client.get_transaction(id).await {
			Some(record) if record.is_pending() => {},
			_ => return,
		}
		tokio::time::sleep(poll_interval).await;
	}
}
