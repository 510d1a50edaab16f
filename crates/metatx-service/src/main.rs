use alloy::primitives::{Address, Bytes};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metatx_account::implementations::http::HttpProvider;
use metatx_account::implementations::local::LocalWallet;
use metatx_account::WalletProvider;
use metatx_config::{ConfigLoader, MetaTxConfig};
use metatx_core::MetaTxSdk;
use metatx_types::{ProviderInterface, SdkEvent};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "metatx")]
#[command(about = "Gasless transactions through the meta-transaction relayer", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	#[arg(short, long, value_name = "FILE", default_value = "config/example.toml")]
	config: PathBuf,

	#[arg(long, env = "METATX_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Validate the configuration file
	Validate,
	/// Print the dApp registration loaded from the relayer
	Inspect,
	/// Relay a transaction and follow its progress
	Send {
		/// Target contract
		#[arg(long)]
		to: Address,
		/// ABI-encoded calldata
		#[arg(long)]
		data: Bytes,
		/// Sign the forward request as EIP-712 typed data
		#[arg(long)]
		eip712: bool,
		/// Gas limit for the relayed transaction
		#[arg(long)]
		gas_limit: Option<u64>,
		/// Return once the relayer accepts the transaction
		#[arg(long)]
		no_wait: bool,
	},
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	// Initialize tracing
	setup_tracing(&cli.log_level)?;

	let config = load_config(&cli).await?;

	match cli.command {
		Commands::Validate => validate_config(&config),
		Commands::Inspect => inspect(&config).await,
		Commands::Send {
			to,
			data,
			eip712,
			gas_limit,
			no_wait,
		} => send(&config, to, data, eip712, gas_limit, no_wait).await,
	}
}

async fn load_config(cli: &Cli) -> Result<MetaTxConfig> {
	info!("Loading configuration from: {:?}", cli.config);
	ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")
}

fn validate_config(config: &MetaTxConfig) -> Result<()> {
	info!("Configuration is valid");
	info!("Relayer: {}", config.relay.base_url);
	info!("RPC endpoint: {}", config.network.rpc_url);
	if let Some(url) = &config.network.json_rpc_url {
		info!("Read-only RPC endpoint: {}", url);
	}
	info!("Strict mode: {}", config.sdk.strict_mode);
	info!("Local wallet: {}", config.wallet.is_some());
	if config.notifier.enabled {
		info!("Notifier: {}", config.notifier.endpoint);
	} else {
		info!("Notifier: disabled");
	}
	Ok(())
}

async fn inspect(config: &MetaTxConfig) -> Result<()> {
	let (sdk, _) = build_sdk(config, false).await?;
	let context = sdk.context();

	info!("dApp: {}", context.dapp_id.as_deref().unwrap_or("unknown"));
	if let Some(network_id) = context.network_id {
		info!("Network: {}", network_id);
	}
	for (address, kind) in context.meta_transaction_types.iter().flatten() {
		info!("  Contract {} ({:?})", address, kind);
	}
	for api in context.dapp_apis.iter().flat_map(|apis| apis.values()) {
		info!("  API {}: {}.{} -> {}", api.id, api.contract_address, api.method, api.url);
	}
	if let Some(forwarder) = context.system.forwarder_address {
		info!("Trusted forwarder: {}", forwarder);
	}
	if let Some(wallet) = sdk.wallet() {
		info!("Wallet factory: {}", wallet.factory());
		info!("Base wallet: {}", wallet.base_wallet());
	}

	sdk.shutdown().await?;
	Ok(())
}

async fn send(
	config: &MetaTxConfig,
	to: Address,
	data: Bytes,
	eip712: bool,
	gas_limit: Option<u64>,
	no_wait: bool,
) -> Result<()> {
	let follow = config.notifier.enabled && !no_wait;
	let (sdk, account) = build_sdk(config, follow).await?;
	let from = account.context("Sending requires a [wallet] section")?;

	let mut tx = json!({ "from": from, "to": to, "data": data });
	if eip712 {
		tx["signatureType"] = json!(sdk.context().system.eip712_sign);
	}
	if let Some(gas) = gas_limit {
		tx["gasLimit"] = json!(format!("{:#x}", gas));
	}

	let mut events = sdk.subscribe();
	let result = sdk
		.provider()
		.request("eth_sendTransaction", json!([tx]))
		.await
		.context("Transaction was not sent")?;
	let Some(transaction_id) = result.as_str().map(str::to_string) else {
		info!("Result: {}", result);
		return sdk.shutdown().await.map_err(Into::into);
	};
	info!("Transaction submitted: {}", transaction_id);

	if follow {
		info!("Waiting for relayer events, press Ctrl+C to stop");
		loop {
			tokio::select! {
				event = events.recv() => match event {
					Ok(SdkEvent::TxHashGenerated { transaction_id: id, transaction_hash }) if id == transaction_id => {
						info!("Transaction hash: {}", transaction_hash);
					}
					Ok(SdkEvent::TxMined { transaction_id: id, transaction_hash }) if id == transaction_id => {
						info!("Mined: {}", transaction_hash);
						break;
					}
					Ok(SdkEvent::TxError { transaction_id: id, error }) if id == transaction_id => {
						warn!("Relayer reported an error: {}", error);
						break;
					}
					Ok(_) => {}
					Err(RecvError::Lagged(skipped)) => warn!("Missed {} events", skipped),
					Err(RecvError::Closed) => break,
				},
				_ = signal::ctrl_c() => {
					info!("Stopped waiting");
					break;
				}
			}
		}
	}

	sdk.shutdown().await?;
	Ok(())
}

/// Builds the provider stack from configuration and initializes the SDK.
async fn build_sdk(config: &MetaTxConfig, notifier: bool) -> Result<(MetaTxSdk, Option<Address>)> {
	let node = Arc::new(
		HttpProvider::connect(&config.network.rpc_url)
			.await
			.context("Failed to connect to RPC endpoint")?,
	);

	let mut account = None;
	let provider: Arc<dyn ProviderInterface> = match &config.wallet {
		Some(wallet) => {
			let key = LocalWallet::new(&wallet.private_key).context("Invalid wallet private key")?;
			let wallet = WalletProvider::new(Box::new(key), node.clone());
			account = Some(wallet.address());
			Arc::new(wallet)
		}
		None => node.clone(),
	};

	let mut builder = MetaTxSdk::from_config(config, provider);
	if let Some(url) = &config.network.json_rpc_url {
		let reader = HttpProvider::connect(url)
			.await
			.context("Failed to connect to read-only RPC endpoint")?;
		builder = builder.with_json_rpc_provider(Arc::new(reader));
	}
	if !notifier {
		builder = builder.without_notifier();
	}

	let sdk = builder.init().await.context("Failed to initialize SDK")?;
	Ok((sdk, account))
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}
