//! Configuration types for the SDK.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default relay timeout for meta-transaction submission.
pub const DEFAULT_RELAY_TIMEOUT_SECS: u64 = 600;

/// Hosted relayer API.
pub const DEFAULT_RELAY_URL: &str = "https://api.biconomy.io";

/// Hosted transaction notification socket.
pub const DEFAULT_NOTIFIER_ENDPOINT: &str = "wss://gasless-staging-wss.biconomy.io/connection/websocket";

/// Complete SDK configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetaTxConfig {
	/// dApp identity and routing policy
	pub sdk: SdkSettings,
	/// Relayer HTTP API
	pub relay: RelayConfig,
	/// Node endpoints
	pub network: NetworkConfig,
	/// Local signing key (optional)
	#[serde(default)]
	pub wallet: Option<WalletConfig>,
	/// Transaction notifier socket
	#[serde(default)]
	pub notifier: NotifierConfig,
	/// Default EIP-712 domain overrides
	#[serde(default)]
	pub signing: SigningConfig,
}

/// dApp identity and routing policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SdkSettings {
	/// Dashboard API key
	pub api_key: String,
	/// Fail instead of falling back when a contract or method is not registered
	#[serde(default)]
	pub strict_mode: bool,
	/// Restrict registration data to these contracts
	#[serde(default)]
	pub contract_addresses: Vec<Address>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
	/// Base URL of the meta-transaction API
	pub base_url: String,
	/// Full URL of the dApp registration endpoint, when hosted separately
	#[serde(default)]
	pub dapp_api_url: Option<String>,
	#[serde(default = "default_timeout_secs")]
	pub timeout_secs: u64,
	/// Value sent in the `version` header
	#[serde(default = "default_sdk_version")]
	pub sdk_version: String,
}

impl RelayConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}
}

fn default_timeout_secs() -> u64 {
	DEFAULT_RELAY_TIMEOUT_SECS
}

fn default_sdk_version() -> String {
	env!("CARGO_PKG_VERSION").to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
	/// Wallet-facing RPC endpoint
	pub rpc_url: String,
	/// Read-only endpoint used for estimation and contract reads
	#[serde(default)]
	pub json_rpc_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletConfig {
	/// Hex private key, with or without 0x prefix
	pub private_key: String,
}

/// Transaction notifier settings.
///
/// After `max_retries` failed reconnects in a row the notifier idles until the
/// next subscription. Subscriptions that see no terminal status within
/// `subscription_ttl_secs` are dropped.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifierConfig {
	#[serde(default = "default_notifier_endpoint")]
	pub endpoint: String,
	#[serde(default = "default_true")]
	pub enabled: bool,
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	#[serde(default = "default_initial_backoff_ms")]
	pub initial_backoff_ms: u64,
	#[serde(default = "default_max_backoff_ms")]
	pub max_backoff_ms: u64,
	#[serde(default = "default_subscription_ttl_secs")]
	pub subscription_ttl_secs: u64,
}

impl Default for NotifierConfig {
	fn default() -> Self {
		Self {
			endpoint: default_notifier_endpoint(),
			enabled: true,
			max_retries: default_max_retries(),
			initial_backoff_ms: default_initial_backoff_ms(),
			max_backoff_ms: default_max_backoff_ms(),
			subscription_ttl_secs: default_subscription_ttl_secs(),
		}
	}
}

fn default_notifier_endpoint() -> String {
	DEFAULT_NOTIFIER_ENDPOINT.to_string()
}

fn default_true() -> bool {
	true
}

fn default_max_retries() -> u32 {
	10
}

fn default_initial_backoff_ms() -> u64 {
	500
}

fn default_max_backoff_ms() -> u64 {
	30_000
}

fn default_subscription_ttl_secs() -> u64 {
	3600
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SigningConfig {
	pub domain_name: Option<String>,
	pub domain_version: Option<String>,
}
