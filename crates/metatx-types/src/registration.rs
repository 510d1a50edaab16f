//! Registration data served by the relayer dashboard API.
//!
//! These types mirror the JSON documents returned by the dApp registration
//! and system-info endpoints. They are deserialized once during SDK
//! initialization and treated as read-only afterwards.

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Relative URL every native meta-transaction API is registered under.
pub const NATIVE_META_TX_URL: &str = "/api/v2/meta-tx/native";

/// Contract type the dashboard gives smart contract wallet registrations.
pub const SCW: &str = "SCW";

/// How a registered contract expects meta-transactions to reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetaTransactionType {
	/// The contract implements its own meta-transaction entry point.
	#[serde(rename = "DEFAULT")]
	Default,
	/// EIP-2771 forwarding through a trusted forwarder.
	#[serde(rename = "EIP2771", alias = "TRUSTED_FORWARDER")]
	TrustedForwarder,
	/// ERC20 fee forwarding, served by a separate client.
	#[serde(rename = "ERC20_FORWARDER")]
	Erc20Forwarder,
}

/// The dApp record returned by the registration endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dapp {
	#[serde(rename = "_id")]
	pub id: String,
	#[serde(rename = "networkId", deserialize_with = "crate::forward::de_u64_lenient")]
	pub network_id: u64,
}

/// A smart contract registered for the dApp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartContract {
	pub address: Address,
	/// JSON ABI, encoded as a string by the dashboard.
	pub abi: String,
	pub meta_transaction_type: MetaTransactionType,
	/// `SC` for plain contracts, [`SCW`] for the dApp's smart contract wallet.
	#[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
	pub contract_type: Option<String>,
}

impl SmartContract {
	pub fn is_wallet(&self) -> bool {
		self.contract_type.as_deref() == Some(SCW)
	}
}

/// A method registered with the relayer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaApi {
	pub id: String,
	pub contract_address: Address,
	pub method: String,
	pub url: String,
	#[serde(default)]
	pub contract_type: Option<String>,
}

impl MetaApi {
	/// Whether this API is registered for the smart contract wallet rather
	/// than for one contract address.
	pub fn is_wallet(&self) -> bool {
		self.contract_type.as_deref() == Some(SCW)
	}

	/// Whether this API is served by the native meta-transaction endpoint.
	pub fn is_native(&self) -> bool {
		self.url == NATIVE_META_TX_URL
	}
}

/// Everything the dashboard knows about a dApp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DappRegistration {
	pub dapp: Dapp,
	#[serde(default)]
	pub smart_contracts: Vec<SmartContract>,
	#[serde(default)]
	pub meta_apis: Vec<MetaApi>,
}

/// Lookup key of a registered API: lower-cased contract address and method name.
pub fn api_key(contract: &Address, method: &str) -> String {
	format!("{}-{}", contract.to_string().to_lowercase(), method)
}

/// Lookup key of an API registered for the smart contract wallet.
pub fn wallet_api_key(method: &str) -> String {
	format!("{}-{}", SCW, method)
}

/// One `{name, type}` entry of an EIP-712 struct definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeField {
	pub name: String,
	#[serde(rename = "type")]
	pub type_name: String,
}

impl TypeField {
	pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			type_name: type_name.into(),
		}
	}
}

/// EIP-712 domain of a forwarder contract.
///
/// Deployed forwarders bind signatures with a `salt`; `chainId` is accepted for
/// forwarders that use the standard chain-bound domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwarderDomainData {
	pub name: String,
	pub version: String,
	#[serde(
		default,
		skip_serializing_if = "Option::is_none",
		deserialize_with = "crate::forward::de_opt_u64_lenient"
	)]
	pub chain_id: Option<u64>,
	pub verifying_contract: Address,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub salt: Option<B256>,
}

impl ForwarderDomainData {
	/// Returns a copy bound to `forwarder`, with optional name and version overrides.
	pub fn for_forwarder(
		&self,
		forwarder: Address,
		name: Option<&str>,
		version: Option<&str>,
	) -> Self {
		let mut domain = self.clone();
		domain.verifying_contract = forwarder;
		if let Some(name) = name {
			domain.name = name.to_string();
		}
		if let Some(version) = version {
			domain.version = version.to_string();
		}
		domain
	}
}

/// Forwarder and signing metadata served by the system-info endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
	#[serde(default)]
	pub forwarder_domain_type: Option<Vec<TypeField>>,
	#[serde(default)]
	pub forward_request_type: Option<Vec<TypeField>>,
	#[serde(default)]
	pub forwarder_domain_data: Option<ForwarderDomainData>,
	#[serde(default)]
	pub forwarder_domain_details: Option<HashMap<Address, ForwarderDomainData>>,
	#[serde(default, rename = "biconomyForwarderAddress")]
	pub forwarder_address: Option<Address>,
	#[serde(default, rename = "biconomyForwarderAddresses")]
	pub forwarder_addresses: Option<Vec<Address>>,
	#[serde(default = "default_eip712_sign")]
	pub eip712_sign: String,
	#[serde(default = "default_personal_sign")]
	pub personal_sign: String,
	#[serde(default)]
	pub wallet_factory_address: Option<Address>,
	#[serde(default)]
	pub base_wallet_address: Option<Address>,
}

impl Default for SystemInfo {
	fn default() -> Self {
		Self {
			forwarder_domain_type: None,
			forward_request_type: None,
			forwarder_domain_data: None,
			forwarder_domain_details: None,
			forwarder_address: None,
			forwarder_addresses: None,
			eip712_sign: default_eip712_sign(),
			personal_sign: default_personal_sign(),
			wallet_factory_address: None,
			base_wallet_address: None,
		}
	}
}

fn default_eip712_sign() -> String {
	"EIP712_SIGN".to_string()
}

fn default_personal_sign() -> String {
	"PERSONAL_SIGN".to_string()
}
