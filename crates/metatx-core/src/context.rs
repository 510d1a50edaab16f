//! Registration data loaded at initialization.
//!
//! A [`RegistrationContext`] is assembled once from the dashboard and
//! system-info responses and shared read-only afterwards. Every piece may be
//! absent when the relayer returned partial data; [`RegistrationContext::ensure_ready`]
//! checks them all up front and hands out a [`ReadyContext`] with plain
//! references.

use alloy::primitives::Address;
use metatx_abi::{AbiError, DecodedMethod, InterfaceMap};
use metatx_signature::ForwarderTypes;
use metatx_types::{
	api_key, wallet_api_key, DappRegistration, ErrorCode, ForwarderDomainData, MetaApi, MetaTransactionType,
	SdkError, SystemInfo,
};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct RegistrationContext {
	pub dapp_id: Option<String>,
	pub network_id: Option<u64>,
	pub interfaces: Option<Arc<InterfaceMap>>,
	/// Registered APIs keyed by [`api_key`], wallet APIs by [`wallet_api_key`].
	pub dapp_apis: Option<HashMap<String, MetaApi>>,
	pub meta_transaction_types: Option<HashMap<Address, MetaTransactionType>>,
	/// How the dApp's smart contract wallet, if any, receives meta-transactions.
	pub wallet_meta_transaction_type: Option<MetaTransactionType>,
	pub contract_abis: Option<HashMap<Address, String>>,
	pub system: SystemInfo,
}

impl RegistrationContext {
	/// Derives the lookup maps from a dashboard registration.
	pub fn from_registration(registration: &DappRegistration) -> Result<Self, AbiError> {
		let interfaces = InterfaceMap::from_contracts(&registration.smart_contracts)?;
		let meta_transaction_types = registration
			.smart_contracts
			.iter()
			.map(|contract| (contract.address, contract.meta_transaction_type))
			.collect();
		let contract_abis = registration
			.smart_contracts
			.iter()
			.map(|contract| (contract.address, contract.abi.clone()))
			.collect();
		let dapp_apis = registration
			.meta_apis
			.iter()
			.map(|api| {
				let key = if api.is_wallet() {
					wallet_api_key(&api.method)
				} else {
					api_key(&api.contract_address, &api.method)
				};
				(key, api.clone())
			})
			.collect();
		let wallet_meta_transaction_type = registration
			.smart_contracts
			.iter()
			.find(|contract| contract.is_wallet())
			.map(|contract| contract.meta_transaction_type);

		Ok(Self {
			dapp_id: Some(registration.dapp.id.clone()),
			network_id: Some(registration.dapp.network_id),
			interfaces: Some(Arc::new(interfaces)),
			dapp_apis: Some(dapp_apis),
			meta_transaction_types: Some(meta_transaction_types),
			wallet_meta_transaction_type,
			contract_abis: Some(contract_abis),
			system: SystemInfo::default(),
		})
	}

	pub fn with_system_info(mut self, system: SystemInfo) -> Self {
		self.system = system;
		self
	}

	/// Checks that every map the relay pipeline reads is present.
	pub fn ensure_ready(&self) -> Result<ReadyContext<'_>, SdkError> {
		fn require<'a, T>(value: &'a Option<T>, code: ErrorCode, what: &str) -> Result<&'a T, SdkError> {
			value
				.as_ref()
				.ok_or_else(|| SdkError::new(code, format!("{} is undefined", what)))
		}

		let interfaces = require(&self.interfaces, ErrorCode::InterfaceMapUndefined, "Interface map")?;
		let dapp_apis = require(&self.dapp_apis, ErrorCode::DappApiMapUndefined, "Dapp API map")?;
		let meta_transaction_types = require(
			&self.meta_transaction_types,
			ErrorCode::SmartContractMetaTransactionMapUndefined,
			"Smart contract meta transaction map",
		)?;
		let contract_abis = require(
			&self.contract_abis,
			ErrorCode::SmartContractMapUndefined,
			"Smart contract map",
		)?;
		let domain_data = require(
			&self.system.forwarder_domain_data,
			ErrorCode::ForwarderDomainDataUndefined,
			"Forwarder domain data",
		)?;
		let domain_details = require(
			&self.system.forwarder_domain_details,
			ErrorCode::ForwarderDomainDetailsUndefined,
			"Forwarder domain details",
		)?;
		let dapp_id = require(&self.dapp_id, ErrorCode::DappIdUndefined, "Dapp id")?;
		let forwarder_addresses = require(
			&self.system.forwarder_addresses,
			ErrorCode::ForwarderAddressesArrayUndefined,
			"Forwarder addresses array",
		)?;
		let forwarder_address = *require(
			&self.system.forwarder_address,
			ErrorCode::ForwarderAddressUndefined,
			"Forwarder address",
		)?;
		let domain_type = require(
			&self.system.forwarder_domain_type,
			ErrorCode::ForwarderDomainTypeUndefined,
			"Forwarder domain type",
		)?;
		let request_type = require(
			&self.system.forward_request_type,
			ErrorCode::ForwarderRequestTypeUndefined,
			"Forward request type",
		)?;

		Ok(ReadyContext {
			dapp_id,
			interfaces,
			dapp_apis,
			meta_transaction_types,
			wallet_meta_transaction_type: self.wallet_meta_transaction_type,
			contract_abis,
			domain_data,
			domain_details,
			forwarder_address,
			forwarder_addresses,
			types: ForwarderTypes {
				domain_type: domain_type.clone(),
				request_type: request_type.clone(),
			},
			eip712_sign: &self.system.eip712_sign,
			personal_sign: &self.system.personal_sign,
		})
	}
}

/// A fully populated view of the registration data.
#[derive(Debug)]
pub struct ReadyContext<'a> {
	pub dapp_id: &'a str,
	pub interfaces: &'a InterfaceMap,
	pub dapp_apis: &'a HashMap<String, MetaApi>,
	pub meta_transaction_types: &'a HashMap<Address, MetaTransactionType>,
	pub wallet_meta_transaction_type: Option<MetaTransactionType>,
	pub contract_abis: &'a HashMap<Address, String>,
	pub domain_data: &'a ForwarderDomainData,
	pub domain_details: &'a HashMap<Address, ForwarderDomainData>,
	pub forwarder_address: Address,
	pub forwarder_addresses: &'a [Address],
	pub types: ForwarderTypes,
	pub eip712_sign: &'a str,
	pub personal_sign: &'a str,
}

/// The registered API a call is relayed through.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedApi<'a> {
	pub api: &'a MetaApi,
	pub approach: MetaTransactionType,
	/// Matched through the smart contract wallet entries rather than `to`.
	pub via_wallet: bool,
}

impl ReadyContext<'_> {
	pub fn api(&self, contract: &Address, method: &str) -> Option<&MetaApi> {
		self.dapp_apis.get(&api_key(contract, method))
	}

	/// Whether calls to `to` can be decoded, either from its own ABI or as a
	/// smart contract wallet instance.
	pub fn knows(&self, to: &Address) -> bool {
		self.interfaces.contains(to) || self.interfaces.has_wallet()
	}

	/// Decodes against the ABI registered for `to`, then the wallet ABI.
	pub fn decode_call(&self, to: &Address, data: &[u8]) -> Result<DecodedMethod, AbiError> {
		match self.interfaces.decode(to, data) {
			Ok(method) => Ok(method),
			Err(e) if self.interfaces.has_wallet() => self.interfaces.decode_wallet(data).map_err(|_| e),
			Err(e) => Err(e),
		}
	}

	/// Looks up the API for `method` on `to`, falling back to the wallet API
	/// of the same method.
	pub fn resolve_api(&self, to: &Address, method: &str) -> Option<ResolvedApi<'_>> {
		if let Some(api) = self.api(to, method) {
			return Some(ResolvedApi {
				api,
				approach: self.meta_transaction_type(to),
				via_wallet: false,
			});
		}
		self.dapp_apis.get(&wallet_api_key(method)).map(|api| ResolvedApi {
			api,
			approach: self
				.wallet_meta_transaction_type
				.unwrap_or(MetaTransactionType::Default),
			via_wallet: true,
		})
	}

	/// Contracts with no recorded type use the direct flow.
	pub fn meta_transaction_type(&self, contract: &Address) -> MetaTransactionType {
		self.meta_transaction_types
			.get(contract)
			.copied()
			.unwrap_or(MetaTransactionType::Default)
	}

	/// A per-call copy of the domain of `forwarder`.
	///
	/// The registered entry for the forwarder is used when present, otherwise
	/// the generic template. The shared data is never modified.
	pub fn domain_for(
		&self,
		forwarder: Address,
		name: Option<&str>,
		version: Option<&str>,
	) -> ForwarderDomainData {
		self.domain_details
			.get(&forwarder)
			.unwrap_or(self.domain_data)
			.for_forwarder(forwarder, name, version)
	}

	/// Value of the `signatureType` envelope field for `eip712`.
	pub fn signature_type_constant(&self, eip712: bool) -> &str {
		if eip712 {
			self.eip712_sign
		} else {
			self.personal_sign
		}
	}
}
