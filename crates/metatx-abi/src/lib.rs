//! Method decoding for registered contracts.
//!
//! The dashboard serves one JSON ABI per registered contract. At
//! initialization they are parsed into an [`InterfaceMap`], which maps raw
//! calldata sent to a contract back to the called method and its arguments.
//! The ABI of the dApp's smart contract wallet, when registered, is also kept
//! aside so that calls to wallet instances at unregistered addresses can be
//! decoded.

use alloy::dyn_abi::{DynSolValue, JsonAbiExt};
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::{Address, Selector};
use metatx_types::SmartContract;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AbiError {
	#[error("Invalid ABI for {address}: {message}")]
	InvalidAbi { address: Address, message: String },
	#[error("Contract {0} has no registered ABI")]
	UnknownContract(Address),
	#[error("No smart contract wallet ABI is registered")]
	NoWalletAbi,
	#[error("Calldata is shorter than a selector")]
	MissingSelector,
	#[error("No function with selector 0x{0} in the ABI of {1}")]
	UnknownSelector(String, Address),
	#[error("Failed to decode arguments of {method}: {message}")]
	Decode { method: String, message: String },
}

/// A decoded contract call.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMethod {
	/// Method name, e.g. `setQuote`.
	pub name: String,
	/// Canonical signature, e.g. `setQuote(string)`.
	pub signature: String,
	pub args: Vec<DynSolValue>,
}

impl DecodedMethod {
	/// Arguments rendered as JSON, in declaration order.
	pub fn args_json(&self) -> Vec<Value> {
		self.args.iter().map(value_to_json).collect()
	}
}

/// Parsed ABIs of every registered contract.
#[derive(Debug, Clone, Default)]
pub struct InterfaceMap {
	contracts: HashMap<Address, ContractInterface>,
	wallet: Option<ContractInterface>,
}

#[derive(Debug, Clone)]
struct ContractInterface {
	address: Address,
	abi: JsonAbi,
	by_selector: HashMap<Selector, Function>,
}

impl ContractInterface {
	fn parse(address: Address, raw: &str) -> Result<Self, AbiError> {
		let abi: JsonAbi = serde_json::from_str(raw).map_err(|e| AbiError::InvalidAbi {
			address,
			message: e.to_string(),
		})?;
		let by_selector = abi
			.functions()
			.map(|function| (function.selector(), function.clone()))
			.collect();
		Ok(Self {
			address,
			abi,
			by_selector,
		})
	}

	fn decode(&self, data: &[u8]) -> Result<DecodedMethod, AbiError> {
		if data.len() < 4 {
			return Err(AbiError::MissingSelector);
		}

		let selector = Selector::from_slice(&data[..4]);
		let function = self
			.by_selector
			.get(&selector)
			.ok_or_else(|| AbiError::UnknownSelector(hex::encode(selector), self.address))?;

		let args = function
			.abi_decode_input(&data[4..])
			.map_err(|e| AbiError::Decode {
				method: function.name.clone(),
				message: e.to_string(),
			})?;

		Ok(DecodedMethod {
			name: function.name.clone(),
			signature: function.signature(),
			args,
		})
	}
}

impl InterfaceMap {
	/// Parses the ABI of every registered contract.
	pub fn from_contracts(contracts: &[SmartContract]) -> Result<Self, AbiError> {
		let mut map = Self::default();
		for contract in contracts {
			map.insert(contract.address, &contract.abi)?;
			if contract.is_wallet() {
				map.insert_wallet(contract.address, &contract.abi)?;
			}
		}
		Ok(map)
	}

	pub fn insert(&mut self, address: Address, abi: &str) -> Result<(), AbiError> {
		let interface = ContractInterface::parse(address, abi)?;
		tracing::debug!(
			contract = %address,
			functions = interface.by_selector.len(),
			"Parsed contract ABI"
		);
		self.contracts.insert(address, interface);
		Ok(())
	}

	/// Registers the smart contract wallet ABI, deployed at `address`.
	pub fn insert_wallet(&mut self, address: Address, abi: &str) -> Result<(), AbiError> {
		let interface = ContractInterface::parse(address, abi)?;
		tracing::debug!(
			wallet = %address,
			functions = interface.by_selector.len(),
			"Parsed smart contract wallet ABI"
		);
		self.wallet = Some(interface);
		Ok(())
	}

	pub fn has_wallet(&self) -> bool {
		self.wallet.is_some()
	}

	pub fn contains(&self, address: &Address) -> bool {
		self.contracts.contains_key(address)
	}

	pub fn len(&self) -> usize {
		self.contracts.len()
	}

	pub fn is_empty(&self) -> bool {
		self.contracts.is_empty()
	}

	/// Whether the ABI registered for `address` declares a function `name`.
	///
	/// Returns `None` when no ABI is known for the contract.
	pub fn has_function(&self, address: &Address, name: &str) -> Option<bool> {
		self.contracts
			.get(address)
			.map(|interface| interface.abi.function(name).is_some())
	}

	/// Decodes calldata sent to `address`.
	pub fn decode(&self, address: &Address, data: &[u8]) -> Result<DecodedMethod, AbiError> {
		self.contracts
			.get(address)
			.ok_or(AbiError::UnknownContract(*address))?
			.decode(data)
	}

	/// Decodes calldata against the smart contract wallet ABI.
	pub fn decode_wallet(&self, data: &[u8]) -> Result<DecodedMethod, AbiError> {
		self.wallet
			.as_ref()
			.ok_or(AbiError::NoWalletAbi)?
			.decode(data)
	}
}

/// Renders an ABI value as JSON the way the relayer expects call arguments.
///
/// Integers become decimal strings so that 256-bit values survive the trip.
pub fn value_to_json(value: &DynSolValue) -> Value {
	match value {
		DynSolValue::Bool(b) => Value::Bool(*b),
		DynSolValue::Int(i, _) => Value::String(i.to_string()),
		DynSolValue::Uint(u, _) => Value::String(u.to_string()),
		DynSolValue::FixedBytes(word, size) => {
			Value::String(format!("0x{}", hex::encode(&word[..*size])))
		}
		DynSolValue::Address(address) => Value::String(address.to_string()),
		DynSolValue::Function(function) => Value::String(format!("0x{}", hex::encode(function))),
		DynSolValue::Bytes(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
		DynSolValue::String(s) => Value::String(s.clone()),
		DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
			Value::Array(items.iter().map(value_to_json).collect())
		}
		DynSolValue::CustomStruct {
			prop_names, tuple, ..
		} => {
			let fields: Map<String, Value> = prop_names
				.iter()
				.cloned()
				.zip(tuple.iter().map(value_to_json))
				.collect();
			Value::Object(fields)
		}
	}
}
