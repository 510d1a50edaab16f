//! Outcome of routing a transaction through the relay pipeline.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the relayer accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayReceipt {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub transaction_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tx_hash: Option<String>,
	pub flag: i64,
}

impl RelayReceipt {
	/// The value returned to the dApp: the transaction hash when the relayer
	/// already knows it, otherwise the relay transaction id.
	pub fn result_value(&self) -> serde_json::Value {
		match (&self.tx_hash, &self.transaction_id) {
			(Some(hash), _) => serde_json::Value::String(hash.clone()),
			(None, Some(id)) => serde_json::Value::String(id.clone()),
			(None, None) => serde_json::Value::Null,
		}
	}
}

/// Why a call must be re-issued against the wrapped provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
	/// The target contract is not registered for the dApp.
	ContractNotRegistered(Address),
	/// The method is not registered with the relayer.
	ApiNotRegistered { contract: Address, method: String },
	/// The raw transaction did not match any registered ABI.
	UndecodableRawTransaction(Address),
	/// The relayer rejected the request as malformed.
	RelayBadRequest(String),
}

impl fmt::Display for FallbackReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FallbackReason::ContractNotRegistered(address) => {
				write!(f, "contract {} is not registered", address)
			}
			FallbackReason::ApiNotRegistered { contract, method } => {
				write!(f, "no API registered for {} on {}", method, contract)
			}
			FallbackReason::UndecodableRawTransaction(address) => {
				write!(f, "raw transaction to {} does not match a registered ABI", address)
			}
			FallbackReason::RelayBadRequest(message) => {
				write!(f, "relayer rejected request: {}", message)
			}
		}
	}
}

/// Tagged result of the relay pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
	Relayed(RelayReceipt),
	Fallback(FallbackReason),
}
