//! Forward requests and the relay request envelope.

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Seconds a forward request stays valid after it is built.
pub const FORWARD_REQUEST_TTL_SECS: u64 = 3600;

/// Gas added on top of an on-chain estimate to cover forwarder overhead.
pub const GAS_ESTIMATE_MARGIN: u64 = 5000;

/// Primary type name of the forward request in EIP-712 documents.
pub const FORWARD_REQUEST_PRIMARY_TYPE: &str = "ERC20ForwardRequest";

/// A request executed by a forwarder contract on behalf of `from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardRequest {
	pub from: Address,
	pub to: Address,
	pub token: Address,
	#[serde(deserialize_with = "de_u64_lenient")]
	pub tx_gas: u64,
	#[serde(serialize_with = "ser_u256_decimal")]
	pub token_gas_price: U256,
	#[serde(serialize_with = "ser_u256_decimal")]
	pub batch_id: U256,
	#[serde(serialize_with = "ser_u256_decimal")]
	pub batch_nonce: U256,
	#[serde(deserialize_with = "de_u64_lenient")]
	pub deadline: u64,
	pub data: Bytes,
}

impl ForwardRequest {
	/// Builds a gasless request paying no token fee.
	pub fn new(
		from: Address,
		to: Address,
		tx_gas: u64,
		batch_id: U256,
		batch_nonce: U256,
		deadline: u64,
		data: Bytes,
	) -> Self {
		Self {
			from,
			to,
			token: Address::ZERO,
			tx_gas,
			token_gas_price: U256::ZERO,
			batch_id,
			batch_nonce,
			deadline,
			data,
		}
	}
}

/// Signing scheme requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureType {
	Eip712,
	Personal,
}

impl SignatureType {
	/// Selects EIP-712 only when the caller asked for the EIP-712 constant.
	pub fn from_payload(requested: Option<&str>, eip712_constant: &str) -> Self {
		match requested {
			Some(value) if value == eip712_constant => SignatureType::Eip712,
			_ => SignatureType::Personal,
		}
	}
}

/// Body posted to the relayer's native meta-transaction endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequestEnvelope {
	pub from: Address,
	pub api_id: String,
	pub params: Vec<Value>,
	pub to: Address,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gas_limit: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub signature_type: Option<String>,
}

impl RelayRequestEnvelope {
	/// Envelope for the trusted-forwarder flow.
	///
	/// `params` is always `[request, domainSeparator?, signature]`.
	#[allow(clippy::too_many_arguments)]
	pub fn forwarded(
		from: Address,
		api_id: impl Into<String>,
		to: Address,
		gas_limit: Option<String>,
		request: &ForwardRequest,
		domain_separator: Option<B256>,
		signature: impl Into<String>,
		signature_type: impl Into<String>,
	) -> Result<Self, serde_json::Error> {
		let mut params = vec![serde_json::to_value(request)?];
		if let Some(separator) = domain_separator {
			params.push(Value::String(separator.to_string()));
		}
		params.push(Value::String(signature.into()));

		Ok(Self {
			from,
			api_id: api_id.into(),
			params,
			to,
			gas_limit,
			signature_type: Some(signature_type.into()),
		})
	}

	/// Envelope for contracts with their own meta-transaction entry point.
	pub fn direct(
		from: Address,
		api_id: impl Into<String>,
		to: Address,
		gas_limit: Option<String>,
		args: Vec<Value>,
	) -> Self {
		Self {
			from,
			api_id: api_id.into(),
			params: args,
			to,
			gas_limit,
			signature_type: None,
		}
	}

	/// Splits a forwarded envelope back into its request, separator and signature.
	pub fn forward_parts(&self) -> Option<(ForwardRequest, Option<B256>, String)> {
		let (request, rest) = self.params.split_first()?;
		let request: ForwardRequest = serde_json::from_value(request.clone()).ok()?;
		match rest {
			[signature] => Some((request, None, signature.as_str()?.to_string())),
			[separator, signature] => Some((
				request,
				Some(separator.as_str()?.parse().ok()?),
				signature.as_str()?.to_string(),
			)),
			_ => None,
		}
	}
}

/// Normalises a caller-supplied gas value (number, decimal or hex string) to a hex quantity.
pub fn to_hex_quantity(value: &Value) -> Option<String> {
	let parsed = match value {
		Value::Number(n) => U256::from(n.as_u64()?),
		Value::String(s) => s.parse::<U256>().ok()?,
		_ => return None,
	};
	Some(format!("{:#x}", parsed))
}

fn ser_u256_decimal<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
	serializer.serialize_str(&value.to_string())
}

/// Accepts a JSON number or a decimal/hex string.
pub fn de_u64_lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum NumOrStr {
		Num(u64),
		Str(String),
	}

	match NumOrStr::deserialize(deserializer)? {
		NumOrStr::Num(n) => Ok(n),
		NumOrStr::Str(s) => {
			let parsed = match s.strip_prefix("0x") {
				Some(hex) => u64::from_str_radix(hex, 16),
				None => s.parse::<u64>(),
			};
			parsed.map_err(|e| de::Error::custom(format!("invalid integer '{}': {}", s, e)))
		}
	}
}

/// Optional form of [`de_u64_lenient`]; `null` and a missing field are `None`.
pub fn de_opt_u64_lenient<'de, D: Deserializer<'de>>(
	deserializer: D,
) -> Result<Option<u64>, D::Error> {
	#[derive(Deserialize)]
	struct Lenient(#[serde(deserialize_with = "de_u64_lenient")] u64);

	Ok(Option::<Lenient>::deserialize(deserializer)?.map(|Lenient(n)| n))
}
