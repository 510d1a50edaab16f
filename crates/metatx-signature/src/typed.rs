//! Signing payloads for forward requests.

use crate::SignatureError;
use alloy::dyn_abi::TypedData;
use alloy::primitives::{keccak256, B256, U256};
use alloy::sol_types::{Eip712Domain, SolValue};
use metatx_types::{ForwardRequest, ForwarderDomainData, TypeField, FORWARD_REQUEST_PRIMARY_TYPE};
use serde_json::{json, Value};
use std::borrow::Cow;

/// EIP-712 domain struct name.
pub const DOMAIN_PRIMARY_TYPE: &str = "EIP712Domain";

/// Builds the EIP-712 document for a forward request.
pub fn forward_request_typed_data(
	domain_type: &[TypeField],
	request_type: &[TypeField],
	domain: &ForwarderDomainData,
	request: &ForwardRequest,
) -> Result<Value, SignatureError> {
	let mut types = serde_json::Map::new();
	types.insert(DOMAIN_PRIMARY_TYPE.to_string(), serde_json::to_value(domain_type)?);
	types.insert(
		FORWARD_REQUEST_PRIMARY_TYPE.to_string(),
		serde_json::to_value(request_type)?,
	);

	Ok(json!({
		"types": types,
		"domain": serde_json::to_value(domain)?,
		"primaryType": FORWARD_REQUEST_PRIMARY_TYPE,
		"message": serde_json::to_value(request)?,
	}))
}

/// Parses a typed-data document and returns its EIP-712 signing hash.
pub fn typed_data_hash(document: &Value) -> Result<B256, SignatureError> {
	let typed: TypedData = serde_json::from_value(document.clone())
		.map_err(|e| SignatureError::TypedData(e.to_string()))?;
	typed
		.eip712_signing_hash()
		.map_err(|e| SignatureError::TypedData(e.to_string()))
}

/// Converts forwarder domain data into an Alloy EIP-712 domain.
pub fn eip712_domain(domain: &ForwarderDomainData) -> Eip712Domain {
	Eip712Domain::new(
		Some(Cow::Owned(domain.name.clone())),
		Some(Cow::Owned(domain.version.clone())),
		domain.chain_id.map(U256::from),
		Some(domain.verifying_contract),
		domain.salt,
	)
}

/// Hash of the EIP-712 domain, sent alongside EIP-712 signatures.
pub fn domain_separator(domain: &ForwarderDomainData) -> B256 {
	eip712_domain(domain).separator()
}

/// Digest signed in the personal-sign flow:
/// `keccak256(abi.encodePacked(from, to, token, txGas, tokenGasPrice, batchId, batchNonce, deadline, keccak256(data)))`.
pub fn personal_sign_hash(request: &ForwardRequest) -> B256 {
	let packed = (
		request.from,
		request.to,
		request.token,
		U256::from(request.tx_gas),
		request.token_gas_price,
		request.batch_id,
		request.batch_nonce,
		U256::from(request.deadline),
		keccak256(&request.data),
	)
		.abi_encode_packed();
	keccak256(packed)
}

/// Default `EIP712Domain` fields of a salted forwarder domain.
pub fn default_domain_type() -> Vec<TypeField> {
	vec![
		TypeField::new("name", "string"),
		TypeField::new("version", "string"),
		TypeField::new("verifyingContract", "address"),
		TypeField::new("salt", "bytes32"),
	]
}

/// Default `ERC20ForwardRequest` fields.
pub fn default_request_type() -> Vec<TypeField> {
	vec![
		TypeField::new("from", "address"),
		TypeField::new("to", "address"),
		TypeField::new("token", "address"),
		TypeField::new("txGas", "uint256"),
		TypeField::new("tokenGasPrice", "uint256"),
		TypeField::new("batchId", "uint256"),
		TypeField::new("batchNonce", "uint256"),
		TypeField::new("deadline", "uint256"),
		TypeField::new("data", "bytes"),
	]
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::{Address, Bytes};

	fn request() -> ForwardRequest {
		ForwardRequest::new(
			Address::with_last_byte(1),
			Address::with_last_byte(2),
			105_000,
			U256::ZERO,
			U256::from(3),
			1_700_003_600,
			Bytes::from(vec![0xca, 0xfe]),
		)
	}

	fn domain() -> ForwarderDomainData {
		ForwarderDomainData {
			name: "Biconomy Forwarder".into(),
			version: "1".into(),
			chain_id: None,
			verifying_contract: Address::with_last_byte(0xf0),
			salt: Some(B256::left_padding_from(&[0x05])),
		}
	}

	#[test]
	fn test_document_shape() {
		let document = forward_request_typed_data(
			&default_domain_type(),
			&default_request_type(),
			&domain(),
			&request(),
		)
		.unwrap();

		assert_eq!(document["primaryType"], "ERC20ForwardRequest");
		assert_eq!(document["types"]["EIP712Domain"][3]["name"], "salt");
		assert_eq!(document["types"]["ERC20ForwardRequest"].as_array().unwrap().len(), 9);
		assert_eq!(document["message"]["batchNonce"], "3");
		assert!(document["domain"].get("chainId").is_none());
	}

	#[test]
	fn test_signing_hash_uses_domain_separator() {
		let document = forward_request_typed_data(
			&default_domain_type(),
			&default_request_type(),
			&domain(),
			&request(),
		)
		.unwrap();
		let typed: TypedData = serde_json::from_value(document.clone()).unwrap();
		assert_eq!(typed.domain().separator(), domain_separator(&domain()));
		assert_eq!(
			typed_data_hash(&document).unwrap(),
			typed.eip712_signing_hash().unwrap()
		);
	}

	#[test]
	fn test_separator_changes_with_forwarder() {
		let other = domain().for_forwarder(Address::with_last_byte(0xf1), None, None);
		assert_ne!(domain_separator(&domain()), domain_separator(&other));
	}

	#[test]
	fn test_personal_hash_is_sensitive_to_every_field() {
		let base = personal_sign_hash(&request());
		let variants = [
			ForwardRequest {
				from: Address::with_last_byte(9),
				..request()
			},
			ForwardRequest {
				to: Address::with_last_byte(9),
				..request()
			},
			ForwardRequest {
				token: Address::with_last_byte(9),
				..request()
			},
			ForwardRequest {
				tx_gas: 1,
				..request()
			},
			ForwardRequest {
				token_gas_price: U256::from(1),
				..request()
			},
			ForwardRequest {
				batch_id: U256::from(1),
				..request()
			},
			ForwardRequest {
				batch_nonce: U256::from(4),
				..request()
			},
			ForwardRequest {
				deadline: 1,
				..request()
			},
			ForwardRequest {
				data: Bytes::from(vec![0xca, 0xff]),
				..request()
			},
		];
		for variant in variants {
			assert_ne!(personal_sign_hash(&variant), base);
		}
		assert_eq!(personal_sign_hash(&request()), base);
	}

	#[test]
	fn test_personal_hash_packing_layout() {
		let req = request();
		let mut expected = Vec::new();
		expected.extend_from_slice(req.from.as_slice());
		expected.extend_from_slice(req.to.as_slice());
		expected.extend_from_slice(req.token.as_slice());
		expected.extend_from_slice(&U256::from(req.tx_gas).to_be_bytes::<32>());
		expected.extend_from_slice(&req.token_gas_price.to_be_bytes::<32>());
		expected.extend_from_slice(&req.batch_id.to_be_bytes::<32>());
		expected.extend_from_slice(&req.batch_nonce.to_be_bytes::<32>());
		expected.extend_from_slice(&U256::from(req.deadline).to_be_bytes::<32>());
		expected.extend_from_slice(keccak256(&req.data).as_slice());
		assert_eq!(expected.len(), 3 * 20 + 6 * 32);
		assert_eq!(personal_sign_hash(&req), keccak256(&expected));
	}
}
