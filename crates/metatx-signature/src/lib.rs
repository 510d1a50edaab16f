//! Signature construction for forward requests.
//!
//! Two schemes are supported. EIP-712 signs a typed `ERC20ForwardRequest`
//! document bound to the forwarder's domain; personal-sign signs the packed
//! keccak digest of the request with the EIP-191 prefix. Wallet responses are
//! normalised so `v` is always 27 or 28.

use metatx_types::RpcError;
use thiserror::Error;

pub mod builder;
pub mod normalize;
pub mod typed;

pub use builder::{typed_data_method, ForwardSignature, ForwarderTypes, SignatureBuilder};
pub use normalize::{normalize_signature, SignatureParameters, SMART_WALLET_V_OFFSET};
pub use typed::{
	default_domain_type, default_request_type, domain_separator, eip712_domain,
	forward_request_typed_data, personal_sign_hash, typed_data_hash,
};

#[derive(Debug, Error)]
pub enum SignatureError {
	#[error("Signature is not valid hex: {0}")]
	InvalidHex(String),
	#[error("Signature must be 65 bytes, got {0}")]
	InvalidLength(usize),
	#[error("Invalid typed data: {0}")]
	TypedData(String),
	#[error("Wallet returned an unexpected response: {0}")]
	UnexpectedResponse(String),
	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
	#[error("Wallet error: {0}")]
	Provider(#[from] RpcError),
}
