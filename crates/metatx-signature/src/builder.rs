//! Obtains forward-request signatures from the user's wallet.

use crate::normalize::normalize_signature;
use crate::typed::{domain_separator, forward_request_typed_data, personal_sign_hash};
use crate::SignatureError;
use alloy::primitives::{Address, B256};
use metatx_types::{ForwardRequest, ForwarderDomainData, ProviderInterface, SignatureType, TypeField};
use serde_json::{json, Value};
use std::sync::Arc;

/// JSON-RPC method used to request an EIP-712 signature.
///
/// `v3` is honoured for wallets that predate `eth_signTypedData_v4`.
pub fn typed_data_method(version: Option<&str>) -> &'static str {
	match version {
		Some("v3") | Some("V3") => "eth_signTypedData_v3",
		_ => "eth_signTypedData_v4",
	}
}

/// EIP-712 type definitions served by the relayer.
#[derive(Debug, Clone)]
pub struct ForwarderTypes {
	pub domain_type: Vec<TypeField>,
	pub request_type: Vec<TypeField>,
}

/// A signed forward request, ready for the relay envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardSignature {
	pub signature: String,
	/// Present for EIP-712 signatures only.
	pub domain_separator: Option<B256>,
}

/// Requests signatures through a wallet provider.
#[derive(Clone)]
pub struct SignatureBuilder {
	signer: Arc<dyn ProviderInterface>,
}

impl SignatureBuilder {
	pub fn new(signer: Arc<dyn ProviderInterface>) -> Self {
		Self { signer }
	}

	/// Signs a typed-data document with `[account, JSON string]` params.
	pub async fn sign_typed_data(
		&self,
		account: Address,
		document: &Value,
		version: Option<&str>,
	) -> Result<String, SignatureError> {
		let method = typed_data_method(version);
		tracing::debug!(%account, method, "Requesting typed data signature");
		let result = self
			.signer
			.request(method, json!([account, document.to_string()]))
			.await?;
		normalize_signature(response_str(&result)?)
	}

	/// Signs a 32-byte digest with `personal_sign`.
	pub async fn sign_personal(&self, account: Address, digest: B256) -> Result<String, SignatureError> {
		tracing::debug!(%account, "Requesting personal signature");
		let result = self
			.signer
			.request("personal_sign", json!([digest, account]))
			.await?;
		normalize_signature(response_str(&result)?)
	}

	/// Signs `request` with the selected scheme against a per-call domain.
	pub async fn sign_forward_request(
		&self,
		scheme: SignatureType,
		types: &ForwarderTypes,
		domain: &ForwarderDomainData,
		request: &ForwardRequest,
		version: Option<&str>,
	) -> Result<ForwardSignature, SignatureError> {
		match scheme {
			SignatureType::Eip712 => {
				let document = forward_request_typed_data(
					&types.domain_type,
					&types.request_type,
					domain,
					request,
				)?;
				let signature = self.sign_typed_data(request.from, &document, version).await?;
				Ok(ForwardSignature {
					signature,
					domain_separator: Some(domain_separator(domain)),
				})
			}
			SignatureType::Personal => {
				let signature = self
					.sign_personal(request.from, personal_sign_hash(request))
					.await?;
				Ok(ForwardSignature {
					signature,
					domain_separator: None,
				})
			}
		}
	}
}

fn response_str(value: &Value) -> Result<&str, SignatureError> {
	value
		.as_str()
		.ok_or_else(|| SignatureError::UnexpectedResponse(value.to_string()))
}
