//! Relaying of pre-signed raw transactions.
//!
//! `eth_sendRawTransaction` carries either the raw hex transaction or an
//! object that adds the forward request and its signature. The raw
//! transaction is decoded and its signer recovered to learn the sender,
//! target and calldata.

use crate::classifier::{check_relayable, forwarded_envelope, TransactionClassifier};
use crate::error::CoreError;
use crate::policy::RegistrationGap;
use alloy::consensus::transaction::SignerRecoverable;
use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{Address, Bytes, B256, U256};
use metatx_signature::{
	domain_separator, forward_request_typed_data, personal_sign_hash, ForwardSignature,
};
use metatx_types::{
	ErrorCode, ForwardRequest, MetaTransactionType, RelayOutcome, RelayRequestEnvelope,
	SignatureType,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The object form of `eth_sendRawTransaction` params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransactionRequest {
	pub raw_transaction: Bytes,
	#[serde(default)]
	pub signature: Option<String>,
	#[serde(default)]
	pub signature_type: Option<String>,
	#[serde(default)]
	pub forward_request: Option<ForwardRequest>,
	#[serde(default)]
	pub domain_name: Option<String>,
	#[serde(default)]
	pub domain_version: Option<String>,
}

impl RawTransactionRequest {
	/// Accepts a bare hex string or the object form in `params[0]`.
	pub fn from_params(params: &Value) -> Result<Self, CoreError> {
		let invalid = |e: serde_json::Error| {
			CoreError::sdk(
				ErrorCode::InvalidPayload,
				format!("Invalid raw transaction: {}", e),
			)
		};
		match params.get(0) {
			Some(raw @ Value::String(_)) => Ok(Self {
				raw_transaction: serde_json::from_value(raw.clone()).map_err(invalid)?,
				signature: None,
				signature_type: None,
				forward_request: None,
				domain_name: None,
				domain_version: None,
			}),
			Some(object @ Value::Object(_)) => serde_json::from_value(object.clone()).map_err(invalid),
			_ => Err(CoreError::sdk(
				ErrorCode::InvalidPayload,
				"Expected a raw transaction string or object",
			)),
		}
	}
}

/// Fields recovered from a signed raw transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRawTransaction {
	pub from: Address,
	pub to: Address,
	pub data: Bytes,
	pub gas_limit: u64,
}

impl DecodedRawTransaction {
	pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
		let envelope = TxEnvelope::decode_2718(&mut &raw[..]).map_err(|e| {
			CoreError::sdk(ErrorCode::InvalidData, format!("Invalid raw transaction: {}", e))
		})?;
		let from = envelope.recover_signer().map_err(|e| {
			CoreError::sdk(
				ErrorCode::InvalidData,
				format!("Cannot recover raw transaction signer: {}", e),
			)
		})?;
		let to = envelope.to().ok_or_else(|| {
			CoreError::sdk(
				ErrorCode::InvalidPayload,
				"Contract deployments cannot be relayed",
			)
		})?;

		Ok(Self {
			from,
			to,
			data: envelope.input().clone(),
			gas_limit: envelope.gas_limit(),
		})
	}

	fn gas_limit_hex(&self) -> String {
		format!("{:#x}", self.gas_limit)
	}
}

/// Forward request of a raw transaction with both payloads a wallet may sign.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardRequestToSign {
	/// Typed-data document for `eth_signTypedData_v4`.
	pub eip712_format: Value,
	/// Digest for `personal_sign`.
	pub personal_signature_format: B256,
	pub request: ForwardRequest,
}

impl TransactionClassifier {
	/// Relays an `eth_sendRawTransaction` call.
	pub async fn send_raw_transaction(&self, params: &Value) -> Result<RelayOutcome, CoreError> {
		let result = self.relay_raw_transaction(params).await;
		self.report(result)
	}

	async fn relay_raw_transaction(&self, params: &Value) -> Result<RelayOutcome, CoreError> {
		let ready = self.context.ensure_ready()?;
		let request = RawTransactionRequest::from_params(params)?;
		let tx = DecodedRawTransaction::decode(&request.raw_transaction)?;

		if !ready.knows(&tx.to) {
			let reason = self
				.policy
				.resolve(RegistrationGap::ContractNotRegistered(tx.to))?;
			return Ok(RelayOutcome::Fallback(reason));
		}

		let method = match ready.decode_call(&tx.to, &tx.data) {
			Ok(method) => method,
			Err(e) => {
				tracing::debug!(to = %tx.to, error = %e, "Raw transaction does not match the registered ABI");
				let reason = self
					.policy
					.resolve(RegistrationGap::UndecodableRawTransaction(tx.to))?;
				return Ok(RelayOutcome::Fallback(reason));
			}
		};

		let Some(resolved) = ready.resolve_api(&tx.to, &method.name) else {
			let reason = self.policy.resolve(RegistrationGap::ApiNotRegistered {
				contract: tx.to,
				method: method.name.clone(),
			})?;
			return Ok(RelayOutcome::Fallback(reason));
		};

		let (api, approach) = (resolved.api, resolved.approach);
		check_relayable(approach, api)?;
		tracing::debug!(from = %tx.from, to = %tx.to, method = %method.name, ?approach, "Classified raw transaction");

		let envelope = match approach {
			MetaTransactionType::TrustedForwarder => {
				let forward_request = request.forward_request.as_ref().ok_or_else(|| {
					CoreError::sdk(
						ErrorCode::InvalidPayload,
						"forwardRequest is required for trusted forwarder contracts",
					)
				})?;
				let signature = request.signature.clone().ok_or_else(|| {
					CoreError::sdk(
						ErrorCode::InvalidPayload,
						"signature is required for trusted forwarder contracts",
					)
				})?;

				let forwarder = self.resolver()?.resolve(tx.to).await;
				let scheme = SignatureType::from_payload(request.signature_type.as_deref(), ready.eip712_sign);
				let domain_separator = (scheme == SignatureType::Eip712).then(|| {
					domain_separator(&ready.domain_for(
						forwarder,
						request.domain_name.as_deref().or(self.domain_name.as_deref()),
						request.domain_version.as_deref().or(self.domain_version.as_deref()),
					))
				});

				forwarded_envelope(
					&ready,
					tx.from,
					api,
					tx.to,
					Some(tx.gas_limit_hex()),
					forward_request,
					ForwardSignature {
						signature,
						domain_separator,
					},
					scheme,
				)?
			}
			_ => RelayRequestEnvelope::direct(
				tx.from,
				api.id.clone(),
				tx.to,
				Some(tx.gas_limit_hex()),
				method.args_json(),
			),
		};

		Ok(self.dispatcher.dispatch(&envelope).await?)
	}

	/// Builds the forward request for `raw` and the payloads to sign offline.
	///
	/// The gas limit of the raw transaction becomes `txGas`; a zero limit is
	/// replaced by an on-chain estimate.
	pub async fn get_forward_request_and_message_to_sign(
		&self,
		raw: &[u8],
		batch_id: Option<U256>,
		domain_name: Option<&str>,
		domain_version: Option<&str>,
	) -> Result<ForwardRequestToSign, CoreError> {
		let result = self
			.forward_request_to_sign(raw, batch_id, domain_name, domain_version)
			.await;
		self.report(result)
	}

	async fn forward_request_to_sign(
		&self,
		raw: &[u8],
		batch_id: Option<U256>,
		domain_name: Option<&str>,
		domain_version: Option<&str>,
	) -> Result<ForwardRequestToSign, CoreError> {
		let ready = self.context.ensure_ready()?;
		let tx = DecodedRawTransaction::decode(raw)?;

		if !ready.knows(&tx.to) {
			return Err(CoreError::sdk(
				ErrorCode::SmartContractNotFound,
				format!("Smart contract {} is not registered on the dashboard", tx.to),
			));
		}
		let method = ready.decode_call(&tx.to, &tx.data).map_err(|e| {
			CoreError::sdk(
				ErrorCode::WrongAbi,
				format!("Can't decode method information from raw transaction: {}", e),
			)
		})?;
		let Some(resolved) = ready.resolve_api(&tx.to, &method.name) else {
			return Err(CoreError::sdk(
				ErrorCode::ApiNotFound,
				format!("No API registered for method {}", method.name),
			));
		};
		if resolved.approach != MetaTransactionType::TrustedForwarder {
			return Err(CoreError::sdk(
				ErrorCode::InvalidOperation,
				format!("Contract {} does not use a trusted forwarder", tx.to),
			));
		}

		let tx_gas = self
			.tx_gas(
				&ready,
				Some(U256::from(tx.gas_limit)),
				tx.from,
				tx.to,
				&tx.data,
				resolved.via_wallet,
			)
			.await?;
		let (request, forwarder) = self
			.build_forward_request(
				tx.from,
				tx.to,
				tx_gas,
				batch_id.unwrap_or(U256::ZERO),
				tx.data.clone(),
			)
			.await?;

		let domain = ready.domain_for(
			forwarder,
			domain_name.or(self.domain_name.as_deref()),
			domain_version.or(self.domain_version.as_deref()),
		);
		let eip712_format = forward_request_typed_data(
			&ready.types.domain_type,
			&ready.types.request_type,
			&domain,
			&request,
		)?;

		Ok(ForwardRequestToSign {
			eip712_format,
			personal_signature_format: personal_sign_hash(&request),
			request,
		})
	}
}
