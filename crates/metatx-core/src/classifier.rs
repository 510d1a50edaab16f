//! Classification of `eth_sendTransaction` calls and relay request assembly.
//!
//! The classifier decides whether a transaction can be relayed, which flow it
//! takes and builds the envelope for the relayer. Registration gaps are
//! resolved by the [`RegistrationPolicy`]; anything else that goes wrong is a
//! [`CoreError`] and is also published on the event bus.

use crate::context::{ReadyContext, RegistrationContext};
use crate::error::CoreError;
use crate::policy::{RegistrationGap, RegistrationPolicy};
use alloy::primitives::{Address, Bytes, U256};
use metatx_forwarder::ForwarderResolver;
use metatx_relay::RelayDispatcher;
use metatx_signature::{domain_separator, ForwardSignature, SignatureBuilder};
use metatx_types::{
	estimate_gas, to_hex_quantity, ErrorCode, EventBus, ForwardRequest, MetaApi,
	MetaTransactionType, ProviderInterface, RelayOutcome, RelayRequestEnvelope, SdkEvent,
	SignatureType, FORWARD_REQUEST_TTL_SECS, GAS_ESTIMATE_MARGIN,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Transaction object accepted by `eth_sendTransaction`, including the
/// SDK-specific fields a dApp may add.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
	pub from: Option<Address>,
	pub to: Option<Address>,
	pub data: Option<Bytes>,
	pub gas: Option<Value>,
	pub gas_limit: Option<Value>,
	pub tx_gas: Option<Value>,
	pub batch_id: Option<Value>,
	pub signature_type: Option<String>,
	pub signature: Option<String>,
	pub sign_typed_data_type: Option<String>,
	pub domain_name: Option<String>,
	pub domain_version: Option<String>,
}

impl TransactionRequest {
	/// Reads the transaction from `params[0]`.
	pub fn from_params(params: &Value) -> Result<Self, CoreError> {
		let tx = params
			.get(0)
			.ok_or_else(|| CoreError::sdk(ErrorCode::InvalidPayload, "Missing transaction object"))?;
		serde_json::from_value(tx.clone()).map_err(|e| {
			CoreError::sdk(
				ErrorCode::InvalidPayload,
				format!("Invalid transaction object: {}", e),
			)
		})
	}

	/// The caller's gas limit as a hex quantity.
	fn gas_limit_hex(&self) -> Result<Option<String>, CoreError> {
		self.gas
			.as_ref()
			.or(self.gas_limit.as_ref())
			.map(|value| {
				to_hex_quantity(value).ok_or_else(|| {
					CoreError::sdk(ErrorCode::InvalidPayload, format!("Invalid gas limit: {}", value))
				})
			})
			.transpose()
	}
}

/// Parses a number, decimal string or hex string payload field.
pub(crate) fn parse_quantity(value: &Value, field: &str) -> Result<U256, CoreError> {
	let parsed = match value {
		Value::Number(n) => n.as_u64().map(U256::from),
		Value::String(s) => s.parse::<U256>().ok(),
		_ => None,
	};
	parsed.ok_or_else(|| {
		CoreError::sdk(
			ErrorCode::InvalidPayload,
			format!("Invalid {}: {}", field, value),
		)
	})
}

/// Builds and dispatches relay requests for registered contracts.
pub struct TransactionClassifier {
	pub(crate) context: Arc<RegistrationContext>,
	pub(crate) policy: RegistrationPolicy,
	pub(crate) reader: Arc<dyn ProviderInterface>,
	pub(crate) signatures: SignatureBuilder,
	pub(crate) forwarders: Option<Arc<ForwarderResolver>>,
	pub(crate) dispatcher: RelayDispatcher,
	pub(crate) events: EventBus,
	pub(crate) domain_name: Option<String>,
	pub(crate) domain_version: Option<String>,
}

impl TransactionClassifier {
	/// `reader` serves gas estimates and contract reads; `signatures` asks
	/// the user's wallet for signatures.
	pub fn new(
		context: Arc<RegistrationContext>,
		policy: RegistrationPolicy,
		reader: Arc<dyn ProviderInterface>,
		signatures: SignatureBuilder,
		dispatcher: RelayDispatcher,
		events: EventBus,
	) -> Self {
		Self {
			context,
			policy,
			reader,
			signatures,
			forwarders: None,
			dispatcher,
			events,
			domain_name: None,
			domain_version: None,
		}
	}

	pub fn with_forwarder_resolver(mut self, resolver: Arc<ForwarderResolver>) -> Self {
		self.forwarders = Some(resolver);
		self
	}

	/// Default domain name and version used when a call does not override them.
	pub fn with_domain_overrides(mut self, name: Option<String>, version: Option<String>) -> Self {
		self.domain_name = name;
		self.domain_version = version;
		self
	}

	pub fn context(&self) -> &RegistrationContext {
		&self.context
	}

	pub fn policy(&self) -> RegistrationPolicy {
		self.policy
	}

	/// Relays an `eth_sendTransaction` call.
	pub async fn send_transaction(&self, params: &Value) -> Result<RelayOutcome, CoreError> {
		let result = self.relay_transaction(params).await;
		self.report(result)
	}

	/// Publishes every SDK error before it is returned.
	pub(crate) fn report<T>(&self, result: Result<T, CoreError>) -> Result<T, CoreError> {
		if let Err(e) = &result {
			if !e.is_internal() {
				self.events.publish(SdkEvent::SdkError(e.to_sdk_error()));
			}
		}
		result
	}

	async fn relay_transaction(&self, params: &Value) -> Result<RelayOutcome, CoreError> {
		let ready = self.context.ensure_ready()?;
		let tx = TransactionRequest::from_params(params)?;
		let to = tx
			.to
			.ok_or_else(|| CoreError::sdk(ErrorCode::InvalidPayload, "Missing 'to' address"))?;

		if !ready.knows(&to) {
			let reason = self.policy.resolve(RegistrationGap::ContractNotRegistered(to))?;
			return Ok(RelayOutcome::Fallback(reason));
		}

		let data = tx.data.clone().unwrap_or_default();
		let method = ready.decode_call(&to, &data).map_err(|e| {
			CoreError::sdk(
				ErrorCode::WrongAbi,
				format!(
					"Can't decode method information from payload ({}). Make sure you have uploaded the correct ABI on the dashboard",
					e
				),
			)
		})?;

		let Some(resolved) = ready.resolve_api(&to, &method.name) else {
			let reason = self.policy.resolve(RegistrationGap::ApiNotRegistered {
				contract: to,
				method: method.name.clone(),
			})?;
			return Ok(RelayOutcome::Fallback(reason));
		};

		let from = tx
			.from
			.ok_or_else(|| CoreError::sdk(ErrorCode::InvalidPayload, "Missing 'from' address"))?;
		let (api, approach) = (resolved.api, resolved.approach);
		check_relayable(approach, api)?;

		let gas_limit = tx.gas_limit_hex()?;
		tracing::debug!(
			%from,
			%to,
			method = %method.name,
			?approach,
			via_wallet = resolved.via_wallet,
			"Classified transaction"
		);

		let envelope = match approach {
			MetaTransactionType::TrustedForwarder => {
				let supplied_gas = tx
					.tx_gas
					.as_ref()
					.map(|value| parse_quantity(value, "txGas"))
					.transpose()?;
				let tx_gas = self
					.tx_gas(&ready, supplied_gas, from, to, &data, resolved.via_wallet)
					.await?;
				let batch_id = tx
					.batch_id
					.as_ref()
					.map(|value| parse_quantity(value, "batchId"))
					.transpose()?
					.unwrap_or(U256::ZERO);
				let (request, forwarder) = self
					.build_forward_request(from, to, tx_gas, batch_id, data)
					.await?;

				let domain = ready.domain_for(
					forwarder,
					tx.domain_name.as_deref().or(self.domain_name.as_deref()),
					tx.domain_version.as_deref().or(self.domain_version.as_deref()),
				);
				let scheme = SignatureType::from_payload(tx.signature_type.as_deref(), ready.eip712_sign);
				let signed = match &tx.signature {
					Some(signature) => ForwardSignature {
						signature: signature.clone(),
						domain_separator: (scheme == SignatureType::Eip712)
							.then(|| domain_separator(&domain)),
					},
					None => {
						self.signatures
							.sign_forward_request(
								scheme,
								&ready.types,
								&domain,
								&request,
								tx.sign_typed_data_type.as_deref(),
							)
							.await?
					}
				};

				forwarded_envelope(&ready, from, api, to, gas_limit, &request, signed, scheme)?
			}
			_ => RelayRequestEnvelope::direct(from, api.id.clone(), to, gas_limit, method.args_json()),
		};

		Ok(self.dispatcher.dispatch(&envelope).await?)
	}

	/// Gas for the forwarded call.
	///
	/// A positive caller-supplied value is used as is; otherwise the call is
	/// estimated on chain and the forwarder margin is added. Wallet instances
	/// are estimated against the registered wallet ABI.
	pub(crate) async fn tx_gas(
		&self,
		ready: &ReadyContext<'_>,
		supplied: Option<U256>,
		from: Address,
		to: Address,
		data: &Bytes,
		via_wallet: bool,
	) -> Result<u64, CoreError> {
		if let Some(gas) = supplied.filter(|gas| !gas.is_zero()) {
			return Ok(gas.saturating_to());
		}
		if !via_wallet && !ready.contract_abis.contains_key(&to) {
			return Err(CoreError::sdk(
				ErrorCode::SmartContractNotFound,
				format!("Smart contract ABI not found for {}", to),
			));
		}

		let estimate = estimate_gas(self.reader.as_ref(), from, to, data)
			.await
			.map_err(CoreError::Estimation)?;
		let tx_gas = estimate.saturating_add(GAS_ESTIMATE_MARGIN);
		tracing::debug!(%to, estimate, tx_gas, "Estimated forwarded call gas");
		Ok(tx_gas)
	}

	pub(crate) fn resolver(&self) -> Result<&ForwarderResolver, CoreError> {
		self.forwarders.as_deref().ok_or_else(|| {
			CoreError::sdk(
				ErrorCode::BiconomyForwarderUndefined,
				"Biconomy forwarder is not defined for the current network",
			)
		})
	}

	/// Resolves the forwarder of `to` and builds a request with a fresh nonce.
	pub(crate) async fn build_forward_request(
		&self,
		from: Address,
		to: Address,
		tx_gas: u64,
		batch_id: U256,
		data: Bytes,
	) -> Result<(ForwardRequest, Address), CoreError> {
		let resolver = self.resolver()?;
		let forwarder = resolver.resolve(to).await;
		let batch_nonce = resolver.get_nonce(forwarder, from, batch_id).await?;
		let deadline = chrono::Utc::now().timestamp().max(0) as u64 + FORWARD_REQUEST_TTL_SECS;

		tracing::debug!(%from, %to, %forwarder, %batch_nonce, deadline, "Built forward request");
		Ok((
			ForwardRequest::new(from, to, tx_gas, batch_id, batch_nonce, deadline, data),
			forwarder,
		))
	}
}

/// Rejects flows the relay pipeline cannot serve.
pub(crate) fn check_relayable(approach: MetaTransactionType, api: &MetaApi) -> Result<(), CoreError> {
	if approach == MetaTransactionType::Erc20Forwarder {
		return Err(CoreError::sdk(
			ErrorCode::InvalidPayload,
			"ERC20 forwarder contracts must use the ERC20 forwarder client",
		));
	}
	if !api.is_native() {
		return Err(CoreError::sdk(
			ErrorCode::InvalidOperation,
			format!("API {} is not served by the native meta transaction endpoint", api.id),
		));
	}
	Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn forwarded_envelope(
	ready: &ReadyContext<'_>,
	from: Address,
	api: &MetaApi,
	to: Address,
	gas_limit: Option<String>,
	request: &ForwardRequest,
	signed: ForwardSignature,
	scheme: SignatureType,
) -> Result<RelayRequestEnvelope, CoreError> {
	RelayRequestEnvelope::forwarded(
		from,
		api.id.clone(),
		to,
		gas_limit,
		request,
		signed.domain_separator,
		signed.signature,
		ready.signature_type_constant(scheme == SignatureType::Eip712),
	)
	.map_err(|e| CoreError::Internal(format!("Failed to encode forward request: {}", e)))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::*;
	use alloy::primitives::Signature;
	use metatx_signature::personal_sign_hash;
	use metatx_types::{relay_flags, FallbackReason, RelayReceipt};
	use serde_json::json;

	fn send_params(to: Address, extra: Value) -> Value {
		let mut tx = json!({
			"from": user(),
			"to": to,
			"data": set_quote_calldata("hello"),
		});
		if let (Some(tx), Some(extra)) = (tx.as_object_mut(), extra.as_object()) {
			tx.extend(extra.clone());
		}
		json!([tx])
	}

	#[tokio::test]
	async fn test_personal_flow_posts_two_params_and_personal_constant() {
		let harness = Harness::start(RegistrationPolicy::Lenient, accepted("tx123")).await;

		let outcome = harness
			.classifier
			.send_transaction(&send_params(TARGET, json!({ "gasLimit": 120000 })))
			.await
			.unwrap();
		assert_eq!(
			outcome,
			RelayOutcome::Relayed(RelayReceipt {
				transaction_id: Some("tx123".into()),
				tx_hash: None,
				flag: relay_flags::SUCCESS,
			})
		);

		let envelopes = harness.relayed_envelopes().await;
		assert_eq!(envelopes.len(), 1);
		let envelope = &envelopes[0];
		assert_eq!(envelope["apiId"], "api-quote");
		assert_eq!(envelope["signatureType"], "PERSONAL_SIGN");
		assert_eq!(envelope["gasLimit"], "0x1d4c0");
		let params = envelope["params"].as_array().unwrap();
		assert_eq!(params.len(), 2);

		let request: ForwardRequest = serde_json::from_value(params[0].clone()).unwrap();
		assert_eq!(request.from, user());
		assert_eq!(request.to, TARGET);
		assert_eq!(request.batch_nonce, U256::from(NONCE));
		assert_eq!(request.tx_gas, ESTIMATE + GAS_ESTIMATE_MARGIN);

		let raw = hex::decode(params[1].as_str().unwrap().trim_start_matches("0x")).unwrap();
		let signature = Signature::from_raw(&raw).unwrap();
		assert_eq!(
			signature
				.recover_address_from_msg(personal_sign_hash(&request).as_slice())
				.unwrap(),
			user()
		);
	}

	#[tokio::test]
	async fn test_eip712_flow_orders_request_separator_signature() {
		let harness = Harness::start(RegistrationPolicy::Lenient, accepted("tx123")).await;

		harness
			.classifier
			.send_transaction(&send_params(
				TARGET,
				json!({ "signatureType": "EIP712_SIGN", "txGas": 90000 }),
			))
			.await
			.unwrap();

		let envelope = &harness.relayed_envelopes().await[0];
		assert_eq!(envelope["signatureType"], "EIP712_SIGN");
		assert!(envelope.get("gasLimit").is_none());
		let params = envelope["params"].as_array().unwrap();
		assert_eq!(params.len(), 3);
		assert!(params[0].is_object());
		assert_eq!(params[0]["txGas"], 90000);
		let domain = context()
			.ensure_ready()
			.unwrap()
			.domain_for(FORWARDER, None, None);
		assert_eq!(params[1], json!(domain_separator(&domain).to_string()));
		assert_eq!(params[2].as_str().unwrap().len(), 132);
		assert_eq!(harness.chain.count("eth_estimateGas"), 0);
	}

	#[tokio::test]
	async fn test_supplied_signature_is_used_verbatim() {
		let harness = Harness::start(RegistrationPolicy::Lenient, accepted("tx9")).await;
		let signature = format!("0x{}1b", "ab".repeat(64));

		harness
			.classifier
			.send_transaction(&send_params(
				TARGET,
				json!({ "signature": signature, "txGas": "0x15f90" }),
			))
			.await
			.unwrap();

		let envelope = &harness.relayed_envelopes().await[0];
		assert_eq!(envelope["params"][1], json!(signature));
		assert_eq!(envelope["params"][0]["txGas"], 90000);
	}

	#[tokio::test]
	async fn test_direct_flow_posts_decoded_arguments() {
		let harness = Harness::start(RegistrationPolicy::Lenient, accepted("tx5")).await;

		harness
			.classifier
			.send_transaction(&send_params(DIRECT_TARGET, json!({ "gas": "21000" })))
			.await
			.unwrap();

		let envelope = &harness.relayed_envelopes().await[0];
		assert_eq!(envelope["apiId"], "api-direct");
		assert_eq!(envelope["params"], json!(["hello"]));
		assert_eq!(envelope["gasLimit"], "0x5208");
		assert!(envelope.get("signatureType").is_none());
	}

	#[tokio::test]
	async fn test_strict_switch_on_unregistered_method() {
		let params = json!([{
			"from": user(),
			"to": TARGET,
			"data": unregistered_calldata(),
		}]);

		let lenient = Harness::start(RegistrationPolicy::Lenient, accepted("tx1")).await;
		assert_eq!(
			lenient.classifier.send_transaction(&params).await.unwrap(),
			RelayOutcome::Fallback(FallbackReason::ApiNotRegistered {
				contract: TARGET,
				method: "unregistered".into(),
			})
		);

		let strict = Harness::start(RegistrationPolicy::Strict, accepted("tx1")).await;
		let mut events = strict.events.subscribe();
		let err = strict.classifier.send_transaction(&params).await.unwrap_err();
		assert_eq!(err.to_sdk_error().code, ErrorCode::ApiNotFound);
		assert_eq!(
			events.recv().await.unwrap(),
			SdkEvent::SdkError(err.to_sdk_error())
		);
		assert!(strict.relayed_envelopes().await.is_empty());
	}

	#[tokio::test]
	async fn test_unregistered_wallet_instance_relays_through_wallet_api() {
		let context = RegistrationContext::from_registration(&wallet_registration())
			.unwrap()
			.with_system_info(system_info());
		let harness = Harness::start_with(context, RegistrationPolicy::Strict, accepted("tx-scw")).await;

		let instance = Address::with_last_byte(0x77);
		let outcome = harness
			.classifier
			.send_transaction(&json!([{
				"from": user(),
				"to": instance,
				"data": execute_calldata(&[1, 2, 3]),
			}]))
			.await
			.unwrap();
		assert!(matches!(outcome, RelayOutcome::Relayed(_)));

		let envelopes = harness.relayed_envelopes().await;
		assert_eq!(envelopes.len(), 1);
		assert_eq!(envelopes[0]["apiId"], "api-wallet");
		assert_eq!(envelopes[0]["to"], json!(instance));
		let request: ForwardRequest = serde_json::from_value(envelopes[0]["params"][0].clone()).unwrap();
		assert_eq!(request.to, instance);
		assert_eq!(request.tx_gas, ESTIMATE + GAS_ESTIMATE_MARGIN);

		let err = harness
			.classifier
			.send_transaction(&json!([{ "from": user(), "to": instance, "data": "0xdeadbeef" }]))
			.await
			.unwrap_err();
		assert_eq!(err.to_sdk_error().code, ErrorCode::WrongAbi);
	}

	#[tokio::test]
	async fn test_unknown_contract_follows_policy() {
		let other = Address::with_last_byte(0x01);
		let lenient = Harness::start(RegistrationPolicy::Lenient, accepted("tx1")).await;
		assert_eq!(
			lenient
				.classifier
				.send_transaction(&send_params(other, json!({})))
				.await
				.unwrap(),
			RelayOutcome::Fallback(FallbackReason::ContractNotRegistered(other))
		);

		let strict = Harness::start(RegistrationPolicy::Strict, accepted("tx1")).await;
		let err = strict
			.classifier
			.send_transaction(&send_params(other, json!({})))
			.await
			.unwrap_err();
		assert_eq!(err.to_sdk_error().code, ErrorCode::BiconomyNotInitialized);
	}

	#[tokio::test]
	async fn test_undecodable_calldata_is_wrong_abi() {
		let harness = Harness::start(RegistrationPolicy::Lenient, accepted("tx1")).await;
		let err = harness
			.classifier
			.send_transaction(&json!([{ "from": user(), "to": TARGET, "data": "0xdeadbeef" }]))
			.await
			.unwrap_err();
		assert_eq!(err.to_sdk_error().code, ErrorCode::WrongAbi);
	}

	#[tokio::test]
	async fn test_missing_from_is_invalid_payload() {
		let harness = Harness::start(RegistrationPolicy::Lenient, accepted("tx1")).await;
		let err = harness
			.classifier
			.send_transaction(&json!([{ "to": TARGET, "data": set_quote_calldata("x") }]))
			.await
			.unwrap_err();
		assert_eq!(err.to_sdk_error().code, ErrorCode::InvalidPayload);
	}

	#[tokio::test]
	async fn test_estimation_failure_is_returned() {
		let harness = Harness::start(RegistrationPolicy::Lenient, accepted("tx1")).await;
		harness.chain.fail_estimation();

		let err = harness
			.classifier
			.send_transaction(&send_params(TARGET, json!({})))
			.await
			.unwrap_err();
		assert!(matches!(err, CoreError::Estimation(_)));
		assert!(harness.relayed_envelopes().await.is_empty());
	}

	#[tokio::test]
	async fn test_erc20_and_non_native_apis_are_rejected() {
		let api = MetaApi {
			id: "legacy".into(),
			contract_address: TARGET,
			method: "setQuote".into(),
			url: "/api/v2/meta-tx/forward".into(),
			contract_type: None,
		};
		assert_eq!(
			check_relayable(MetaTransactionType::Default, &api)
				.unwrap_err()
				.to_sdk_error()
				.code,
			ErrorCode::InvalidOperation
		);
		assert_eq!(
			check_relayable(MetaTransactionType::Erc20Forwarder, &api)
				.unwrap_err()
				.to_sdk_error()
				.code,
			ErrorCode::InvalidPayload
		);
	}

	#[test]
	fn test_parse_quantity_forms() {
		assert_eq!(parse_quantity(&json!(7), "batchId").unwrap(), U256::from(7));
		assert_eq!(parse_quantity(&json!("0x10"), "batchId").unwrap(), U256::from(16));
		assert_eq!(parse_quantity(&json!("12"), "batchId").unwrap(), U256::from(12));
		assert!(parse_quantity(&json!(true), "batchId").is_err());
	}
}
