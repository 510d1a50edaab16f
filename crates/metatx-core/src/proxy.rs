//! Drop-in provider that relays transactions through the meta-transaction API.
//!
//! [`MetaTxProvider`] wraps the dApp's provider. Sending calls go to the
//! [`TransactionClassifier`]; every other method reaches the wrapped provider
//! untouched. When a transaction cannot be relayed the original call is
//! issued once against the wrapped provider.

use crate::classifier::TransactionClassifier;
use crate::error::CoreError;
use async_trait::async_trait;
use metatx_types::{JsonRpcRequest, JsonRpcResponse, ProviderInterface, RelayOutcome, RpcError};
use serde_json::{json, Value};
use std::sync::Arc;

const SEND_TRANSACTION: &str = "eth_sendTransaction";
const SEND_RAW_TRANSACTION: &str = "eth_sendRawTransaction";

pub struct MetaTxProvider {
	inner: Arc<dyn ProviderInterface>,
	classifier: Arc<TransactionClassifier>,
}

impl MetaTxProvider {
	pub fn new(inner: Arc<dyn ProviderInterface>, classifier: Arc<TransactionClassifier>) -> Self {
		Self { inner, classifier }
	}

	/// The wrapped provider.
	pub fn inner(&self) -> &Arc<dyn ProviderInterface> {
		&self.inner
	}

	pub fn classifier(&self) -> &Arc<TransactionClassifier> {
		&self.classifier
	}

	/// `send(payload)`: answers a full JSON-RPC request object.
	pub async fn send(&self, payload: JsonRpcRequest) -> JsonRpcResponse {
		let result = self.route(&payload.method, payload.params).await;
		JsonRpcResponse::from_result(payload.id, result)
	}

	/// `send(method, params)`: returns the bare result.
	pub async fn send_method(&self, method: &str, params: Value) -> Result<Value, RpcError> {
		self.route(method, params).await
	}

	/// `send(payload, callback)`: the callback receives the error or the
	/// response envelope, exactly once.
	pub async fn send_with_callback<F>(&self, payload: JsonRpcRequest, callback: F)
	where
		F: FnOnce(Result<JsonRpcResponse, RpcError>) + Send,
	{
		let id = payload.id.clone();
		match self.route(&payload.method, payload.params).await {
			Ok(result) => callback(Ok(JsonRpcResponse::from_result(id, Ok(result)))),
			Err(e) => callback(Err(e)),
		}
	}

	/// `send_async(payload, callback)`, the legacy name of the callback form.
	pub async fn send_async<F>(&self, payload: JsonRpcRequest, callback: F)
	where
		F: FnOnce(Result<JsonRpcResponse, RpcError>) + Send,
	{
		self.send_with_callback(payload, callback).await
	}

	async fn route(&self, method: &str, params: Value) -> Result<Value, RpcError> {
		let outcome = match method {
			SEND_TRANSACTION => self.classifier.send_transaction(&params).await,
			SEND_RAW_TRANSACTION => self.classifier.send_raw_transaction(&params).await,
			_ => return self.inner.request(method, params).await,
		};

		match outcome {
			Ok(RelayOutcome::Relayed(receipt)) => Ok(receipt.result_value()),
			Ok(RelayOutcome::Fallback(reason)) => {
				tracing::info!(method, %reason, "Sending through the wrapped provider");
				self.fallback(method, params).await
			}
			Err(e @ CoreError::Internal(_)) => {
				tracing::error!(method, error = %e, "Relay pipeline fault, sending through the wrapped provider");
				self.fallback(method, params).await
			}
			Err(e) => Err(e.to_rpc_error()),
		}
	}

	async fn fallback(&self, method: &str, params: Value) -> Result<Value, RpcError> {
		let params = if method == SEND_RAW_TRANSACTION {
			raw_fallback_params(params)
		} else {
			params
		};
		self.inner.request(method, params).await
	}
}

/// The object form of `eth_sendRawTransaction` becomes `[rawTransaction]`.
fn raw_fallback_params(params: Value) -> Value {
	match params.get(0).and_then(|first| first.get("rawTransaction")) {
		Some(raw) => json!([raw]),
		None => params,
	}
}

#[async_trait]
impl ProviderInterface for MetaTxProvider {
	async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
		self.route(method, params).await
	}
}
