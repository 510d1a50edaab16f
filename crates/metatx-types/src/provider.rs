//! The EIP-1193 style provider seam.
//!
//! Everything the SDK needs from a node or wallet is expressed as a JSON-RPC
//! `request(method, params)` call. Wallet adapters, read-only RPC clients and
//! the SDK proxy itself all implement [`ProviderInterface`].

use alloy::primitives::{Address, Bytes, U64};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// JSON-RPC protocol version used on every request.
pub const JSON_RPC_VERSION: &str = "2.0";

/// A JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("RPC error {code}: {message}")]
pub struct RpcError {
	pub code: i64,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

impl RpcError {
	/// Generic internal error (-32603).
	pub fn internal(message: impl Into<String>) -> Self {
		Self {
			code: -32603,
			message: message.into(),
			data: None,
		}
	}

	/// Invalid params error (-32602).
	pub fn invalid_params(message: impl Into<String>) -> Self {
		Self {
			code: -32602,
			message: message.into(),
			data: None,
		}
	}

	/// Transport level failure, reported with the server error code range.
	pub fn transport(message: impl Into<String>) -> Self {
		Self {
			code: -32000,
			message: message.into(),
			data: None,
		}
	}
}

/// Legacy JSON-RPC payload accepted by `send` and `send_async`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
	#[serde(default = "default_version")]
	pub jsonrpc: String,
	#[serde(default)]
	pub id: Value,
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

impl JsonRpcRequest {
	pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
		Self {
			jsonrpc: JSON_RPC_VERSION.to_string(),
			id: id.into(),
			method: method.into(),
			params,
		}
	}
}

fn default_version() -> String {
	JSON_RPC_VERSION.to_string()
}

/// Legacy JSON-RPC response produced by `send` and `send_async`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
	pub jsonrpc: String,
	pub id: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<RpcError>,
}

impl JsonRpcResponse {
	/// Wraps a call outcome into a response envelope for `id`.
	pub fn from_result(id: Value, result: Result<Value, RpcError>) -> Self {
		let (result, error) = match result {
			Ok(value) => (Some(value), None),
			Err(err) => (None, Some(err)),
		};
		Self {
			jsonrpc: JSON_RPC_VERSION.to_string(),
			id,
			result,
			error,
		}
	}
}

/// Interface for anything that can answer JSON-RPC requests.
#[async_trait]
pub trait ProviderInterface: Send + Sync {
	/// Performs a single JSON-RPC request and returns its `result`.
	async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

/// Reads `eth_chainId` from the provider.
pub async fn chain_id(provider: &dyn ProviderInterface) -> Result<u64, RpcError> {
	let value = provider.request("eth_chainId", json!([])).await?;
	decode_quantity(value)
}

/// Executes a read-only `eth_call` against `to` at the latest block.
pub async fn eth_call(
	provider: &dyn ProviderInterface,
	to: Address,
	data: Bytes,
) -> Result<Bytes, RpcError> {
	let value = provider
		.request("eth_call", json!([{ "to": to, "data": data }, "latest"]))
		.await?;
	serde_json::from_value(value)
		.map_err(|e| RpcError::internal(format!("Invalid eth_call response: {}", e)))
}

/// Estimates gas for a call from `from` to `to` with `data`.
pub async fn estimate_gas(
	provider: &dyn ProviderInterface,
	from: Address,
	to: Address,
	data: &Bytes,
) -> Result<u64, RpcError> {
	let value = provider
		.request(
			"eth_estimateGas",
			json!([{ "from": from, "to": to, "data": data }]),
		)
		.await?;
	decode_quantity(value)
}

fn decode_quantity(value: Value) -> Result<u64, RpcError> {
	let quantity: U64 = serde_json::from_value(value)
		.map_err(|e| RpcError::internal(format!("Invalid quantity: {}", e)))?;
	Ok(quantity.to::<u64>())
}
